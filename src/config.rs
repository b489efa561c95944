//! Runtime configuration read from the environment (after `.env` is loaded).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PREFIX: &str = "+";
const DEFAULT_IDLE_DISCONNECT_SECS: u64 = 15;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_FAILURES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Client-credentials pair for the Spotify Web API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub discord_token: String,
    pub prefix: String,
    pub spotify: Option<SpotifyCredentials>,
    pub youtube_cookie: Option<String>,
    pub idle_disconnect: Duration,
    pub connect_timeout: Duration,
    pub max_playback_failures: u32,
    pub retry_base_delay: Duration,
}

impl BotConfig {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let discord_token = get("DISCORD_TOKEN").ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let spotify = match (get("SPOTIFY_CLIENT_ID"), get("SPOTIFY_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(SpotifyCredentials {
                client_id,
                client_secret,
            }),
            _ => None,
        };

        Ok(Self {
            discord_token,
            prefix: get("BOT_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            spotify,
            youtube_cookie: get("YOUTUBE_COOKIE"),
            idle_disconnect: Duration::from_secs(parse_or(
                &get,
                "IDLE_DISCONNECT_SECS",
                DEFAULT_IDLE_DISCONNECT_SECS,
            )?),
            connect_timeout: Duration::from_secs(parse_or(
                &get,
                "VOICE_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?),
            max_playback_failures: parse_or(&get, "PLAYBACK_MAX_FAILURES", DEFAULT_MAX_FAILURES)?,
            retry_base_delay: Duration::from_millis(parse_or(
                &get,
                "PLAYBACK_RETRY_DELAY_MS",
                DEFAULT_RETRY_DELAY_MS,
            )?),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let config = BotConfig::from_lookup(lookup(&[("DISCORD_TOKEN", "abc")])).unwrap();

        assert_eq!(config.discord_token, "abc");
        assert_eq!(config.prefix, "+");
        assert_eq!(config.spotify, None);
        assert_eq!(config.youtube_cookie, None);
        assert_eq!(config.idle_disconnect, Duration::from_secs(15));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.max_playback_failures, 3);
        assert_eq!(config.retry_base_delay, Duration::from_secs(1));
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = BotConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DISCORD_TOKEN"));
    }

    #[test]
    fn spotify_needs_both_credentials() {
        let config = BotConfig::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("SPOTIFY_CLIENT_ID", "id"),
        ]))
        .unwrap();
        assert_eq!(config.spotify, None);

        let config = BotConfig::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();
        assert_eq!(
            config.spotify,
            Some(SpotifyCredentials {
                client_id: "id".into(),
                client_secret: "secret".into(),
            })
        );
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = BotConfig::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("IDLE_DISCONNECT_SECS", "soon"),
        ]))
        .unwrap_err();

        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "IDLE_DISCONNECT_SECS",
                value: "soon".into()
            }
        );
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = BotConfig::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("BOT_PREFIX", "  "),
            ("YOUTUBE_COOKIE", ""),
        ]))
        .unwrap();

        assert_eq!(config.prefix, "+");
        assert_eq!(config.youtube_cookie, None);
    }
}
