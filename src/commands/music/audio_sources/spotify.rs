//! Spotify Web API client used to turn a track link into a searchable
//! "name artist" string. Handles the client credentials flow and URL parsing.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use regex::Regex;
use reqwest::{StatusCode, header};
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::HTTP_CLIENT;
use crate::commands::music::utils::music_manager::MusicError;
use crate::config::SpotifyCredentials;

/// Result type specific to Spotify API operations.
pub type SpotifyResult<T> = Result<T, MusicError>;

const ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";
const API_BASE_URL: &str = "https://api.spotify.com";

/// Represents basic track information retrieved from Spotify.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpotifyTrack {
    /// The name of the track.
    pub name: String,
    /// A list of artist names associated with the track.
    pub artists: Vec<String>,
}

impl SpotifyTrack {
    /// Query used to find this track on YouTube: `"<name> <primary artist>"`.
    pub fn search_query(&self) -> String {
        match self.artists.first() {
            Some(artist) => format!("{} {}", self.name, artist),
            None => self.name.clone(),
        }
    }
}

/// Represents the response from Spotify's token endpoint.
#[derive(Debug, Deserialize)]
struct SpotifyToken {
    /// The OAuth2 access token.
    access_token: String,
    /// The duration in seconds for which the token is valid.
    expires_in: u64,
    /// The time when the token was created, used to check expiry.
    #[serde(skip, default = "Instant::now")]
    created_at: Instant,
}

impl SpotifyToken {
    /// Considers the token expired 30 seconds before its actual expiry time.
    fn is_expired(&self) -> bool {
        let expiry = Duration::from_secs(self.expires_in);
        let elapsed = self.created_at.elapsed();
        elapsed > expiry.saturating_sub(Duration::from_secs(30))
    }
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistResponse>,
}

#[derive(Debug, Deserialize)]
struct ArtistResponse {
    name: String,
}

/// Regex to match and capture Spotify track URLs.
static SPOTIFY_TRACK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(open\.spotify\.com|spotify)/(intl-[a-z]{2}/)?track/([a-zA-Z0-9]+)(\?.*)?$")
        .expect("valid spotify track regex")
});

/// Regex to match Spotify playlist and album URLs.
static SPOTIFY_COLLECTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(open\.spotify\.com|spotify)/(intl-[a-z]{2}/)?(playlist|album)/([a-zA-Z0-9]+)(\?.*)?$")
        .expect("valid spotify collection regex")
});

/// Spotify API client holding its own cached access token.
pub struct SpotifyApi {
    http: reqwest::Client,
    credentials: SpotifyCredentials,
    accounts_base_url: String,
    api_base_url: String,
    token: Mutex<Option<SpotifyToken>>,
}

impl SpotifyApi {
    pub fn new(credentials: SpotifyCredentials) -> Self {
        Self::build(HTTP_CLIENT.clone(), credentials, ACCOUNTS_BASE_URL, API_BASE_URL)
    }

    /// Client pointed at custom endpoints, with its own connection pool.
    pub fn with_base_urls(
        credentials: SpotifyCredentials,
        accounts_base_url: impl Into<String>,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self::build(reqwest::Client::new(), credentials, accounts_base_url, api_base_url)
    }

    fn build(
        http: reqwest::Client,
        credentials: SpotifyCredentials,
        accounts_base_url: impl Into<String>,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            credentials,
            accounts_base_url: accounts_base_url.into(),
            api_base_url: api_base_url.into(),
            token: Mutex::new(None),
        }
    }

    /// Attempts to extract the Spotify track ID from a track URL.
    pub fn extract_track_id(url: &str) -> Option<String> {
        SPOTIFY_TRACK_REGEX
            .captures(url.trim())
            .and_then(|cap| cap.get(4))
            .map(|m| m.as_str().to_string())
    }

    /// Checks if the URL points to a Spotify playlist or album.
    pub fn is_collection_url(url: &str) -> bool {
        SPOTIFY_COLLECTION_REGEX.is_match(url.trim())
    }

    /// Retrieves a valid access token, requesting a new one when the cached
    /// token is missing or about to expire.
    async fn get_access_token(&self) -> SpotifyResult<String> {
        let mut token_lock = self.token.lock().await;

        if let Some(token) = &*token_lock {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Requesting a new Spotify access token");
        let auth = BASE64_STANDARD.encode(format!(
            "{}:{}",
            self.credentials.client_id, self.credentials.client_secret
        ));

        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_base_url))
            .header(header::AUTHORIZATION, format!("Basic {}", auth))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                MusicError::ExternalApiError(format!("Failed to request Spotify token: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Cannot read response".to_string());
            return Err(MusicError::ExternalApiError(format!(
                "Spotify auth error: {} - {}",
                status, text
            )));
        }

        let token = response.json::<SpotifyToken>().await.map_err(|e| {
            MusicError::ExternalApiError(format!("Failed to parse Spotify token: {}", e))
        })?;

        let access_token = token.access_token.clone();
        *token_lock = Some(token);

        Ok(access_token)
    }

    /// Fetches a track by ID. `Ok(None)` when Spotify does not know the ID.
    pub async fn get_track(&self, track_id: &str) -> SpotifyResult<Option<SpotifyTrack>> {
        let token = self.get_access_token().await?;
        info!("Fetching Spotify track {}", track_id);

        let response = self
            .http
            .get(format!("{}/v1/tracks/{}", self.api_base_url, track_id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                MusicError::ExternalApiError(format!("Failed to request Spotify track: {}", e))
            })?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => return Ok(None),
            status if !status.is_success() => {
                let text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Cannot read response".to_string());
                return Err(MusicError::ExternalApiError(format!(
                    "Spotify API error: {} - {}",
                    status, text
                )));
            }
            _ => {}
        }

        let track = response.json::<TrackResponse>().await.map_err(|e| {
            MusicError::ExternalApiError(format!("Failed to parse Spotify track data: {}", e))
        })?;

        Ok(Some(SpotifyTrack {
            name: track.name,
            artists: track.artists.into_iter().map(|a| a.name).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://open.spotify.com/track/4u7EnebtmKWzUH433cf5Qv", Some("4u7EnebtmKWzUH433cf5Qv"))]
    #[case("https://open.spotify.com/track/4u7EnebtmKWzUH433cf5Qv?si=abc123", Some("4u7EnebtmKWzUH433cf5Qv"))]
    #[case("open.spotify.com/track/4u7EnebtmKWzUH433cf5Qv", Some("4u7EnebtmKWzUH433cf5Qv"))]
    #[case("https://open.spotify.com/intl-es/track/4u7EnebtmKWzUH433cf5Qv", Some("4u7EnebtmKWzUH433cf5Qv"))]
    #[case("https://open.spotify.com/album/1GbtB4zTqAsyfZEsm1RZfx", None)]
    #[case("https://www.youtube.com/watch?v=fJ9rUzIMcZQ", None)]
    #[case("bohemian rhapsody", None)]
    fn track_ids(#[case] url: &str, #[case] expected: Option<&str>) {
        assert_eq!(SpotifyApi::extract_track_id(url).as_deref(), expected);
    }

    #[rstest]
    #[case("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M", true)]
    #[case("https://open.spotify.com/album/1GbtB4zTqAsyfZEsm1RZfx?si=x", true)]
    #[case("https://open.spotify.com/track/4u7EnebtmKWzUH433cf5Qv", false)]
    fn collection_urls(#[case] url: &str, #[case] expected: bool) {
        assert_eq!(SpotifyApi::is_collection_url(url), expected);
    }

    #[test]
    fn search_query_uses_primary_artist() {
        let track = SpotifyTrack {
            name: "Under Pressure".into(),
            artists: vec!["Queen".into(), "David Bowie".into()],
        };
        assert_eq!(track.search_query(), "Under Pressure Queen");

        let track = SpotifyTrack {
            name: "Untitled".into(),
            artists: vec![],
        };
        assert_eq!(track.search_query(), "Untitled");
    }

    #[test]
    fn token_expires_thirty_seconds_early() {
        let fresh = SpotifyToken {
            access_token: "t".into(),
            expires_in: 3600,
            created_at: Instant::now(),
        };
        assert!(!fresh.is_expired());

        let short_lived = SpotifyToken {
            access_token: "t".into(),
            expires_in: 20,
            created_at: Instant::now(),
        };
        assert!(short_lived.is_expired());
    }
}
