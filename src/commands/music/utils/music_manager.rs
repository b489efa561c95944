use serenity::all::{ChannelId, Context, GuildId, Permissions, UserId};
use songbird::{Call, CoreEvent, Event, Songbird};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::event_handlers::{DriverDisconnectNotifier, PlaybackContext};

/// Errors that can occur during music operations
#[derive(Error, Debug)]
pub enum MusicError {
    #[error("Not in a guild")]
    NotInGuild,

    #[error("No song name or URL was given")]
    EmptyQuery,

    #[error("User is not in a voice channel")]
    UserNotInVoiceChannel,

    #[error("Missing Connect or Speak permission in the voice channel")]
    MissingVoicePermissions,

    #[error("No results found for `{0}`")]
    NotFound(String),

    #[error("Failed to load track: {0}")]
    LoadFailed(String),

    #[error("Failed to join voice channel: {0}")]
    JoinError(String),

    #[error("Timed out after {0:?} waiting to connect to the voice channel")]
    ConnectTimeout(Duration),

    #[error("Not connected to a voice channel")]
    NotConnected,

    #[error("Failed to get voice manager")]
    NoVoiceManager,

    #[error("Audio source error: {0}")]
    AudioSourceError(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Coarse classification of a [`MusicError`], used to pick the reply and the
/// follow-up action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before anything was touched.
    UserInput,
    /// The query resolved to nothing.
    NotFound,
    /// The voice connection could not be established. The half-open
    /// connection has to be torn down.
    Connection,
    /// Search, metadata or auth failure.
    ExternalService,
    /// The audio stream for a song could not be produced.
    Playback,
}

impl MusicError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MusicError::NotInGuild
            | MusicError::EmptyQuery
            | MusicError::UserNotInVoiceChannel
            | MusicError::MissingVoicePermissions
            | MusicError::NotConnected => ErrorKind::UserInput,
            MusicError::NotFound(_) => ErrorKind::NotFound,
            MusicError::JoinError(_) | MusicError::ConnectTimeout(_) => ErrorKind::Connection,
            MusicError::LoadFailed(_)
            | MusicError::NoVoiceManager
            | MusicError::ExternalApiError(_)
            | MusicError::ConfigError(_) => ErrorKind::ExternalService,
            MusicError::AudioSourceError(_) => ErrorKind::Playback,
        }
    }
}

/// Result type for music operations
pub type MusicResult<T> = Result<T, MusicError>;

/// Checks that the permission set allows the bot to join and talk.
pub fn ensure_voice_permissions(permissions: Permissions) -> MusicResult<()> {
    if permissions.contains(Permissions::CONNECT | Permissions::SPEAK) {
        Ok(())
    } else {
        Err(MusicError::MissingVoicePermissions)
    }
}

/// How a `play` request gets its voice connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPlan {
    /// Not connected anywhere in the guild yet.
    Join,
    /// Already connected to the invoker's channel.
    Reuse,
    /// Connected to another channel of the guild. The song is queued there
    /// and the listeners in that channel keep their music.
    ReuseElsewhere,
}

impl JoinPlan {
    pub fn decide(connected_to: Option<songbird::id::ChannelId>, requested: ChannelId) -> Self {
        match connected_to {
            None => JoinPlan::Join,
            Some(current) if current == requested.into() => JoinPlan::Reuse,
            Some(_) => JoinPlan::ReuseElsewhere,
        }
    }
}

/// Thin layer over songbird and the guild cache
pub struct MusicManager;

impl MusicManager {
    /// Get the Songbird voice client from the context
    pub async fn get_songbird(ctx: &Context) -> MusicResult<Arc<Songbird>> {
        songbird::get(ctx).await.ok_or(MusicError::NoVoiceManager)
    }

    /// Get the voice channel the user is in, checking the bot may connect and speak there.
    pub fn get_voice_target(
        ctx: &Context,
        guild_id: GuildId,
        user_id: UserId,
    ) -> MusicResult<ChannelId> {
        let bot_id = ctx.cache.current_user().id;
        let guild = ctx.cache.guild(guild_id).ok_or(MusicError::NotInGuild)?;

        let channel_id = guild
            .voice_states
            .get(&user_id)
            .and_then(|voice_state| voice_state.channel_id)
            .ok_or(MusicError::UserNotInVoiceChannel)?;

        let channel = guild
            .channels
            .get(&channel_id)
            .ok_or(MusicError::UserNotInVoiceChannel)?;

        let member = guild
            .members
            .get(&bot_id)
            .ok_or(MusicError::MissingVoicePermissions)?;

        ensure_voice_permissions(guild.user_permissions_in(channel, member))?;

        Ok(channel_id)
    }

    /// Join a voice channel, or reuse the guild's existing call whichever
    /// channel it is in. Readiness is bounded by `timeout`.
    pub async fn join_channel(
        pctx: &PlaybackContext,
        guild_id: GuildId,
        channel_id: ChannelId,
        timeout: Duration,
    ) -> MusicResult<Arc<Mutex<Call>>> {
        if let Some(call) = pctx.songbird.get(guild_id) {
            let connected_to = call.lock().await.current_channel();
            match JoinPlan::decide(connected_to, channel_id) {
                JoinPlan::Reuse => {
                    debug!("Reusing voice connection for guild {}", guild_id);
                    return Ok(call);
                }
                JoinPlan::ReuseElsewhere => {
                    info!(
                        "Already playing in another channel of guild {}, queueing there instead of {}",
                        guild_id, channel_id
                    );
                    return Ok(call);
                }
                JoinPlan::Join => {}
            }
        }

        let call = tokio::time::timeout(timeout, pctx.songbird.join(guild_id, channel_id))
            .await
            .map_err(|_| MusicError::ConnectTimeout(timeout))?
            .map_err(|e| {
                error!(
                    "Failed to join voice channel {} for guild {}: {}",
                    channel_id, guild_id, e
                );
                MusicError::JoinError(e.to_string())
            })?;

        {
            let mut handler = call.lock().await;
            if let Err(e) = handler.deafen(true).await {
                debug!("Could not self-deafen in guild {}: {}", guild_id, e);
            }
            handler.remove_all_global_events();
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DriverDisconnectNotifier {
                    pctx: pctx.clone(),
                    guild_id,
                },
            );
        }

        info!("Joined voice channel {} in guild {}", channel_id, guild_id);
        Ok(call)
    }

    /// Leave the voice channel. Not being connected is not an error.
    pub async fn leave_channel(songbird: &Songbird, guild_id: GuildId) -> MusicResult<()> {
        if songbird.get(guild_id).is_none() {
            return Ok(());
        }

        songbird
            .remove(guild_id)
            .await
            .map_err(|e| MusicError::JoinError(format!("Failed to leave voice channel: {}", e)))?;

        info!("Left voice channel in guild {}", guild_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn voice_permissions_need_connect_and_speak() {
        assert!(ensure_voice_permissions(Permissions::CONNECT | Permissions::SPEAK).is_ok());
        assert!(ensure_voice_permissions(Permissions::ADMINISTRATOR | Permissions::CONNECT | Permissions::SPEAK).is_ok());
        assert!(matches!(
            ensure_voice_permissions(Permissions::CONNECT),
            Err(MusicError::MissingVoicePermissions)
        ));
        assert!(matches!(
            ensure_voice_permissions(Permissions::SPEAK),
            Err(MusicError::MissingVoicePermissions)
        ));
        assert!(ensure_voice_permissions(Permissions::empty()).is_err());
    }

    #[test_case(MusicError::EmptyQuery => ErrorKind::UserInput; "empty query")]
    #[test_case(MusicError::UserNotInVoiceChannel => ErrorKind::UserInput; "no voice channel")]
    #[test_case(MusicError::MissingVoicePermissions => ErrorKind::UserInput; "no permissions")]
    #[test_case(MusicError::NotFound("x".into()) => ErrorKind::NotFound; "not found")]
    #[test_case(MusicError::ExternalApiError("x".into()) => ErrorKind::ExternalService; "api")]
    #[test_case(MusicError::ConnectTimeout(Duration::from_secs(30)) => ErrorKind::Connection; "timeout")]
    #[test_case(MusicError::JoinError("gateway".into()) => ErrorKind::Connection; "join")]
    #[test_case(MusicError::ExternalApiError("connect".into()) => ErrorKind::ExternalService; "api mentioning connect")]
    #[test_case(MusicError::AudioSourceError("x".into()) => ErrorKind::Playback; "playback")]
    fn error_kinds(err: MusicError) -> ErrorKind {
        err.kind()
    }

    #[test]
    fn existing_call_is_reused_in_any_channel() {
        let requested = ChannelId::new(2);

        assert_eq!(JoinPlan::decide(None, requested), JoinPlan::Join);
        assert_eq!(
            JoinPlan::decide(Some(ChannelId::new(2).into()), requested),
            JoinPlan::Reuse
        );
        assert_eq!(
            JoinPlan::decide(Some(ChannelId::new(1).into()), requested),
            JoinPlan::ReuseElsewhere
        );
    }
}
