//! Playback driver: starts songs, reacts to songbird track events, retries
//! failed songs with backoff and disconnects idle guilds.

use futures::FutureExt;
use futures::future::BoxFuture;
use serenity::all::{ChannelId, CreateEmbed, CreateMessage, EditMessage, GuildId, Http, MessageId};
use serenity::async_trait;
use songbird::{Event, EventContext, EventHandler, Songbird, TrackEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::embedded_messages;
use super::music_manager::{MusicError, MusicManager, MusicResult};
use super::retry_policy::RetryPolicy;
use super::session::{Advance, DisconnectTimer, SessionRegistry, next_timer_id};
use crate::Context;
use crate::commands::music::audio_sources::track_metadata::Song;
use crate::commands::music::audio_sources::ytdl_stream::YtdlStream;
use crate::config::BotConfig;

/// Playback tunables derived from the configuration.
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub idle_disconnect: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
    pub stream: YtdlStream,
}

impl PlayerSettings {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            idle_disconnect: config.idle_disconnect,
            connect_timeout: config.connect_timeout,
            retry: RetryPolicy::new(config.max_playback_failures, config.retry_base_delay),
            stream: YtdlStream::new(config.youtube_cookie.clone()),
        }
    }
}

/// A message posted by the driver, kept so it can be edited later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notice {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// What the driver does to the outside world: post and edit announcements,
/// leave voice. Failures are logged by the implementation.
#[async_trait]
pub trait PlayerOutput: Send + Sync {
    async fn send(&self, channel_id: ChannelId, embed: CreateEmbed) -> Option<Notice>;

    async fn edit(&self, notice: Notice, embed: CreateEmbed);

    /// Leave the guild's voice channel. Not being connected is fine.
    async fn leave(&self, guild_id: GuildId);
}

/// [`PlayerOutput`] backed by the Discord REST API and songbird.
pub struct DiscordOutput {
    http: Arc<Http>,
    songbird: Arc<Songbird>,
}

impl DiscordOutput {
    pub fn new(http: Arc<Http>, songbird: Arc<Songbird>) -> Self {
        Self { http, songbird }
    }
}

#[async_trait]
impl PlayerOutput for DiscordOutput {
    async fn send(&self, channel_id: ChannelId, embed: CreateEmbed) -> Option<Notice> {
        match channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await
        {
            Ok(message) => Some(Notice {
                channel_id: message.channel_id,
                message_id: message.id,
            }),
            Err(e) => {
                warn!("Failed to send message to channel {}: {}", channel_id, e);
                None
            }
        }
    }

    async fn edit(&self, notice: Notice, embed: CreateEmbed) {
        let edit = EditMessage::new().embed(embed);
        if let Err(e) = notice
            .channel_id
            .edit_message(&self.http, notice.message_id, edit)
            .await
        {
            warn!("Failed to edit message {}: {}", notice.message_id, e);
        }
    }

    async fn leave(&self, guild_id: GuildId) {
        if let Err(e) = MusicManager::leave_channel(&self.songbird, guild_id).await {
            error!("Failed to leave voice in guild {}: {}", guild_id, e);
        }
    }
}

/// Everything the driver needs, detached from any single command invocation so
/// it can live inside event handlers and spawned tasks.
#[derive(Clone)]
pub struct PlaybackContext {
    pub songbird: Arc<Songbird>,
    pub sessions: Arc<SessionRegistry>,
    pub settings: Arc<PlayerSettings>,
    pub output: Arc<dyn PlayerOutput>,
}

impl PlaybackContext {
    pub fn new(
        songbird: Arc<Songbird>,
        sessions: Arc<SessionRegistry>,
        settings: Arc<PlayerSettings>,
        output: Arc<dyn PlayerOutput>,
    ) -> Self {
        Self {
            songbird,
            sessions,
            settings,
            output,
        }
    }

    pub async fn from_command(ctx: Context<'_>) -> MusicResult<Self> {
        let songbird = MusicManager::get_songbird(ctx.serenity_context()).await?;
        let output = DiscordOutput::new(ctx.serenity_context().http.clone(), songbird.clone());

        Ok(Self::new(
            songbird,
            ctx.data().sessions.clone(),
            ctx.data().player_settings.clone(),
            Arc::new(output),
        ))
    }

    /// Posts `embed` to the guild's text channel.
    async fn announce(&self, guild_id: GuildId, embed: CreateEmbed) -> Option<Notice> {
        let channel = self.sessions.text_channel(guild_id)?;
        self.output.send(channel, embed).await
    }
}

/// What [`play_next_track`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    Playing(Song),
    /// The song could not be started; a retry or a teardown was scheduled.
    Failed,
    /// Queue exhausted, the idle timer is armed.
    Idle,
    /// The session was stopped or replaced. Nothing was touched.
    Closed,
}

/// Play the next queued song of `guild_id`.
///
/// When the queue is empty the guild goes idle: a warning is posted and the
/// disconnect timer is armed. `announce` posts a "Now Playing" message; the
/// play command passes `false` because it edits its own status message.
pub fn play_next_track(
    pctx: PlaybackContext,
    guild_id: GuildId,
    announce: bool,
) -> BoxFuture<'static, MusicResult<PlayOutcome>> {
    play_next(pctx, guild_id, announce, None)
}

/// With `session_id` set, only advances while that session is still the
/// guild's session.
fn play_next(
    pctx: PlaybackContext,
    guild_id: GuildId,
    announce: bool,
    session_id: Option<u64>,
) -> BoxFuture<'static, MusicResult<PlayOutcome>> {
    async move {
        let advance = match session_id {
            Some(id) => pctx.sessions.advance_session(guild_id, id),
            None => pctx.sessions.advance(guild_id),
        };

        let song = match advance {
            Advance::Next(song) => song,
            Advance::Drained => {
                info!("No more tracks in queue for guild {}", guild_id);
                enter_idle(&pctx, guild_id).await;
                return Ok(PlayOutcome::Idle);
            }
            Advance::Closed => {
                debug!("Session {:?} of guild {} is closed", session_id, guild_id);
                return Ok(PlayOutcome::Closed);
            }
        };

        info!("Playing '{}' in guild {}", song.title, guild_id);

        let Some(call) = pctx
            .sessions
            .call(guild_id)
            .or_else(|| pctx.songbird.get(guild_id))
        else {
            warn!("No voice connection for guild {}, tearing down", guild_id);
            cleanup(&pctx, guild_id).await;
            return Err(MusicError::NotConnected);
        };

        let input = match pctx.settings.stream.spawn(&song.url) {
            Ok(input) => input,
            Err(e) => {
                handle_playback_failure(&pctx, guild_id, Some(&song), &e.to_string(), announce).await;
                return Ok(PlayOutcome::Failed);
            }
        };

        let track = call.lock().await.play_input(input);

        let handlers = [
            track.add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    pctx: pctx.clone(),
                    guild_id,
                },
            ),
            track.add_event(
                Event::Track(TrackEvent::Error),
                TrackErrorNotifier {
                    pctx: pctx.clone(),
                    guild_id,
                },
            ),
            track.add_event(
                Event::Track(TrackEvent::Playable),
                TrackPlayableNotifier {
                    pctx: pctx.clone(),
                    guild_id,
                },
            ),
        ];
        if handlers.iter().any(Result::is_err) {
            error!("Failed to attach track events in guild {}", guild_id);
        }

        if !pctx.sessions.set_track(guild_id, track.clone()) {
            debug!("Session for guild {} closed while starting a track", guild_id);
            if let Err(e) = track.stop() {
                debug!("Orphaned track in guild {} already stopped: {}", guild_id, e);
            }
            return Ok(PlayOutcome::Closed);
        }

        if announce {
            pctx.announce(guild_id, embedded_messages::now_playing(&song))
                .await;
        }

        Ok(PlayOutcome::Playing(song))
    }
    .boxed()
}

/// Posts the drain warning and arms the idle timer.
pub async fn enter_idle(pctx: &PlaybackContext, guild_id: GuildId) {
    if !pctx.sessions.contains(guild_id) {
        return;
    }

    let idle = pctx.settings.idle_disconnect;
    let notice = pctx
        .announce(guild_id, embedded_messages::queue_drained(idle))
        .await;

    let timer_id = next_timer_id();
    let task_pctx = pctx.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(idle).await;
        expire_idle_session(task_pctx, guild_id, timer_id, notice).await;
    });

    if pctx
        .sessions
        .arm_disconnect(guild_id, DisconnectTimer::new(timer_id, handle))
    {
        info!("Guild {} idle, disconnecting in {:?}", guild_id, idle);
    } else {
        debug!("Guild {} got new songs before the idle timer was armed", guild_id);
    }
}

/// Runs when the idle timer fires. Does nothing if the timer was superseded
/// or songs were queued in the meantime.
async fn expire_idle_session(
    pctx: PlaybackContext,
    guild_id: GuildId,
    timer_id: u64,
    notice: Option<Notice>,
) {
    let Some(mut session) = pctx.sessions.take_expired(guild_id, timer_id) else {
        debug!("Idle timer {} for guild {} is stale", timer_id, guild_id);
        return;
    };

    info!("Disconnecting idle guild {}", guild_id);
    session.shutdown();
    pctx.output.leave(guild_id).await;

    if let Some(notice) = notice {
        pctx.output.edit(notice, embedded_messages::finished()).await;
    }
}

/// Reports a song that failed to play and either schedules the next song after
/// a backoff delay or gives up on the guild. A scheduled retry does nothing if
/// the session is stopped or replaced before it runs.
pub async fn handle_playback_failure(
    pctx: &PlaybackContext,
    guild_id: GuildId,
    song: Option<&Song>,
    reason: &str,
    announce: bool,
) {
    error!(
        "Playback failed in guild {} for {:?}: {}",
        guild_id,
        song.map(|s| s.title.as_str()),
        reason
    );

    if announce {
        pctx.announce(guild_id, embedded_messages::playback_error(song, reason))
            .await;
    }

    let Some(streak) = pctx.sessions.record_failure(guild_id) else {
        return;
    };
    let failures = streak.failures;

    match pctx.settings.retry.delay_for(failures) {
        Some(delay) => {
            info!(
                "Failure {} in guild {}, moving on in {:?}",
                failures, guild_id, delay
            );
            let pctx = pctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = play_next(pctx, guild_id, true, Some(streak.session_id)).await {
                    error!("Failed to continue playback in guild {}: {}", guild_id, e);
                }
            });
        }
        None => {
            warn!("Giving up on guild {} after {} failures", guild_id, failures);
            pctx.announce(guild_id, embedded_messages::retries_exhausted(failures))
                .await;
            cleanup(pctx, guild_id).await;
        }
    }
}

/// Removes the guild's session, stops its track, cancels its idle timer and
/// leaves voice. Safe to call any number of times.
pub async fn cleanup(pctx: &PlaybackContext, guild_id: GuildId) {
    if let Some(mut session) = pctx.sessions.remove(guild_id) {
        info!("Cleaning up session for guild {}", guild_id);
        session.shutdown();
    }

    pctx.output.leave(guild_id).await;
}

/// Advances the queue when the current song ends.
pub struct TrackEndNotifier {
    pub pctx: PlaybackContext,
    pub guild_id: GuildId,
}

#[async_trait]
impl EventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (_, handle) in tracks.iter() {
                if !self.pctx.sessions.release_track(self.guild_id, handle) {
                    debug!("Ignoring end of stale track in guild {}", self.guild_id);
                    continue;
                }

                info!("Track ended for guild {}", self.guild_id);
                if let Err(e) = play_next_track(self.pctx.clone(), self.guild_id, true).await {
                    error!("Failed to play next track in guild {}: {}", self.guild_id, e);
                }
            }
        }
        None
    }
}

/// Reports a song whose stream broke and applies the retry policy.
pub struct TrackErrorNotifier {
    pub pctx: PlaybackContext,
    pub guild_id: GuildId,
}

#[async_trait]
impl EventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, handle) in tracks.iter() {
                if !self.pctx.sessions.release_track(self.guild_id, handle) {
                    continue;
                }

                let song = self.pctx.sessions.current_song(self.guild_id);
                let reason = format!("{:?}", state.playing);
                handle_playback_failure(&self.pctx, self.guild_id, song.as_ref(), &reason, true)
                    .await;
            }
        }
        None
    }
}

/// A song that actually started clears the failure streak.
pub struct TrackPlayableNotifier {
    pub pctx: PlaybackContext,
    pub guild_id: GuildId,
}

#[async_trait]
impl EventHandler for TrackPlayableNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            if tracks
                .iter()
                .any(|(_, handle)| self.pctx.sessions.is_current_track(self.guild_id, handle))
            {
                self.pctx.sessions.reset_failures(self.guild_id);
            }
        }
        None
    }
}

/// Tears the guild down when the voice connection is lost for good.
pub struct DriverDisconnectNotifier {
    pub pctx: PlaybackContext,
    pub guild_id: GuildId,
}

#[async_trait]
impl EventHandler for DriverDisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            // A requested leave already went through `cleanup`.
            let Some(reason) = &data.reason else {
                return None;
            };

            warn!(
                "Voice connection lost in guild {}: {:?}",
                self.guild_id, reason
            );
            let pctx = self.pctx.clone();
            let guild_id = self.guild_id;
            tokio::spawn(async move { cleanup(&pctx, guild_id).await });
        }
        None
    }
}
