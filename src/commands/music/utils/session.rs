//! Per-guild playback state.
//!
//! Every guild the bot plays in owns exactly one [`GuildSession`], stored in the
//! shared [`SessionRegistry`]. All registry operations are synchronous and hold
//! the map shard only for the duration of the call, so they are safe to use
//! from event handlers and spawned tasks without holding anything across an
//! `.await`.

use dashmap::DashMap;
use serenity::all::{ChannelId, GuildId};
use songbird::Call;
use songbird::tracks::TrackHandle;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::commands::music::audio_sources::track_metadata::Song;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates an id for a new [`DisconnectTimer`].
pub fn next_timer_id() -> u64 {
    NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed)
}

/// A pending idle disconnect.
#[derive(Debug)]
pub struct DisconnectTimer {
    pub id: u64,
    handle: JoinHandle<()>,
}

impl DisconnectTimer {
    pub fn new(id: u64, handle: JoinHandle<()>) -> Self {
        Self { id, handle }
    }

    pub fn cancel(self) {
        debug!("Cancelling disconnect timer {}", self.id);
        self.handle.abort();
    }
}

/// Playback state of a single guild.
pub struct GuildSession {
    /// Unique per session. A guild that is stopped and played again gets a
    /// new id, so work scheduled for the old session can tell it is stale.
    pub id: u64,
    /// Channel that receives playback announcements.
    pub text_channel: ChannelId,
    pub call: Option<Arc<Mutex<Call>>>,
    pub queue: VecDeque<Song>,
    pub current: Option<Song>,
    pub playing: bool,
    pub track: Option<TrackHandle>,
    pub disconnect: Option<DisconnectTimer>,
    pub consecutive_failures: u32,
}

impl GuildSession {
    fn new(text_channel: ChannelId) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            text_channel,
            call: None,
            queue: VecDeque::new(),
            current: None,
            playing: false,
            track: None,
            disconnect: None,
            consecutive_failures: 0,
        }
    }

    /// Nothing playing and nothing waiting.
    pub fn is_idle(&self) -> bool {
        !self.playing && self.queue.is_empty()
    }

    /// Stops the running track and cancels the idle timer.
    pub fn shutdown(&mut self) {
        self.queue.clear();
        self.current = None;
        self.playing = false;

        if let Some(track) = self.track.take() {
            if let Err(e) = track.stop() {
                debug!("Track of session {} already gone: {}", self.id, e);
            }
        }
        if let Some(timer) = self.disconnect.take() {
            timer.cancel();
        }
    }
}

/// Outcome of [`SessionRegistry::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// The guild was idle: the caller must start playback. The session is
    /// already marked as playing.
    PlayNow { queued: usize },
    /// Appended behind the current song. 1-based positions of the first and
    /// last appended songs.
    Queued { first: usize, last: usize },
}

/// Outcome of [`SessionRegistry::advance`].
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// The head of the queue is now the current song.
    Next(Song),
    /// The queue was empty. The session is idle now.
    Drained,
    /// No session, or not the session the caller expected.
    Closed,
}

/// Failures in a row of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureStreak {
    pub session_id: u64,
    pub failures: u32,
}

/// Read-only copy of a guild's queue.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<Song>,
    pub upcoming: Vec<Song>,
}

impl QueueSnapshot {
    /// Sum of the known durations of the upcoming songs.
    pub fn upcoming_duration(&self) -> Duration {
        self.upcoming.iter().filter_map(|song| song.duration).sum()
    }
}

/// All live guild sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<GuildId, GuildSession>,
}

impl SessionRegistry {
    /// Get or create the session for `guild_id`, refreshing its text channel and call.
    pub fn open(&self, guild_id: GuildId, text_channel: ChannelId, call: Option<Arc<Mutex<Call>>>) {
        let mut session = self
            .sessions
            .entry(guild_id)
            .or_insert_with(|| GuildSession::new(text_channel));

        session.text_channel = text_channel;
        if call.is_some() {
            session.call = call;
        }
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    /// Appends `songs` and decides whether playback has to be started.
    ///
    /// Returns `None` when the guild has no session.
    pub fn enqueue(&self, guild_id: GuildId, songs: Vec<Song>) -> Option<Enqueued> {
        let mut session = self.sessions.get_mut(&guild_id)?;

        if let Some(timer) = session.disconnect.take() {
            timer.cancel();
        }

        let added = songs.len();
        let start_now = session.is_idle() && added > 0;
        let first = session.queue.len() + 1;
        session.queue.extend(songs);

        if start_now {
            session.playing = true;
            Some(Enqueued::PlayNow { queued: added })
        } else {
            Some(Enqueued::Queued {
                first,
                last: session.queue.len(),
            })
        }
    }

    /// Moves the head of the queue into `current`. On an empty queue the
    /// session becomes idle.
    pub fn advance(&self, guild_id: GuildId) -> Advance {
        self.advance_if(guild_id, |_| true)
    }

    /// Like [`advance`](Self::advance), but only while `session_id` is still
    /// the guild's session. A replaced session is left untouched.
    pub fn advance_session(&self, guild_id: GuildId, session_id: u64) -> Advance {
        self.advance_if(guild_id, |session| session.id == session_id)
    }

    fn advance_if(&self, guild_id: GuildId, expected: impl FnOnce(&GuildSession) -> bool) -> Advance {
        let Some(mut session) = self.sessions.get_mut(&guild_id) else {
            return Advance::Closed;
        };
        if !expected(&*session) {
            return Advance::Closed;
        }
        session.track = None;

        match session.queue.pop_front() {
            Some(song) => {
                session.current = Some(song.clone());
                session.playing = true;
                Advance::Next(song)
            }
            None => {
                session.current = None;
                session.playing = false;
                Advance::Drained
            }
        }
    }

    /// Stores the handle of the song that just started. Returns `false` when the
    /// session is gone, in which case the caller owns the orphaned track.
    pub fn set_track(&self, guild_id: GuildId, track: TrackHandle) -> bool {
        match self.sessions.get_mut(&guild_id) {
            Some(mut session) => {
                session.track = Some(track);
                true
            }
            None => false,
        }
    }

    pub fn is_current_track(&self, guild_id: GuildId, track: &TrackHandle) -> bool {
        self.sessions
            .get(&guild_id)
            .and_then(|session| session.track.as_ref().map(|t| t.uuid() == track.uuid()))
            .unwrap_or(false)
    }

    /// Clears the stored handle if it is `track`. Only the first caller for a
    /// given track gets `true`, so an ended track advances the queue once.
    pub fn release_track(&self, guild_id: GuildId, track: &TrackHandle) -> bool {
        let Some(mut session) = self.sessions.get_mut(&guild_id) else {
            return false;
        };

        if session.track.as_ref().is_some_and(|t| t.uuid() == track.uuid()) {
            session.track = None;
            true
        } else {
            false
        }
    }

    pub fn current_track(&self, guild_id: GuildId) -> Option<TrackHandle> {
        self.sessions.get(&guild_id)?.track.clone()
    }

    pub fn current_song(&self, guild_id: GuildId) -> Option<Song> {
        self.sessions.get(&guild_id)?.current.clone()
    }

    pub fn call(&self, guild_id: GuildId) -> Option<Arc<Mutex<Call>>> {
        self.sessions.get(&guild_id)?.call.clone()
    }

    pub fn text_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.sessions.get(&guild_id).map(|session| session.text_channel)
    }

    pub fn snapshot(&self, guild_id: GuildId) -> Option<QueueSnapshot> {
        let session = self.sessions.get(&guild_id)?;
        Some(QueueSnapshot {
            current: session.current.clone(),
            upcoming: session.queue.iter().cloned().collect(),
        })
    }

    /// Arms the idle timer. Refused (and the timer aborted) unless the session
    /// exists and is idle. A previously armed timer is replaced.
    pub fn arm_disconnect(&self, guild_id: GuildId, timer: DisconnectTimer) -> bool {
        match self.sessions.get_mut(&guild_id) {
            Some(mut session) if session.is_idle() => {
                debug!("Arming disconnect timer {} for guild {}", timer.id, guild_id);
                if let Some(previous) = session.disconnect.replace(timer) {
                    previous.cancel();
                }
                true
            }
            _ => {
                timer.cancel();
                false
            }
        }
    }

    /// Removes the session if timer `timer_id` is still the armed one and the
    /// guild is still idle. Called from inside the timer task, so the timer is
    /// detached rather than aborted.
    pub fn take_expired(&self, guild_id: GuildId, timer_id: u64) -> Option<GuildSession> {
        let (_, mut session) = self.sessions.remove_if(&guild_id, |_, session| {
            session.is_idle()
                && session
                    .disconnect
                    .as_ref()
                    .is_some_and(|timer| timer.id == timer_id)
        })?;

        session.disconnect = None;
        Some(session)
    }

    /// Counts a playback failure. `None` when the session is gone.
    pub fn record_failure(&self, guild_id: GuildId) -> Option<FailureStreak> {
        let mut session = self.sessions.get_mut(&guild_id)?;
        session.consecutive_failures += 1;
        Some(FailureStreak {
            session_id: session.id,
            failures: session.consecutive_failures,
        })
    }

    pub fn reset_failures(&self, guild_id: GuildId) {
        if let Some(mut session) = self.sessions.get_mut(&guild_id) {
            session.consecutive_failures = 0;
        }
    }

    /// Removes the session. A second call returns `None`.
    pub fn remove(&self, guild_id: GuildId) -> Option<GuildSession> {
        self.sessions.remove(&guild_id).map(|(_, session)| session)
    }
}
