//! rusty-dj: a Discord music bot that streams YouTube audio (and Spotify tracks
//! resolved through YouTube) into voice channels, one in-memory queue per guild.

use std::sync::{Arc, LazyLock};

pub mod commands;
pub mod config;

use commands::music::utils::{
    event_handlers::PlayerSettings, session::SessionRegistry,
};
use commands::music::audio_sources::TrackResolver;
use config::BotConfig;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
pub type CommandResult = Result<(), Error>;

/// Shared HTTP client for every outbound REST call.
pub static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(reqwest::Client::new);

/// User data, which is stored and accessible in all command invocations
pub struct Data {
    pub config: Arc<BotConfig>,
    pub resolver: TrackResolver,
    pub sessions: Arc<SessionRegistry>,
    pub player_settings: Arc<PlayerSettings>,
}

impl Data {
    pub fn new(config: BotConfig) -> Self {
        let resolver = TrackResolver::from_config(&config);
        let player_settings = Arc::new(PlayerSettings::from_config(&config));

        Self {
            config: Arc::new(config),
            resolver,
            sessions: Arc::new(SessionRegistry::default()),
            player_settings,
        }
    }
}
