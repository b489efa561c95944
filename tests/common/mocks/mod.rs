//! Mock implementations for external dependencies

use async_trait::async_trait;
use mockall::mock;
use rusty_dj::commands::music::audio_sources::track_metadata::{PlaylistInfo, VideoInfo};
use rusty_dj::commands::music::audio_sources::{AudioSourceResult, VideoSearch};
use rusty_dj::commands::music::utils::event_handlers::{Notice, PlayerOutput};
use serenity::all::{ChannelId, CreateEmbed, GuildId};

mock! {
    pub Search {}

    #[async_trait]
    impl VideoSearch for Search {
        async fn search(&self, query: &str, limit: usize) -> AudioSourceResult<Vec<VideoInfo>>;
        async fn video(&self, url: &str) -> AudioSourceResult<Option<VideoInfo>>;
        async fn playlist(&self, url: &str) -> AudioSourceResult<Option<PlaylistInfo>>;
    }
}

mock! {
    pub Output {}

    #[async_trait]
    impl PlayerOutput for Output {
        async fn send(&self, channel_id: ChannelId, embed: CreateEmbed) -> Option<Notice>;
        async fn edit(&self, notice: Notice, embed: CreateEmbed);
        async fn leave(&self, guild_id: GuildId);
    }
}

/// Title of an embed handed to a mock.
pub fn embed_title(embed: &CreateEmbed) -> String {
    serde_json::to_value(embed)
        .ok()
        .and_then(|value| value["title"].as_str().map(str::to_string))
        .unwrap_or_default()
}
