//! Sample songs, requesters and search hits used across tests

use fake::Fake;
use fake::faker::name::en::Name;
use rusty_dj::commands::music::audio_sources::track_metadata::{
    Requester, Song, SongSource, VideoInfo,
};
use serenity::all::{ChannelId, GuildId, UserId};
use std::time::Duration;

pub const SAMPLE_GUILD_ID: u64 = 123456789;
pub const SAMPLE_CHANNEL_ID: u64 = 987654321;

pub fn guild() -> GuildId {
    GuildId::new(SAMPLE_GUILD_ID)
}

pub fn text_channel() -> ChannelId {
    ChannelId::new(SAMPLE_CHANNEL_ID)
}

pub fn requester() -> Requester {
    Requester {
        id: UserId::new((1..1_000_000u64).fake()),
        name: Name().fake(),
        avatar_url: "https://cdn.discordapp.com/embed/avatars/0.png".to_string(),
    }
}

pub fn video(title: &str, id: &str) -> VideoInfo {
    VideoInfo {
        url: format!("https://www.youtube.com/watch?v={}", id),
        title: title.to_string(),
        duration: Some(Duration::from_secs(180)),
        thumbnail: Some(format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", id)),
        uploader: Some("Queen Official".to_string()),
    }
}

pub fn song(title: &str) -> Song {
    video(title, &title.replace(' ', "_")).into_song(requester(), SongSource::Youtube)
}
