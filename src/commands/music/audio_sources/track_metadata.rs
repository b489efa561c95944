//! Defines `Song`, the unified representation of a playable track regardless of
//! where the request came from, together with who asked for it.

use serde::{Deserialize, Serialize};
use serenity::all::{User, UserId};
use std::time::Duration;

/// Where the playable URL of a song was found.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SongSource {
    /// Searched or linked directly on YouTube.
    Youtube,
    /// A Spotify track whose audio was located by searching YouTube.
    SpotifyViaYoutube,
}

impl SongSource {
    /// Human readable label shown in embed footers.
    pub fn label(&self) -> &'static str {
        match self {
            SongSource::Youtube => "YouTube",
            SongSource::SpotifyViaYoutube => "Spotify → YouTube",
        }
    }
}

/// The user who asked for a song.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Requester {
    pub id: UserId,
    /// Display tag, e.g. `name` or `name#1234`.
    pub name: String,
    pub avatar_url: String,
}

impl From<&User> for Requester {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.tag(),
            avatar_url: user.face(),
        }
    }
}

/// A resolved, playable song. Never mutated once queued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Song {
    pub title: String,
    /// Page URL handed to yt-dlp when the song is played.
    pub url: String,
    #[serde(with = "humantime_serde")]
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    /// Channel or uploader name, when the provider reports one.
    #[serde(default)]
    pub uploader: Option<String>,
    pub requester: Requester,
    pub source: SongSource,
}

/// Search hit returned by a video search provider.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub url: String,
    pub title: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub uploader: Option<String>,
}

impl VideoInfo {
    pub fn into_song(self, requester: Requester, source: SongSource) -> Song {
        Song {
            title: self.title,
            url: self.url,
            duration: self.duration,
            thumbnail: self.thumbnail,
            uploader: self.uploader,
            requester,
            source,
        }
    }
}

/// A playlist as listed by the video provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistInfo {
    pub title: String,
    pub entries: Vec<VideoInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_labels() {
        assert_eq!(SongSource::Youtube.label(), "YouTube");
        assert_eq!(SongSource::SpotifyViaYoutube.label(), "Spotify → YouTube");
    }

    #[test]
    fn song_duration_serializes_as_humantime() {
        let song = VideoInfo {
            url: "https://www.youtube.com/watch?v=fJ9rUzIMcZQ".into(),
            title: "Queen – Bohemian Rhapsody".into(),
            duration: Some(Duration::from_secs(354)),
            thumbnail: None,
            uploader: Some("Queen Official".into()),
        }
        .into_song(
            Requester {
                id: UserId::new(42),
                name: "freddie".into(),
                avatar_url: "https://cdn.discordapp.com/embed/avatars/0.png".into(),
            },
            SongSource::Youtube,
        );

        let json = serde_json::to_value(&song).unwrap();
        assert_eq!(json["duration"], "5m 54s");
        assert_eq!(json["source"], "Youtube");
        assert_eq!(json["uploader"], "Queen Official");

        let back: Song = serde_json::from_value(json).unwrap();
        assert_eq!(back, song);
    }
}
