//! This module turns what a user typed into playable songs.
//! It classifies the query, talks to the search and metadata providers, and
//! reports the outcome as a [`LoadResult`].

/// Submodule implementing the Spotify track lookup.
pub mod spotify;
/// Submodule defining `Song` and the provider-side track descriptions.
pub mod track_metadata;
/// Submodule implementing `VideoSearch` with `yt-dlp`.
pub mod youtube;
/// Submodule spawning the audio extraction process.
pub mod ytdl_stream;

use serenity::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::commands::music::utils::music_manager::MusicError;
use crate::config::BotConfig;
use spotify::SpotifyApi;
use track_metadata::{PlaylistInfo, Requester, Song, SongSource, VideoInfo};
use youtube::YoutubeApi;

/// A specialized `Result` type for operations within the `audio_sources` module.
pub type AudioSourceResult<T> = Result<T, MusicError>;

/// Number of search hits requested when only the first one is used.
const SEARCH_LIMIT: usize = 1;

/// Trait for the video provider: text search plus direct URL lookups.
#[async_trait]
pub trait VideoSearch: Send + Sync {
    /// Ranked results for a free-text query, best match first.
    async fn search(&self, query: &str, limit: usize) -> AudioSourceResult<Vec<VideoInfo>>;

    /// Metadata for a single video page.
    async fn video(&self, url: &str) -> AudioSourceResult<Option<VideoInfo>>;

    /// Entries of a playlist page.
    async fn playlist(&self, url: &str) -> AudioSourceResult<Option<PlaylistInfo>>;
}

/// What kind of input the user gave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    SpotifyTrack(String),
    SpotifyCollection,
    YoutubeVideo(String),
    YoutubePlaylist(String),
    Search(String),
}

impl QueryKind {
    pub fn classify(query: &str) -> Self {
        let query = query.trim();

        if let Some(id) = SpotifyApi::extract_track_id(query) {
            QueryKind::SpotifyTrack(id)
        } else if SpotifyApi::is_collection_url(query) {
            QueryKind::SpotifyCollection
        } else if YoutubeApi::is_playlist_url(query) {
            QueryKind::YoutubePlaylist(query.to_string())
        } else if YoutubeApi::is_youtube_url(query) {
            QueryKind::YoutubeVideo(query.to_string())
        } else {
            QueryKind::Search(query.to_string())
        }
    }
}

/// Outcome of resolving a query.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult {
    /// Nothing matched.
    NotFound,
    /// The provider refused or failed to load the item.
    LoadFailed(String),
    /// A single playable song.
    Track(Song),
    /// Several songs from one playlist, in playlist order.
    Playlist { name: String, songs: Vec<Song> },
}

/// Resolves user queries against YouTube and, when configured, Spotify.
pub struct TrackResolver {
    search: Arc<dyn VideoSearch>,
    spotify: Option<SpotifyApi>,
}

impl TrackResolver {
    pub fn new(search: Arc<dyn VideoSearch>, spotify: Option<SpotifyApi>) -> Self {
        Self { search, spotify }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(
            Arc::new(YoutubeApi),
            config.spotify.clone().map(SpotifyApi::new),
        )
    }

    /// Resolve `query` on behalf of `requester`.
    ///
    /// Provider refusals become [`LoadResult::LoadFailed`]; network, auth and
    /// configuration problems are returned as errors.
    pub async fn resolve(&self, query: &str, requester: &Requester) -> AudioSourceResult<LoadResult> {
        let kind = QueryKind::classify(query);
        info!("Resolving {:?} for {}", kind, requester.name);

        let result = match kind {
            QueryKind::SpotifyTrack(id) => self.resolve_spotify_track(&id, requester).await,
            QueryKind::SpotifyCollection => Ok(LoadResult::LoadFailed(
                "Spotify playlists and albums are not supported, link a single track instead"
                    .to_string(),
            )),
            QueryKind::YoutubeVideo(url) => Ok(match self.search.video(&url).await? {
                Some(video) => LoadResult::Track(video.into_song(requester.clone(), SongSource::Youtube)),
                None => LoadResult::NotFound,
            }),
            QueryKind::YoutubePlaylist(url) => self.resolve_playlist(&url, requester).await,
            QueryKind::Search(text) => self.first_hit(&text, requester, SongSource::Youtube).await,
        };

        match result {
            Err(MusicError::LoadFailed(reason)) => {
                warn!("Provider failed to load {}: {}", query, reason);
                Ok(LoadResult::LoadFailed(reason))
            }
            other => other,
        }
    }

    async fn first_hit(
        &self,
        query: &str,
        requester: &Requester,
        source: SongSource,
    ) -> AudioSourceResult<LoadResult> {
        let hit = self.search.search(query, SEARCH_LIMIT).await?.into_iter().next();

        Ok(match hit {
            Some(video) => LoadResult::Track(video.into_song(requester.clone(), source)),
            None => LoadResult::NotFound,
        })
    }

    async fn resolve_spotify_track(
        &self,
        track_id: &str,
        requester: &Requester,
    ) -> AudioSourceResult<LoadResult> {
        let spotify = self.spotify.as_ref().ok_or_else(|| {
            MusicError::ConfigError(
                "Spotify links need SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET".to_string(),
            )
        })?;

        let Some(track) = spotify.get_track(track_id).await? else {
            return Ok(LoadResult::NotFound);
        };

        let query = track.search_query();
        info!("Searching YouTube for Spotify track: {}", query);
        self.first_hit(&query, requester, SongSource::SpotifyViaYoutube)
            .await
    }

    async fn resolve_playlist(&self, url: &str, requester: &Requester) -> AudioSourceResult<LoadResult> {
        let Some(playlist) = self.search.playlist(url).await? else {
            return Ok(LoadResult::NotFound);
        };

        let songs = playlist
            .entries
            .into_iter()
            .map(|video| video.into_song(requester.clone(), SongSource::Youtube))
            .collect();

        Ok(LoadResult::Playlist {
            name: playlist.title,
            songs,
        })
    }
}
