//! Video search backed by the `yt-dlp` command-line tool.
//! Searches, single videos and flat playlists are all read from its JSON output.

use serde::Deserialize;
use serenity::async_trait;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

use super::track_metadata::{PlaylistInfo, VideoInfo};
use super::{AudioSourceResult, VideoSearch};
use crate::commands::music::utils::music_manager::MusicError;

const YTDLP: &str = "yt-dlp";

/// The subset of yt-dlp's info JSON we care about.
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<YtDlpThumbnail>,
    uploader: Option<String>,
    channel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YtDlpThumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct YtDlpPlaylist {
    title: Option<String>,
    #[serde(default)]
    entries: Vec<Option<YtDlpEntry>>,
}

impl YtDlpEntry {
    fn into_video_info(self) -> Option<VideoInfo> {
        let url = self
            .webpage_url
            .or_else(|| self.url.filter(|u| u.starts_with("http")))
            .or_else(|| {
                self.id
                    .as_ref()
                    .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            })?;

        let thumbnail = self
            .thumbnail
            .or_else(|| self.thumbnails.into_iter().last().map(|t| t.url));

        Some(VideoInfo {
            url,
            title: self.title.unwrap_or_else(|| "Unknown Title".to_string()),
            uploader: self.uploader.or(self.channel),
            duration: self
                .duration
                .filter(|d| d.is_finite() && *d >= 0.0)
                .map(Duration::from_secs_f64),
            thumbnail,
        })
    }
}

/// Parses `yt-dlp -j` output: one JSON object per line, in ranking order.
/// Lines that do not parse are skipped.
pub fn parse_video_lines(stdout: &str) -> Vec<VideoInfo> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpEntry>(line) {
            Ok(entry) => entry.into_video_info(),
            Err(e) => {
                warn!("Skipping unparsable yt-dlp line: {}", e);
                None
            }
        })
        .collect()
}

/// Parses `yt-dlp -J --flat-playlist` output into a playlist.
pub fn parse_playlist(stdout: &str) -> AudioSourceResult<Option<PlaylistInfo>> {
    if stdout.trim().is_empty() {
        return Ok(None);
    }

    let playlist: YtDlpPlaylist = serde_json::from_str(stdout).map_err(|e| {
        MusicError::AudioSourceError(format!("Failed to parse playlist metadata: {}", e))
    })?;

    let entries: Vec<VideoInfo> = playlist
        .entries
        .into_iter()
        .flatten()
        .filter_map(YtDlpEntry::into_video_info)
        .collect();

    if entries.is_empty() {
        return Ok(None);
    }

    Ok(Some(PlaylistInfo {
        title: playlist.title.unwrap_or_else(|| "Unknown Playlist".to_string()),
        entries,
    }))
}

/// The main struct implementing YouTube lookups (via `yt-dlp`).
#[derive(Default)]
pub struct YoutubeApi;

impl YoutubeApi {
    /// Checks if the input string is a YouTube video URL (watch page, shorts or youtu.be).
    pub fn is_youtube_url(query: &str) -> bool {
        let Ok(url) = Url::parse(query) else {
            return false;
        };

        match url.host_str() {
            Some("youtu.be") => url.path().len() > 1,
            Some("www.youtube.com" | "youtube.com" | "m.youtube.com" | "music.youtube.com") => {
                url.path().starts_with("/watch") || url.path().starts_with("/shorts/")
            }
            _ => false,
        }
    }

    /// Checks if the input string is a YouTube playlist page.
    pub fn is_playlist_url(query: &str) -> bool {
        let Ok(url) = Url::parse(query) else {
            return false;
        };

        matches!(
            url.host_str(),
            Some("www.youtube.com" | "youtube.com" | "m.youtube.com" | "music.youtube.com")
        ) && url.path() == "/playlist"
            && url.query_pairs().any(|(key, _)| key == "list")
    }

    async fn run(args: &[&str]) -> AudioSourceResult<String> {
        debug!("Running {} {:?}", YTDLP, args);
        let output = Command::new(YTDLP)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MusicError::ExternalApiError(format!("Failed to run {}: {}", YTDLP, e)))?;

        Self::stdout(output)
    }

    fn stdout(output: Output) -> AudioSourceResult<String> {
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| line.contains("ERROR"))
                .unwrap_or_else(|| stderr.trim())
                .to_string();
            warn!("yt-dlp exited with {}: {}", output.status, reason);
            return Err(MusicError::LoadFailed(reason));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl VideoSearch for YoutubeApi {
    async fn search(&self, query: &str, limit: usize) -> AudioSourceResult<Vec<VideoInfo>> {
        info!("Searching YouTube for: {}", query);
        let search_param = format!("ytsearch{}:{}", limit.max(1), query);

        let stdout = Self::run(&["-j", "--no-playlist", "--no-warnings", &search_param]).await?;
        Ok(parse_video_lines(&stdout))
    }

    async fn video(&self, url: &str) -> AudioSourceResult<Option<VideoInfo>> {
        info!("Fetching YouTube metadata for URL: {}", url);

        let stdout = Self::run(&["-j", "--no-playlist", "--no-warnings", url]).await?;
        Ok(parse_video_lines(&stdout).into_iter().next())
    }

    async fn playlist(&self, url: &str) -> AudioSourceResult<Option<PlaylistInfo>> {
        info!("Fetching YouTube playlist: {}", url);

        let stdout = Self::run(&["-J", "--flat-playlist", "--no-warnings", url]).await?;
        parse_playlist(&stdout)
    }
}
