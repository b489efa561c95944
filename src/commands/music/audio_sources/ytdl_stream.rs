//! Produces the raw audio stream for a song by spawning `yt-dlp` and handing
//! its stdout to songbird.

use songbird::input::{ChildContainer, Input};
use std::process::{Command, Stdio};
use tracing::{debug, info};

use super::AudioSourceResult;
use crate::commands::music::utils::music_manager::MusicError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Settings shared by every spawned extraction process.
#[derive(Debug, Clone)]
pub struct YtdlStream {
    cookie: Option<String>,
    user_agent: String,
}

impl YtdlStream {
    pub fn new(cookie: Option<String>) -> Self {
        Self {
            cookie,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Arguments passed to yt-dlp for `url`: best audio only, no playlist
    /// expansion, raw bytes on stdout.
    pub fn args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            "bestaudio/best".to_string(),
            "--no-playlist".to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--add-header".to_string(),
            format!("User-Agent: {}", self.user_agent),
        ];

        if let Some(cookie) = &self.cookie {
            args.push("--add-header".to_string());
            args.push(format!("Cookie: {}", cookie));
        }

        args.extend(["-o".to_string(), "-".to_string(), url.to_string()]);
        args
    }

    /// Spawns yt-dlp for `url` and wraps its stdout as a playable input.
    /// Failures once the process runs surface through the track's error event.
    pub fn spawn(&self, url: &str) -> AudioSourceResult<Input> {
        info!("Spawning yt-dlp audio stream for {}", url);

        let child = Command::new("yt-dlp")
            .args(self.args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                MusicError::AudioSourceError(format!("Failed to start yt-dlp for {}: {}", url, e))
            })?;

        debug!("yt-dlp running with pid {}", child.id());
        Ok(ChildContainer::from(child).into())
    }
}
