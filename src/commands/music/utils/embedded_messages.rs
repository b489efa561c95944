use serenity::all::{CreateEmbed, CreateEmbedFooter, Timestamp};
use std::fmt::Display;
use std::time::Duration;

use super::{
    format_duration,
    music_manager::{ErrorKind, MusicError},
    session::QueueSnapshot,
};
use crate::commands::music::audio_sources::track_metadata::{Song, SongSource};

pub const PRIMARY: u32 = 0x7289DA;
pub const SUCCESS: u32 = 0x43B581;
pub const ERROR: u32 = 0xF04747;
pub const WARNING: u32 = 0xFAA61A;
pub const SPOTIFY: u32 = 0x1DB954;
pub const YOUTUBE: u32 = 0xFF0000;

/// Songs listed by the queue embed.
const QUEUE_PAGE: usize = 10;

fn base(title: &str, color: u32) -> CreateEmbed {
    CreateEmbed::new()
        .title(title)
        .color(color)
        .timestamp(Timestamp::now())
}

fn source_color(source: SongSource) -> u32 {
    match source {
        SongSource::Youtube => YOUTUBE,
        SongSource::SpotifyViaYoutube => SPOTIFY,
    }
}

fn song_footer(song: &Song) -> CreateEmbedFooter {
    CreateEmbedFooter::new(format!(
        "Requested by {} • {}",
        song.requester.name,
        song.source.label()
    ))
    .icon_url(&song.requester.avatar_url)
}

fn duration_str(duration: Option<Duration>) -> String {
    duration
        .map(format_duration)
        .unwrap_or_else(|| "Live / unknown".to_string())
}

fn song_embed(title: &str, song: &Song) -> CreateEmbed {
    let mut embed = base(title, source_color(song.source))
        .description(format!("**[{}]({})**", song.title, song.url))
        .field("⏱️ Duration", format!("`{}`", duration_str(song.duration)), true)
        .field("👤 Author", song.uploader.as_deref().unwrap_or("Unknown"), true)
        .footer(song_footer(song));

    if let Some(thumbnail) = &song.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }
    embed
}

/// How to call the play command.
pub fn usage(prefix: &str) -> CreateEmbed {
    base("🎵 Play music", PRIMARY)
        .description("Give me a song name or a link and I will play it in your voice channel.")
        .field(
            "📝 Usage",
            format!("`{prefix}play <song name>`\n`{prefix}play <URL>`"),
            false,
        )
        .field(
            "💡 Examples",
            format!(
                "`{prefix}play bohemian rhapsody`\n\
                 `{prefix}play https://www.youtube.com/watch?v=fJ9rUzIMcZQ`\n\
                 `{prefix}play https://open.spotify.com/track/4u7EnebtmKWzUH433cf5Qv`"
            ),
            false,
        )
        .field("🔗 Sources", "YouTube videos and playlists, Spotify tracks", false)
}

pub fn voice_channel_required() -> CreateEmbed {
    base("🔇 Join a voice channel", WARNING)
        .description("You need to be in a voice channel to play music.")
}

pub fn missing_permissions() -> CreateEmbed {
    base("🚫 Missing permissions", ERROR)
        .description("I need the **Connect** and **Speak** permissions in your voice channel.")
}

pub fn searching(query: &str) -> CreateEmbed {
    base("🔍 Searching...", PRIMARY).description(format!("`{}`", query))
}

pub fn not_found(query: &str) -> CreateEmbed {
    base("❌ No results", ERROR).description(format!("Nothing matched `{}`.", query))
}

pub fn load_failed(reason: &str) -> CreateEmbed {
    base("❌ Could not load that", ERROR).description(reason)
}

pub fn now_playing(song: &Song) -> CreateEmbed {
    song_embed("🎵 Now Playing", song)
}

pub fn added_to_queue(song: &Song, position: usize) -> CreateEmbed {
    song_embed("➕ Added to Queue", song).field("📋 Position", format!("`#{}`", position), true)
}

/// A playlist appended in one go. `first..=last` are queue positions, or
/// `None` when the first song starts playing right away.
pub fn playlist_added(name: &str, songs: &[Song], positions: Option<(usize, usize)>) -> CreateEmbed {
    let total: Duration = songs.iter().filter_map(|song| song.duration).sum();

    let mut embed = base("📃 Playlist Added", YOUTUBE)
        .description(format!("**{}**", name))
        .field("🎶 Songs", format!("`{}`", songs.len()), true)
        .field("⏱️ Total Duration", format!("`{}`", format_duration(total)), true);

    embed = match positions {
        Some((first, last)) => embed.field("📋 Positions", format!("`#{}` - `#{}`", first, last), true),
        None => embed.field("▶️ Starting with", songs.first().map(|s| s.title.as_str()).unwrap_or("-"), false),
    };

    match songs.first() {
        Some(song) => {
            let embed = embed.footer(song_footer(song));
            match &song.thumbnail {
                Some(thumbnail) => embed.thumbnail(thumbnail),
                None => embed,
            }
        }
        None => embed,
    }
}

/// Reply for an error raised while handling a command, chosen by its kind.
pub fn from_error(err: &MusicError) -> CreateEmbed {
    match err.kind() {
        ErrorKind::UserInput => match err {
            MusicError::UserNotInVoiceChannel => voice_channel_required(),
            MusicError::MissingVoicePermissions => missing_permissions(),
            other => base("⚠️ Can't do that", WARNING).description(other.to_string()),
        },
        ErrorKind::NotFound => base("❌ No results", ERROR).description(err.to_string()),
        ErrorKind::Connection => base("🔌 Voice connection failed", ERROR)
            .description(format!("{}. Try again in a moment.", err)),
        ErrorKind::ExternalService => match err {
            MusicError::LoadFailed(reason) => load_failed(reason),
            other => unexpected_error(other),
        },
        ErrorKind::Playback => playback_error(None, &err.to_string()),
    }
}

pub fn unexpected_error(err: impl Display) -> CreateEmbed {
    base("❌ Something went wrong", ERROR).description(err.to_string())
}

pub fn playback_error(song: Option<&Song>, reason: &str) -> CreateEmbed {
    let title = song.map(|s| s.title.as_str()).unwrap_or("the current song");
    base("⚠️ Playback error", ERROR)
        .description(format!("Could not play **{}**: {}", title, reason))
}

pub fn retries_exhausted(failures: u32) -> CreateEmbed {
    base("🛑 Giving up", ERROR).description(format!(
        "{} songs in a row failed to play. Leaving the voice channel.",
        failures
    ))
}

pub fn queue_drained(idle: Duration) -> CreateEmbed {
    base("📭 Queue finished", WARNING).description(format!(
        "Add more songs within {} seconds or I will leave the voice channel.",
        idle.as_secs()
    ))
}

pub fn finished() -> CreateEmbed {
    base("👋 Disconnected", PRIMARY).description("Nothing left to play, see you next time!")
}

pub fn skipped(song: Option<&Song>) -> CreateEmbed {
    let description = match song {
        Some(song) => format!("Skipped **{}**", song.title),
        None => "Skipped the current song".to_string(),
    };
    base("⏭️ Skipped", SUCCESS).description(description)
}

pub fn stopped() -> CreateEmbed {
    base("⏹️ Stopped", SUCCESS).description("Cleared the queue and left the voice channel.")
}

pub fn nothing_playing() -> CreateEmbed {
    base("🔇 Nothing playing", WARNING).description("The queue is empty.")
}

/// Now playing plus the next songs in line.
pub fn music_queue(snapshot: &QueueSnapshot) -> CreateEmbed {
    let mut description = String::new();

    match &snapshot.current {
        Some(song) => {
            description.push_str("**🎵 Now Playing**\n");
            description.push_str(&format!(
                "**[{}]({})** `{}`\n\n",
                song.title,
                song.url,
                duration_str(song.duration)
            ));
        }
        None => description.push_str("**🔇 Nothing playing**\n\n"),
    }

    if snapshot.upcoming.is_empty() {
        description.push_str("**📭 Queue is empty**");
    } else {
        description.push_str(&format!(
            "**📋 Queue - {} tracks**\n",
            snapshot.upcoming.len()
        ));
        for (index, song) in snapshot.upcoming.iter().take(QUEUE_PAGE).enumerate() {
            description.push_str(&format!(
                "`{}.` [{}]({}) `{}`\n",
                index + 1,
                song.title,
                song.url,
                duration_str(song.duration)
            ));
        }

        let hidden = snapshot.upcoming.len().saturating_sub(QUEUE_PAGE);
        if hidden > 0 {
            description.push_str(&format!("...and {} more\n", hidden));
        }

        let total = snapshot.upcoming_duration();
        if total.as_secs() > 0 {
            description.push_str(&format!(
                "\n**⏱️ Total Duration:** `{}`",
                format_duration(total)
            ));
        }
    }

    base("🎵 Music Queue", PRIMARY).description(description)
}
