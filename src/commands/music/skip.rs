use poise::CreateReply;
use tracing::{info, warn};

use crate::commands::music::utils::{embedded_messages, music_manager::MusicError};
use crate::{CommandResult, Context};

/// Skip the currently playing song
#[poise::command(prefix_command, slash_command, guild_only, category = "Music")]
pub async fn skip(ctx: Context<'_>) -> CommandResult {
    let guild_id = ctx.guild_id().ok_or(MusicError::NotInGuild)?;
    let sessions = &ctx.data().sessions;

    // Stopping the track fires its end event, which advances the queue.
    let embed = match sessions.current_track(guild_id) {
        Some(track) => {
            let song = sessions.current_song(guild_id);
            if let Err(e) = track.stop() {
                warn!("Failed to stop track in guild {}: {}", guild_id, e);
            }
            info!("Skipped track in guild {}", guild_id);
            embedded_messages::skipped(song.as_ref())
        }
        None => embedded_messages::nothing_playing(),
    };

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}
