use poise::CreateReply;

use crate::commands::music::utils::{embedded_messages, music_manager::MusicError};
use crate::{CommandResult, Context};

/// Show the current song and what plays next
#[poise::command(prefix_command, slash_command, guild_only, category = "Music")]
pub async fn queue(ctx: Context<'_>) -> CommandResult {
    let guild_id = ctx.guild_id().ok_or(MusicError::NotInGuild)?;

    let embed = match ctx.data().sessions.snapshot(guild_id) {
        Some(snapshot) => embedded_messages::music_queue(&snapshot),
        None => embedded_messages::nothing_playing(),
    };

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}
