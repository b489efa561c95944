use poise::CreateReply;

use crate::commands::music::utils::{
    embedded_messages,
    event_handlers::{PlaybackContext, cleanup},
    music_manager::MusicError,
};
use crate::{CommandResult, Context};

/// Stop the music, clear the queue and leave the voice channel
#[poise::command(prefix_command, slash_command, guild_only, category = "Music")]
pub async fn stop(ctx: Context<'_>) -> CommandResult {
    let guild_id = ctx.guild_id().ok_or(MusicError::NotInGuild)?;
    let pctx = PlaybackContext::from_command(ctx).await?;

    let active = pctx.sessions.contains(guild_id) || pctx.songbird.get(guild_id).is_some();
    cleanup(&pctx, guild_id).await;

    let embed = if active {
        embedded_messages::stopped()
    } else {
        embedded_messages::nothing_playing()
    };

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}
