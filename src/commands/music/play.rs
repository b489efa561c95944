use poise::CreateReply;
use serenity::all::{ChannelId, CreateEmbed};
use tracing::{error, info};

use crate::commands::music::audio_sources::LoadResult;
use crate::commands::music::audio_sources::track_metadata::{Requester, Song};
use crate::commands::music::utils::{
    embedded_messages,
    event_handlers::{PlayOutcome, PlaybackContext, cleanup, play_next_track},
    music_manager::{ErrorKind, MusicError, MusicManager, MusicResult},
    session::Enqueued,
};
use crate::{CommandResult, Context};

/// Play a song from YouTube, a YouTube playlist or a Spotify track link
#[poise::command(prefix_command, slash_command, guild_only, category = "Music")]
pub async fn play(
    ctx: Context<'_>,
    #[description = "Song name or URL"]
    #[rest]
    query: Option<String>,
) -> CommandResult {
    let query = match normalize_query(query) {
        Ok(query) => query,
        Err(_) => {
            ctx.send(CreateReply::default().embed(embedded_messages::usage(ctx.prefix())))
                .await?;
            return Ok(());
        }
    };

    info!("Received play command with query: {}", query);
    let guild_id = ctx.guild_id().ok_or(MusicError::NotInGuild)?;

    let channel_id =
        match MusicManager::get_voice_target(ctx.serenity_context(), guild_id, ctx.author().id) {
            Ok(channel_id) => channel_id,
            Err(err) => {
                ctx.send(
                    CreateReply::default()
                        .embed(embedded_messages::from_error(&err))
                        .ephemeral(true),
                )
                .await?;
                return Ok(());
            }
        };

    let reply = ctx
        .send(CreateReply::default().embed(embedded_messages::searching(&query)))
        .await?;

    let requester = Requester::from(ctx.author());
    let (playlist_name, songs) = match ctx.data().resolver.resolve(&query, &requester).await {
        Ok(LoadResult::Track(song)) => (None, vec![song]),
        Ok(LoadResult::Playlist { name, songs }) if !songs.is_empty() => (Some(name), songs),
        Ok(LoadResult::Playlist { .. }) | Ok(LoadResult::NotFound) => {
            reply
                .edit(ctx, CreateReply::default().embed(embedded_messages::not_found(&query)))
                .await?;
            return Ok(());
        }
        Ok(LoadResult::LoadFailed(reason)) => {
            reply
                .edit(ctx, CreateReply::default().embed(embedded_messages::load_failed(&reason)))
                .await?;
            return Ok(());
        }
        Err(err) => {
            error!("Failed to resolve '{}': {}", query, err);
            reply
                .edit(ctx, CreateReply::default().embed(embedded_messages::from_error(&err)))
                .await?;
            return Ok(());
        }
    };

    let embed = match start_or_queue(ctx, channel_id, playlist_name, songs).await {
        Ok(embed) => embed,
        Err(err) => {
            error!("Failed to queue '{}' in guild {}: {}", query, guild_id, err);
            embedded_messages::from_error(&err)
        }
    };

    reply.edit(ctx, CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Connects to voice, queues `songs` and starts playback when the guild was idle.
/// Returns the embed describing what happened.
async fn start_or_queue(
    ctx: Context<'_>,
    channel_id: ChannelId,
    playlist_name: Option<String>,
    songs: Vec<Song>,
) -> MusicResult<CreateEmbed> {
    let guild_id = ctx.guild_id().ok_or(MusicError::NotInGuild)?;
    let Some(first_song) = songs.first().cloned() else {
        return Err(MusicError::NotFound("empty playlist".to_string()));
    };
    let pctx = PlaybackContext::from_command(ctx).await?;

    let call = match MusicManager::join_channel(
        &pctx,
        guild_id,
        channel_id,
        pctx.settings.connect_timeout,
    )
    .await
    {
        Ok(call) => call,
        Err(err) => {
            if err.kind() == ErrorKind::Connection {
                cleanup(&pctx, guild_id).await;
            }
            return Err(err);
        }
    };

    pctx.sessions.open(guild_id, ctx.channel_id(), Some(call));
    let enqueued = pctx
        .sessions
        .enqueue(guild_id, songs.clone())
        .ok_or(MusicError::NotConnected)?;

    match (enqueued, playlist_name) {
        (Enqueued::PlayNow { queued }, None) => {
            info!("Starting playback of {} song(s) in guild {}", queued, guild_id);
            let outcome = play_next_track(pctx, guild_id, false).await?;
            Ok(started_reply(&outcome, &first_song))
        }
        (Enqueued::PlayNow { queued }, Some(name)) => {
            info!("Starting playlist '{}' ({} songs) in guild {}", name, queued, guild_id);
            Ok(match play_next_track(pctx, guild_id, true).await? {
                PlayOutcome::Closed => embedded_messages::stopped(),
                _ => embedded_messages::playlist_added(&name, &songs, None),
            })
        }
        (Enqueued::Queued { first, .. }, None) => {
            Ok(embedded_messages::added_to_queue(&first_song, first))
        }
        (Enqueued::Queued { first, last }, Some(name)) => Ok(embedded_messages::playlist_added(
            &name,
            &songs,
            Some((first, last)),
        )),
    }
}

/// Reply for a song the command tried to start right away.
fn started_reply(outcome: &PlayOutcome, requested: &Song) -> CreateEmbed {
    match outcome {
        PlayOutcome::Playing(song) => embedded_messages::now_playing(song),
        PlayOutcome::Failed => embedded_messages::playback_error(
            Some(requested),
            "the audio stream could not be started",
        ),
        // Someone else emptied the queue first.
        PlayOutcome::Idle => embedded_messages::nothing_playing(),
        // A concurrent stop removed the session.
        PlayOutcome::Closed => embedded_messages::stopped(),
    }
}

/// Trims the raw argument. Missing or blank input is rejected.
pub fn normalize_query(query: Option<String>) -> MusicResult<String> {
    let query = query.as_deref().map(str::trim).unwrap_or_default();

    if query.is_empty() {
        Err(MusicError::EmptyQuery)
    } else {
        Ok(query.to_string())
    }
}
