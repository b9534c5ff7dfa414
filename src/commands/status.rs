use std::time::UNIX_EPOCH;

use crate::{
    commands::get_bot_avatar,
    constants::{version::get_version, POISE_VERSION, STARTUP_TIME},
    models::quotes::SyncState,
    Context, Error,
};
use poise::serenity_prelude as serenity;

/// get the bot's status.
#[poise::command(prefix_command)]
#[tracing::instrument(skip_all)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let quotes = &ctx.data().quotes;

    let count = quotes.len().await;
    let categories = quotes.categories().await.len();

    let last_sync = match (quotes.state(), quotes.last_synced_at().await) {
        (SyncState::Syncing, _) => "syncing now...".to_string(),
        (SyncState::Idle, Some(at)) => format!("<t:{}:R>", at.unix_timestamp()),
        (SyncState::Idle, None) => "never".to_string(),
    };

    let notifications = match ctx.data().notify_channel_id {
        Some(channel_id) => format!("<#{}>", channel_id),
        None => "logs only".to_string(),
    };

    let uptime = STARTUP_TIME
        .duration_since(UNIX_EPOCH)
        .map(|d| format!("<t:{}:R>", d.as_secs()))
        .unwrap_or_else(|_| "unknown".to_string());

    ctx.send(poise::CreateReply::default().embed(
        serenity::CreateEmbed::new()
        .field(
            "about the bot",
            "a quote keeper that shows a random quote on demand and keeps its list in sync with a remote quote server, written using the [poise](https://github.com/serenity-rs/poise) framework.".to_string(),
            false
        )
        .field("version", get_version(), false)
        .field("rust", format!("[{0}](https://releases.rs/docs/{0})", rustc_version_runtime::version()), true)
        .field("poise", format!("[{0}](https://docs.rs/crate/poise/{0})", POISE_VERSION), true)
        .field("quotes stored", format!("{} in {} categories", count, categories), true)
        .field("last sync", last_sync, true)
        .field("notifications", notifications, true)
        .field("uptime", uptime, true)
        .thumbnail(get_bot_avatar(ctx))
    ))
    .await
    .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when sending reply"))?;

    Ok(())
}
