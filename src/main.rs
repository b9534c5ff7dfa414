use std::sync::Arc;

use constants::STARTUP_TIME;
use poise::serenity_prelude::ChannelId;

use crate::{
    remote::PostsClient, repository::SqliteQuoteRepository, sync_engine::SyncEngine,
};

type QuoteService = SyncEngine<PostsClient, SqliteQuoteRepository>;

#[derive(Clone)]
struct Data {
    notify_channel_id: Option<ChannelId>,
    quotes: Arc<QuoteService>,
}

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

mod commands;
mod config;
mod constants;
mod errors;
mod init;
mod models;
mod notifier;
mod remote;
mod repository;
mod store;
mod sync_engine;
mod telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _ = &*STARTUP_TIME;

    let mut client = init::init().await?;

    client.start().await?;

    Ok(())
}
