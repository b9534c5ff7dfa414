use std::{str::FromStr, sync::Arc};

use futures::StreamExt;
use poise::serenity_prelude::{self as serenity, *};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::{
    commands, config::SyncConfig, notifier, remote::PostsClient,
    repository::SqliteQuoteRepository, sync_engine::SyncEngine, telemetry, Data, QuoteService,
};

async fn init_database() -> anyhow::Result<Pool<Sqlite>> {
    let db_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("missing DATABASE_URL"))?;

    tracing::info!("initializing database connection...");
    let opts = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
    let db = SqlitePoolOptions::new()
        .max_connections(20)
        .connect_with(opts)
        .await?;

    Ok(db)
}

async fn init_quotes(db: Pool<Sqlite>, config: &SyncConfig) -> anyhow::Result<Arc<QuoteService>> {
    let repository = SqliteQuoteRepository::new(db);
    repository.migrate().await?;

    tracing::info!(url = %config.remote_url, "initializing quote sync client...");
    let remote = PostsClient::new(&config.remote_url, config.batch_size)?;

    let engine = SyncEngine::start(remote, repository).await;

    Ok(Arc::new(engine))
}

async fn init_discord_client(token: &str, data: Data) -> anyhow::Result<Client> {
    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::MESSAGE_CONTENT;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::help::help(),
                commands::status::status(),
                commands::quote::quote(),
            ],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some("s>".into()),
                ..Default::default()
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands)
                    .await
                    .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when registering commands"))?;

                Ok(data)
            }.in_current_span())
        })
        .build();

    let client = ClientBuilder::new(token, intents)
        .framework(framework)
        .activity(serenity::ActivityData {
            name: "s>quote".into(),
            kind: serenity::ActivityType::Listening,
            state: None,
            url: None,
        })
        .await?;

    Ok(client)
}

fn spawn_background_tasks(client: &Client, data: &Data, config: &SyncConfig) {
    let events = data.quotes.subscribe();
    let http = client.http.clone();
    let notify_channel_id = data.notify_channel_id;

    tracing::info!("initialized quote notifier!");

    tokio::spawn(notifier::run(http, notify_channel_id, events).in_current_span());

    let sync_data = data.clone();
    let period = config.interval;

    tracing::info!(interval_secs = period.as_secs(), "initialized quote sync!");

    // the first tick fires immediately, which doubles as the startup pull.
    // each pull runs in its own task so a slow server never delays the timer;
    // overlapping pulls are skipped by the engine.
    tokio::spawn(
        async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let task = futures::stream::unfold(interval, |mut interval| async {
                interval.tick().await;

                let quotes = sync_data.quotes.clone();
                tokio::spawn(
                    async move {
                        if let Err(e) = quotes.pull().await {
                            tracing::debug!(err = ?e, "scheduled quote sync failed");
                        }
                    }
                    .in_current_span(),
                );

                Some(((), interval))
            });

            task.for_each(|_| async {}).await;
        }
        .in_current_span(),
    );
}

pub async fn init() -> anyhow::Result<Client> {
    telemetry::init_telemetry()
        .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {e}"))?;

    tracing::info!("initializing... please wait warmly.");

    let token = std::env::var("DISCORD_TOKEN")
        .map_err(|_| anyhow::anyhow!("missing DISCORD_TOKEN"))?;

    let config = SyncConfig::from_env();
    let db = init_database().await?;
    let quotes = init_quotes(db, &config).await?;

    let data = Data {
        notify_channel_id: config.notify_channel_id,
        quotes,
    };

    let client = init_discord_client(&token, data.clone()).await?;
    spawn_background_tasks(&client, &data, &config);

    tracing::info!("finished initializing!");
    Ok(client)
}
