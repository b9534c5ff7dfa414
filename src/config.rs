use std::time::Duration;

use poise::serenity_prelude::ChannelId;

use crate::constants::quotes::{
    DEFAULT_REMOTE_BATCH_SIZE, DEFAULT_REMOTE_URL, DEFAULT_SYNC_INTERVAL,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub remote_url: String,
    pub batch_size: usize,
    pub interval: Duration,
    pub notify_channel_id: Option<ChannelId>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            remote_url: DEFAULT_REMOTE_URL.to_string(),
            batch_size: DEFAULT_REMOTE_BATCH_SIZE,
            interval: DEFAULT_SYNC_INTERVAL,
            notify_channel_id: None,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `lookup`. Unparseable values fall back to
    /// their defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = SyncConfig::default();

        let remote_url = lookup("QUOTES_REMOTE_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(defaults.remote_url);

        let batch_size = match lookup("QUOTES_REMOTE_BATCH_SIZE").map(|v| v.parse::<usize>()) {
            Some(Ok(size)) if size > 0 => size,
            Some(_) => {
                tracing::warn!("invalid QUOTES_REMOTE_BATCH_SIZE, defaulting to {}.", defaults.batch_size);
                defaults.batch_size
            }
            None => defaults.batch_size,
        };

        let interval = match lookup("QUOTES_SYNC_INTERVAL_SECS").map(|v| v.parse::<u64>()) {
            Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs),
            Some(_) => {
                tracing::warn!(
                    "invalid QUOTES_SYNC_INTERVAL_SECS, defaulting to {} seconds.",
                    defaults.interval.as_secs()
                );
                defaults.interval
            }
            None => defaults.interval,
        };

        let notify_channel_id = lookup("QUOTES_NOTIFY_CHANNEL_ID")
            .and_then(|id| id.parse::<u64>().ok())
            .filter(|id| *id != 0)
            .map(|id| {
                tracing::info!("sending quote notifications to channel with id {}.", id);
                ChannelId::new(id)
            });

        if notify_channel_id.is_none() {
            tracing::warn!("no quote notification channel id found. notifications will only be logged.");
        }

        SyncConfig {
            remote_url,
            batch_size,
            interval,
            notify_channel_id,
        }
    }
}
