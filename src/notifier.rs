use std::sync::Arc;

use poise::serenity_prelude::{ChannelId, CreateMessage, Http};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::models::quotes::QuoteEvent;

/// The user-facing text for an event, if it deserves one.
pub fn describe(event: &QuoteEvent) -> Option<String> {
    match event {
        QuoteEvent::QuotesChanged { .. } => None,
        QuoteEvent::ConflictResolved { quote } => Some(format!(
            "conflict resolved: \"{}\" updated from server.",
            quote.text
        )),
        QuoteEvent::SyncFailed { reason } => Some(format!("sync error: {reason}")),
        QuoteEvent::PersistFailed { reason } => {
            Some(format!("couldn't save quotes: {reason}"))
        }
    }
}

/// Relays quote events to the notification channel until the engine goes away.
#[tracing::instrument(skip_all)]
pub async fn run(
    http: Arc<Http>,
    channel_id: Option<ChannelId>,
    mut events: broadcast::Receiver<QuoteEvent>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "notifier fell behind, dropped quote events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(content) = describe(&event) else {
            tracing::debug!(?event, "quote store refreshed");
            continue;
        };

        tracing::info!(notification = %content, "quote notification");

        if let Some(channel_id) = channel_id {
            let _ = channel_id
                .send_message(&*http, CreateMessage::default().content(content))
                .await
                .inspect_err(
                    |e| tracing::error!(err = ?e, "an error occurred when sending notification"),
                );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quotes::Quote;

    #[test]
    fn test_describe_conflict() {
        let event = QuoteEvent::ConflictResolved {
            quote: Quote {
                id: 1,
                text: "sunt aut facere".to_string(),
                category: "ServerData".to_string(),
            },
        };

        assert_eq!(
            describe(&event).as_deref(),
            Some("conflict resolved: \"sunt aut facere\" updated from server.")
        );
    }

    #[test]
    fn test_refresh_events_are_silent() {
        assert_eq!(describe(&QuoteEvent::QuotesChanged { count: 3 }), None);
    }
}
