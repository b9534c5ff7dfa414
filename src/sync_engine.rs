//! Owns the quote store and keeps it reconciled with the remote source.
//!
//! Every mutation follows the same order: take the persist lock, change the
//! store under its write lock, release the write lock, persist the new
//! snapshot, then broadcast a [`QuoteEvent`]. Subscribers never observe a
//! half-applied merge or import, and snapshots reach the repository in the
//! order they were taken.
//!
//! Pulls are exclusive. A pull that starts while another one is in flight
//! returns `Ok(None)` without touching the remote.

use std::sync::atomic::{AtomicBool, Ordering};

use time::OffsetDateTime;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::{
    constants::quotes::ALL_CATEGORIES,
    errors::QuoteError,
    models::quotes::{AddedQuote, ImportedQuote, MergeReport, Quote, QuoteEvent, SyncState},
    remote::RemoteSource,
    repository::QuoteRepository,
    store::{pick_random, QuoteStore},
};

const EVENT_CAPACITY: usize = 64;

pub struct SyncEngine<R, P> {
    store: RwLock<QuoteStore>,
    last_filter: RwLock<String>,
    last_synced_at: RwLock<Option<OffsetDateTime>>,
    syncing: AtomicBool,
    /// Held from taking a snapshot until it is saved.
    persist_lock: Mutex<()>,
    remote: R,
    repository: P,
    events: broadcast::Sender<QuoteEvent>,
}

/// Holds the Syncing state; dropping it returns the engine to Idle.
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<R: RemoteSource, P: QuoteRepository> SyncEngine<R, P> {
    /// Loads the persisted quotes, falling back to the default seed when
    /// nothing was saved yet or the saved list can't be read.
    pub async fn start(remote: R, repository: P) -> Self {
        let store = match repository.load().await {
            Ok(Some(quotes)) => {
                tracing::info!(count = quotes.len(), "loaded saved quotes");
                QuoteStore::new(quotes)
            }
            Ok(None) => {
                tracing::info!("no saved quotes found, seeding defaults");
                QuoteStore::seeded()
            }
            Err(e) => {
                tracing::warn!(err = ?e, "couldn't load saved quotes, seeding defaults");
                QuoteStore::seeded()
            }
        };

        let last_filter = repository
            .load_last_filter()
            .await
            .inspect_err(|e| tracing::warn!(err = ?e, "couldn't load last selected filter"))
            .ok()
            .flatten()
            .unwrap_or_else(|| ALL_CATEGORIES.to_string());

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        SyncEngine {
            store: RwLock::new(store),
            last_filter: RwLock::new(last_filter),
            last_synced_at: RwLock::new(None),
            syncing: AtomicBool::new(false),
            persist_lock: Mutex::new(()),
            remote,
            repository,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QuoteEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SyncState {
        if self.syncing.load(Ordering::Acquire) {
            SyncState::Syncing
        } else {
            SyncState::Idle
        }
    }

    pub async fn last_synced_at(&self) -> Option<OffsetDateTime> {
        *self.last_synced_at.read().await
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn quotes(&self) -> Vec<Quote> {
        self.store.read().await.quotes().to_vec()
    }

    pub async fn filter(&self, category: &str) -> Vec<Quote> {
        self.store
            .read()
            .await
            .filter(category)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn categories(&self) -> Vec<String> {
        self.store
            .read()
            .await
            .categories()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub async fn last_filter(&self) -> String {
        self.last_filter.read().await.clone()
    }

    /// Picks a random quote from `category`, or from the last selected
    /// filter when no category is given.
    pub async fn random_quote(&self, category: Option<&str>) -> Result<Quote, QuoteError> {
        let category = match category {
            Some(category) => category.to_string(),
            None => self.last_filter().await,
        };

        let store = self.store.read().await;
        let candidates = store.filter(&category);
        let quote = pick_random(&candidates)?.clone();

        Ok(quote)
    }

    /// Remembers `category` as the selected filter and picks a quote from it.
    #[tracing::instrument(skip(self))]
    pub async fn select_filter(&self, category: &str) -> Result<Option<Quote>, QuoteError> {
        let category = category.trim();
        let category = if category.is_empty() {
            ALL_CATEGORIES
        } else {
            category
        };

        self.repository
            .save_last_filter(category)
            .await
            .inspect_err(
                |e| tracing::error!(err = ?e, "an error occurred when saving last selected filter"),
            )?;

        *self.last_filter.write().await = category.to_string();

        match self.random_quote(Some(category)).await {
            Ok(quote) => Ok(Some(quote)),
            Err(QuoteError::EmptyInput) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Adds a quote locally, persists it and pushes it to the remote.
    /// A failed push is reported but the local quote stays.
    #[tracing::instrument(skip(self))]
    pub async fn add_quote(&self, text: &str, category: &str) -> Result<AddedQuote, QuoteError> {
        let persisting = self.persist_lock.lock().await;

        let (quote, snapshot) = {
            let mut store = self.store.write().await;
            let quote = store.add(text, category)?;

            (quote, store.quotes().to_vec())
        };

        tracing::info!(id = quote.id, category = %quote.category, "added quote");

        self.persist(&snapshot).await;
        drop(persisting);

        self.notify(QuoteEvent::QuotesChanged {
            count: snapshot.len(),
        });

        let pushed = self.push(&quote).await.is_ok();

        Ok(AddedQuote { quote, pushed })
    }

    /// Best-effort send of a local quote to the remote source.
    pub async fn push(&self, quote: &Quote) -> Result<(), QuoteError> {
        self.remote.push(quote).await.map_err(|e| {
            tracing::warn!(err = ?e, id = quote.id, "an error occurred when pushing quote");
            self.notify(QuoteEvent::SyncFailed {
                reason: e.to_string(),
            });

            QuoteError::Sync(e)
        })
    }

    /// Fetches the remote snapshot and merges it, server wins.
    ///
    /// Returns `Ok(None)` when another pull is already running. On a
    /// transport failure the store is left exactly as it was.
    #[tracing::instrument(skip(self))]
    pub async fn pull(&self) -> Result<Option<MergeReport>, QuoteError> {
        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            tracing::debug!("a sync is already in flight, skipping");
            return Ok(None);
        };

        let remote = match self.remote.fetch().await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(err = ?e, "an error occurred when pulling quotes from server");
                self.notify(QuoteEvent::SyncFailed {
                    reason: e.to_string(),
                });

                return Err(QuoteError::Sync(e));
            }
        };

        let persisting = self.persist_lock.lock().await;

        let (report, snapshot) = {
            let mut store = self.store.write().await;
            let report = store.merge(&remote);

            (report, store.quotes().to_vec())
        };

        *self.last_synced_at.write().await = Some(OffsetDateTime::now_utc());

        tracing::info!(
            fetched = remote.len(),
            matched = report.matched,
            conflicts = report.conflicts.len(),
            appended = report.appended,
            "finished syncing with server"
        );

        if report.changed() {
            self.persist(&snapshot).await;
        }
        drop(persisting);

        for quote in &report.conflicts {
            self.notify(QuoteEvent::ConflictResolved {
                quote: quote.clone(),
            });
        }

        if report.changed() {
            self.notify(QuoteEvent::QuotesChanged {
                count: snapshot.len(),
            });
        }

        Ok(Some(report))
    }

    /// Appends every quote of a JSON array. Nothing is applied unless the
    /// whole payload parses.
    #[tracing::instrument(skip_all, fields(len = payload.len()))]
    pub async fn import_json(&self, payload: &str) -> Result<usize, QuoteError> {
        let value: serde_json::Value = serde_json::from_str(payload)
            .inspect_err(|e| tracing::warn!(err = ?e, "import payload is not valid JSON"))?;

        let serde_json::Value::Array(entries) = value else {
            tracing::warn!("import payload is not a JSON array");
            return Err(QuoteError::Format(
                "expected a JSON array of quotes".to_string(),
            ));
        };

        let imported = entries
            .into_iter()
            .map(serde_json::from_value::<ImportedQuote>)
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|e| tracing::warn!(err = ?e, "import payload has an invalid entry"))?;

        let _persisting = self.persist_lock.lock().await;

        let (count, snapshot) = {
            let mut store = self.store.write().await;
            let count = store.import_many(imported)?;

            (count, store.quotes().to_vec())
        };

        tracing::info!(count, "imported quotes");

        self.persist(&snapshot).await;
        self.notify(QuoteEvent::QuotesChanged {
            count: snapshot.len(),
        });

        Ok(count)
    }

    /// Import for raw file contents.
    pub async fn import_bytes(&self, bytes: &[u8]) -> Result<usize, QuoteError> {
        let payload = std::str::from_utf8(bytes)
            .map_err(|e| QuoteError::Format(format!("file is not valid UTF-8: {e}")))?;

        self.import_json(payload).await
    }

    pub async fn export_json(&self) -> Result<String, QuoteError> {
        let quotes = self.quotes().await;

        Ok(serde_json::to_string_pretty(&quotes)?)
    }

    async fn persist(&self, snapshot: &[Quote]) {
        if let Err(e) = self.repository.save(snapshot).await {
            tracing::error!(err = ?e, "an error occurred when saving quotes");
            self.notify(QuoteEvent::PersistFailed {
                reason: e.to_string(),
            });
        }
    }

    fn notify(&self, event: QuoteEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{atomic::Ordering, Arc};

    use super::*;
    use crate::{remote::testing::FakeRemote, repository::testing::MemoryQuoteRepository};

    type TestEngine = SyncEngine<FakeRemote, MemoryQuoteRepository>;

    fn quote(id: i64, text: &str, category: &str) -> Quote {
        Quote {
            id,
            text: text.to_string(),
            category: category.to_string(),
        }
    }

    async fn engine(remote: FakeRemote, saved: Option<Vec<Quote>>) -> TestEngine {
        let repository = match saved {
            Some(quotes) => MemoryQuoteRepository::with_quotes(quotes),
            None => MemoryQuoteRepository::default(),
        };

        SyncEngine::start(remote, repository).await
    }

    fn drain(rx: &mut broadcast::Receiver<QuoteEvent>) -> Vec<QuoteEvent> {
        let mut events = vec![];

        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        events
    }

    #[tokio::test]
    async fn test_start_seeds_defaults_when_nothing_saved() {
        let engine = engine(FakeRemote::default(), None).await;

        assert_eq!(engine.quotes().await, QuoteStore::seeded().quotes());
        assert_eq!(engine.last_filter().await, ALL_CATEGORIES);
        assert_eq!(engine.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_start_loads_saved_quotes_and_filter() {
        let saved = vec![quote(7, "saved", "Kept")];
        let repository = MemoryQuoteRepository::with_quotes(saved.clone());
        *repository.last_filter.lock().unwrap() = Some("Kept".to_string());

        let engine = SyncEngine::start(FakeRemote::default(), repository).await;

        assert_eq!(engine.quotes().await, saved);
        assert_eq!(engine.last_filter().await, "Kept");
    }

    #[tokio::test]
    async fn test_add_persists_pushes_and_notifies() {
        let engine = engine(FakeRemote::default(), Some(vec![])).await;
        let mut rx = engine.subscribe();

        let added = engine.add_quote("Simplicity is prerequisite", "Design").await.unwrap();

        assert!(added.pushed);
        assert_eq!(engine.quotes().await, vec![added.quote.clone()]);
        assert_eq!(engine.repository.saved(), Some(vec![added.quote.clone()]));
        assert_eq!(*engine.remote.pushed.lock().unwrap(), vec![added.quote]);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [QuoteEvent::QuotesChanged { count: 1 }]
        ));
    }

    #[tokio::test]
    async fn test_add_validation_leaves_everything_untouched() {
        let engine = engine(FakeRemote::default(), Some(vec![])).await;

        let result = engine.add_quote(" ", "Design").await;

        assert!(matches!(result, Err(QuoteError::Validation)));
        assert!(engine.quotes().await.is_empty());
        assert_eq!(engine.repository.saved(), Some(vec![]));
        assert!(engine.remote.pushed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_push_keeps_local_quote() {
        let remote = FakeRemote::default();
        remote.fail.store(true, Ordering::SeqCst);
        let engine = engine(remote, Some(vec![])).await;
        let mut rx = engine.subscribe();

        let added = engine.add_quote("offline thought", "Notes").await.unwrap();

        assert!(!added.pushed);
        assert_eq!(engine.quotes().await, vec![added.quote]);
        assert!(drain(&mut rx)
            .iter()
            .any(|event| matches!(event, QuoteEvent::SyncFailed { .. })));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_in_memory_change() {
        let repository = MemoryQuoteRepository::with_quotes(vec![]);
        repository.fail_saves.store(true, Ordering::SeqCst);
        let engine = SyncEngine::start(FakeRemote::default(), repository).await;
        let mut rx = engine.subscribe();

        engine.add_quote("kept anyway", "Notes").await.unwrap();

        assert_eq!(engine.len().await, 1);
        assert!(drain(&mut rx)
            .iter()
            .any(|event| matches!(event, QuoteEvent::PersistFailed { .. })));
    }

    #[tokio::test]
    async fn test_pull_merges_server_wins() {
        let remote = FakeRemote::with_snapshot(vec![quote(1, "B", "Y"), quote(2, "C", "Z")]);
        let engine = engine(remote, Some(vec![quote(1, "A", "X")])).await;
        let mut rx = engine.subscribe();

        let report = engine.pull().await.unwrap().unwrap();

        let expected = vec![quote(1, "B", "Y"), quote(2, "C", "Z")];
        assert_eq!(report.appended, 1);
        assert_eq!(engine.quotes().await, expected);
        assert_eq!(engine.repository.saved(), Some(expected));
        assert!(engine.last_synced_at().await.is_some());
        assert_eq!(engine.state(), SyncState::Idle);

        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [
                QuoteEvent::ConflictResolved { quote },
                QuoteEvent::QuotesChanged { count: 2 },
            ] if quote.text == "B"
        ));
    }

    #[tokio::test]
    async fn test_repeated_pull_changes_nothing() {
        let remote = FakeRemote::with_snapshot(vec![quote(1, "B", "Y"), quote(2, "C", "Z")]);
        let engine = engine(remote, Some(vec![quote(1, "A", "X")])).await;

        engine.pull().await.unwrap();
        let once = engine.quotes().await;
        let mut rx = engine.subscribe();
        let report = engine.pull().await.unwrap().unwrap();

        assert_eq!(engine.quotes().await, once);
        assert!(!report.changed());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_failed_pull_leaves_store_unchanged() {
        let remote = FakeRemote::with_snapshot(vec![quote(1, "B", "Y")]);
        remote.fail.store(true, Ordering::SeqCst);
        let engine = engine(remote, Some(vec![quote(1, "A", "X")])).await;
        let mut rx = engine.subscribe();

        let result = engine.pull().await;

        assert!(matches!(result, Err(QuoteError::Sync(_))));
        assert_eq!(engine.quotes().await, vec![quote(1, "A", "X")]);
        assert_eq!(engine.last_synced_at().await, None);
        assert_eq!(engine.state(), SyncState::Idle);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [QuoteEvent::SyncFailed { .. }]
        ));
    }

    #[tokio::test]
    async fn test_overlapping_pull_is_skipped() {
        let remote = FakeRemote::with_snapshot(vec![quote(2, "C", "Z")]);
        remote.hold.store(true, Ordering::SeqCst);
        let engine = Arc::new(engine(remote, Some(vec![])).await);

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.pull().await }
        });

        engine.remote.entered.notified().await;
        assert_eq!(engine.state(), SyncState::Syncing);

        let second = engine.pull().await.unwrap();
        assert!(second.is_none());
        assert_eq!(engine.remote.fetches.load(Ordering::SeqCst), 1);

        engine.remote.release.notify_one();
        let first = first.await.unwrap().unwrap().unwrap();

        assert_eq!(first.appended, 1);
        assert_eq!(engine.quotes().await, vec![quote(2, "C", "Z")]);
        assert_eq!(engine.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_saves_land_in_mutation_order() {
        let remote = FakeRemote::with_snapshot(vec![quote(1, "srv", "ServerData")]);
        let engine = Arc::new(engine(remote, Some(vec![])).await);
        engine.repository.hold_next_save.store(true, Ordering::SeqCst);

        let add = tokio::spawn({
            let engine = engine.clone();
            async move { engine.add_quote("mine", "Notes").await }
        });
        engine.repository.save_entered.notified().await;

        let pull = tokio::spawn({
            let engine = engine.clone();
            async move { engine.pull().await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        engine.repository.save_released.notify_one();
        add.await.unwrap().unwrap();
        pull.await.unwrap().unwrap();

        let quotes = engine.quotes().await;
        assert_eq!(quotes.len(), 2);
        assert_eq!(engine.repository.saved(), Some(quotes));
    }

    #[tokio::test]
    async fn test_random_quote_uses_last_filter() {
        let engine = engine(FakeRemote::default(), None).await;

        let picked = engine.select_filter("programming").await.unwrap().unwrap();
        assert_eq!(picked.category, "Programming");
        assert_eq!(
            engine.repository.last_filter.lock().unwrap().as_deref(),
            Some("programming")
        );

        let again = engine.random_quote(None).await.unwrap();
        assert_eq!(again.category, "Programming");
    }

    #[tokio::test]
    async fn test_unknown_filter_has_no_quote() {
        let engine = engine(FakeRemote::default(), None).await;

        assert_eq!(engine.select_filter("Cooking").await.unwrap(), None);
        assert!(matches!(
            engine.random_quote(None).await,
            Err(QuoteError::EmptyInput)
        ));
    }

    #[tokio::test]
    async fn test_failed_filter_save_keeps_previous_filter() {
        let engine = engine(FakeRemote::default(), None).await;
        engine
            .repository
            .fail_filter_saves
            .store(true, Ordering::SeqCst);

        let result = engine.select_filter("Programming").await;

        assert!(matches!(result, Err(QuoteError::Storage(_))));
        assert_eq!(engine.last_filter().await, ALL_CATEGORIES);
        assert_eq!(*engine.repository.last_filter.lock().unwrap(), None);
    }

    #[tokio::test]
    async fn test_import_appends_entries() {
        let engine = engine(FakeRemote::default(), Some(vec![quote(1, "A", "X")])).await;

        let count = engine
            .import_json(
                r#"[
                    {"id": 1, "text": "A", "category": "X"},
                    {"text": "no id yet", "category": "Imported"}
                ]"#,
            )
            .await
            .unwrap();

        let quotes = engine.quotes().await;
        assert_eq!(count, 2);
        assert_eq!(quotes.len(), 3);
        assert_eq!(quotes[1], quote(1, "A", "X"));
        assert_eq!(quotes[2].text, "no id yet");
        assert_eq!(engine.repository.saved(), Some(quotes));
    }

    #[tokio::test]
    async fn test_import_rejects_non_array() {
        let engine = engine(FakeRemote::default(), Some(vec![quote(1, "A", "X")])).await;
        let mut rx = engine.subscribe();

        let result = engine
            .import_json(r#"{"id": 2, "text": "B", "category": "Y"}"#)
            .await;

        assert!(matches!(result, Err(QuoteError::Format(_))));
        assert_eq!(engine.quotes().await, vec![quote(1, "A", "X")]);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_import_with_bad_entry_applies_nothing() {
        let engine = engine(FakeRemote::default(), Some(vec![])).await;

        let result = engine
            .import_json(r#"[{"text": "fine", "category": "Ok"}, {"text": 3}]"#)
            .await;

        assert!(matches!(result, Err(QuoteError::Format(_))));
        assert!(engine.quotes().await.is_empty());
    }

    #[tokio::test]
    async fn test_import_rejects_garbage_bytes() {
        let engine = engine(FakeRemote::default(), Some(vec![])).await;

        assert!(matches!(
            engine.import_bytes(&[0xff, 0xfe, 0x00]).await,
            Err(QuoteError::Format(_))
        ));
        assert!(matches!(
            engine.import_bytes(b"not json").await,
            Err(QuoteError::Format(_))
        ));
    }

    #[tokio::test]
    async fn test_export_is_a_json_array_of_the_store() {
        let engine = engine(FakeRemote::default(), None).await;

        let exported = engine.export_json().await.unwrap();
        let parsed: Vec<Quote> = serde_json::from_str(&exported).unwrap();

        assert!(exported.starts_with('['));
        assert_eq!(parsed, engine.quotes().await);
    }
}
