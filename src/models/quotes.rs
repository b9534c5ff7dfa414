use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct Quote {
    pub id: i64,
    pub text: String,
    pub category: String,
}

/// an entry of an imported quotes file. files exported by older versions
/// may not carry ids, so one gets assigned on import.
#[derive(Clone, Debug, Deserialize)]
pub struct ImportedQuote {
    pub id: Option<i64>,
    pub text: String,
    pub category: String,
}

/// outcome of a server-wins merge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// local quotes whose content was replaced by a different remote version.
    pub conflicts: Vec<Quote>,
    /// remote records that shared an id with at least one local quote.
    pub matched: usize,
    pub appended: usize,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        !self.conflicts.is_empty() || self.appended > 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddedQuote {
    pub quote: Quote,
    /// whether the quote also reached the remote source.
    pub pushed: bool,
}

#[derive(Clone, Debug)]
pub enum QuoteEvent {
    QuotesChanged { count: usize },
    ConflictResolved { quote: Quote },
    SyncFailed { reason: String },
    PersistFailed { reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
}
