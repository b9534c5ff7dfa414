use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuoteError {
    /// `add` was called with an empty text or category.
    #[error("please enter both quote and category!")]
    Validation,

    #[error("there are no quotes to pick from")]
    EmptyInput,

    /// the largest quote id is already `i64::MAX`.
    #[error("no free quote id is left!")]
    IdsExhausted,

    /// an import payload that isn't a JSON array of quotes.
    #[error("invalid quotes file: {0}")]
    Format(String),

    #[error("sync error: {0}")]
    Sync(#[source] anyhow::Error),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<serde_json::Error> for QuoteError {
    fn from(e: serde_json::Error) -> Self {
        QuoteError::Format(e.to_string())
    }
}
