use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

use crate::{errors::QuoteError, models::quotes::Quote};

const QUOTES_SAVED_KEY: &str = "quotes_saved";
const LAST_FILTER_KEY: &str = "last_selected_category";

/// Where the quote list and the last selected filter are kept between runs.
#[async_trait]
pub trait QuoteRepository: Send + Sync {
    /// `None` until the list has been saved at least once.
    async fn load(&self) -> Result<Option<Vec<Quote>>, QuoteError>;
    async fn save(&self, quotes: &[Quote]) -> Result<(), QuoteError>;
    async fn load_last_filter(&self) -> Result<Option<String>, QuoteError>;
    async fn save_last_filter(&self, category: &str) -> Result<(), QuoteError>;
}

#[derive(Clone)]
pub struct SqliteQuoteRepository {
    db: Pool<Sqlite>,
}

impl SqliteQuoteRepository {
    pub fn new(db: Pool<Sqlite>) -> Self {
        SqliteQuoteRepository { db }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        tracing::info!("running migrations...");
        sqlx::migrate!("./migrations").run(&self.db).await?;
        tracing::info!("finished running migrations!");

        Ok(())
    }

    async fn get_preference(&self, key: &str) -> Result<Option<String>, QuoteError> {
        let value = sqlx::query_scalar::<_, String>(
            r#"
                SELECT
                    value
                FROM preferences
                WHERE key = $1;
            "#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await
        .inspect_err(
            |e| tracing::error!(err = ?e, key = %key, "an error occurred when fetching preference"),
        )?;

        Ok(value)
    }

    async fn set_preference<'e, E>(executor: E, key: &str, value: &str) -> Result<(), QuoteError>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
                INSERT INTO
                    preferences (key, value)
                VALUES
                    ($1, $2)
                ON CONFLICT (key)
                DO UPDATE SET
                    value = excluded.value;
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(executor)
        .await
        .inspect_err(
            |e| tracing::error!(err = ?e, key = %key, "an error occurred when saving preference"),
        )?;

        Ok(())
    }
}

#[async_trait]
impl QuoteRepository for SqliteQuoteRepository {
    async fn load(&self) -> Result<Option<Vec<Quote>>, QuoteError> {
        if self.get_preference(QUOTES_SAVED_KEY).await?.is_none() {
            return Ok(None);
        }

        let quotes = sqlx::query_as::<_, Quote>(
            r#"
                SELECT
                    id,
                    text,
                    category
                FROM quotes
                ORDER BY position;
            "#,
        )
        .fetch_all(&self.db)
        .await
        .inspect_err(
            |e| tracing::error!(err = ?e, "an error occurred when fetching quotes from database"),
        )?;

        Ok(Some(quotes))
    }

    #[tracing::instrument(skip_all, fields(count = quotes.len()))]
    async fn save(&self, quotes: &[Quote]) -> Result<(), QuoteError> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM quotes;")
            .execute(&mut *tx)
            .await
            .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when clearing quotes"))?;

        for (position, quote) in quotes.iter().enumerate() {
            sqlx::query(
                r#"
                    INSERT INTO
                        quotes (position, id, text, category)
                    VALUES
                        ($1, $2, $3, $4);
                "#,
            )
            .bind(position as i64)
            .bind(quote.id)
            .bind(&quote.text)
            .bind(&quote.category)
            .execute(&mut *tx)
            .await
            .inspect_err(
                |e| tracing::error!(err = ?e, id = quote.id, "an error occurred when inserting quote"),
            )?;
        }

        Self::set_preference(&mut *tx, QUOTES_SAVED_KEY, "1").await?;

        tx.commit().await?;

        Ok(())
    }

    async fn load_last_filter(&self) -> Result<Option<String>, QuoteError> {
        self.get_preference(LAST_FILTER_KEY).await
    }

    async fn save_last_filter(&self, category: &str) -> Result<(), QuoteError> {
        Self::set_preference(&self.db, LAST_FILTER_KEY, category).await
    }
}
