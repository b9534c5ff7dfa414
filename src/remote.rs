use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};

use crate::models::{quotes::Quote, remote::RemotePost};

/// The server side of the sync: an opaque read/write quote source.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetches the current batch of remote records.
    async fn fetch(&self) -> anyhow::Result<Vec<Quote>>;

    /// Sends a locally created quote. The response carries nothing we use.
    async fn push(&self, quote: &Quote) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct PostsClient {
    pub client: reqwest::Client,
    base_url: String,
    batch_size: usize,
}

impl PostsClient {
    pub fn new(base_url: &str, batch_size: usize) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=UTF-8"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(PostsClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            batch_size,
        })
    }
}

/// Converts a `/posts` response body into quotes.
pub fn parse_posts(text: &str) -> anyhow::Result<Vec<Quote>> {
    let posts: Vec<RemotePost> = serde_json::from_str(text)?;

    Ok(posts.into_iter().map(Quote::from).collect())
}

#[async_trait]
impl RemoteSource for PostsClient {
    #[tracing::instrument(skip(self), fields(batch_size = self.batch_size))]
    async fn fetch(&self) -> anyhow::Result<Vec<Quote>> {
        let resp = self
            .client
            .get(format!("{}/posts", self.base_url))
            .query(&[("_limit", self.batch_size)])
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .inspect_err(
                |e| tracing::error!(err = ?e, "an error occurred when fetching quotes from server"),
            )?;

        let text = resp.text().await.inspect_err(
            |e| tracing::error!(err = ?e, "an error occurred when receiving response text"),
        )?;

        let quotes = parse_posts(&text).inspect_err(
            |e| tracing::error!(err = ?e, text = %text, "an error occurred when parsing response body"),
        )?;

        Ok(quotes)
    }

    #[tracing::instrument(skip(self), fields(id = quote.id))]
    async fn push(&self, quote: &Quote) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/posts", self.base_url))
            .json(quote)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .inspect_err(
                |e| tracing::error!(err = ?e, "an error occurred when sending quote to server"),
            )?;

        tracing::debug!("synced quote to server");

        Ok(())
    }
}
