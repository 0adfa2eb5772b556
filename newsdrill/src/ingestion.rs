use anyhow::{Context, Result};
use async_trait::async_trait;
use feed_rs::model::Feed;
use feed_rs::parser;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A feed entry reduced to what curation needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCandidate {
    pub title: String,
    pub link: String,
}

/// Source of candidate entries for one feed URL
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedCandidate>>;
}

/// RSS/Atom over HTTP, with retries on server errors and network failures
pub struct RssFeedSource {
    client: Client,
    max_retries: u32,
    backoff_base: Duration,
}

impl RssFeedSource {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("newsdrill/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            client,
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
        })
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    async fn fetch_feed(&self, url: &str) -> Result<Feed> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            if attempt > 1 {
                let backoff = self.backoff_base * 2u32.pow(attempt - 2); // 1s, 2s, ...
                tracing::info!(
                    "Retrying feed fetch for {} (attempt {}/{}) after {:?}...",
                    url,
                    attempt,
                    self.max_retries,
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let bytes = response.bytes().await.context("failed to read response body")?;
                        let feed = parser::parse(bytes.as_ref()).context("failed to parse feed")?;
                        return Ok(feed);
                    } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(anyhow::anyhow!("feed server returned {}", status));
                    } else {
                        // other 4xx are permanent
                        anyhow::bail!("feed fetch failed with status: {}", status);
                    }
                }
                Err(e) => {
                    last_error = Some(anyhow::Error::new(e).context("network error during fetch"));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error after retries")))
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedCandidate>> {
        let feed = self
            .fetch_feed(url)
            .await
            .with_context(|| format!("failed to fetch feed {}", url))?;
        Ok(candidates_from_feed(feed))
    }
}

/// Entries without a link cannot be deduplicated and are dropped.
pub fn candidates_from_feed(feed: Feed) -> Vec<FeedCandidate> {
    feed.entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry.links.first()?.href.trim().to_string();
            if link.is_empty() {
                return None;
            }
            let title = entry
                .title
                .map(|t| t.content.trim().to_string())
                .unwrap_or_default();
            Some(FeedCandidate { title, link })
        })
        .collect()
}
