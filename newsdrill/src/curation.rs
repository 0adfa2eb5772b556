use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::ingestion::{FeedCandidate, FeedSource};
use crate::llm::{CuratedArticle, ProviderChain};
use crate::notify::cards::{cap_lines, SUMMARY_MAX_LINES};
use crate::storage::{CuratedItem, Store, LAST_NEWS_UPDATE_KEY};

/// Default number of new entries handed to a provider per category
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Turns raw feed entries into stored, summarized news items.
pub struct CurationService {
    store: Store,
    providers: ProviderChain,
    batch_size: usize,
    offset: FixedOffset,
}

impl CurationService {
    pub fn new(store: Store, providers: ProviderChain, offset: FixedOffset) -> Self {
        Self {
            store,
            providers,
            batch_size: DEFAULT_BATCH_SIZE,
            offset,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    /// Curate the entries of one category.
    ///
    /// Already stored URLs are dropped before any provider is called, so a run over an
    /// unchanged feed costs nothing. Returns an empty list when nothing is new or no
    /// provider produced usable output; the items are not stored.
    pub async fn curate(&self, category: &str, candidates: Vec<FeedCandidate>) -> Vec<CuratedItem> {
        let fresh = self.unseen(candidates).await;
        info!("[{}] New candidates: {}", category, fresh.len());
        if fresh.is_empty() {
            return Vec::new();
        }

        let task = format!("curation of {}", category);
        let articles = self
            .providers
            .first_accepted(
                &task,
                |provider| {
                    let batch = &fresh;
                    async move { provider.curate(batch, category).await }
                },
                |articles: &Vec<CuratedArticle>| !articles.is_empty(),
            )
            .await
            .unwrap_or_default();

        let today = self.now().date_naive();
        let items: Vec<CuratedItem> = articles
            .into_iter()
            .filter_map(|article| normalize(article, category, today))
            .collect();
        info!("[{}] AI curated: {}", category, items.len());
        items
    }

    /// Up to `batch_size` candidates whose URL is not stored yet, first occurrence wins
    async fn unseen(&self, candidates: Vec<FeedCandidate>) -> Vec<FeedCandidate> {
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        for candidate in candidates {
            if fresh.len() >= self.batch_size {
                break;
            }
            if !seen.insert(candidate.link.clone()) {
                continue;
            }
            match self.store.url_exists(&candidate.link).await {
                Ok(true) => continue,
                Ok(false) => fresh.push(candidate),
                Err(e) => {
                    // the insert still ignores duplicates
                    warn!("dedup lookup failed for {}: {:#}", candidate.link, e);
                    fresh.push(candidate);
                }
            }
        }
        fresh
    }

    /// Fetch, curate and store every configured feed. A failing category is logged and
    /// skipped. Returns the number of newly stored items.
    pub async fn run_cycle(
        &self,
        source: &dyn FeedSource,
        feeds: &[common::FeedConfig],
        category_pause: Duration,
    ) -> Result<usize> {
        if self.providers.is_empty() {
            warn!("No AI provider configured, skipping curation run");
            return Ok(0);
        }

        let mut total = 0usize;
        for (idx, feed) in feeds.iter().enumerate() {
            if idx > 0 && !category_pause.is_zero() {
                tokio::time::sleep(category_pause).await;
            }
            info!("Fetching [{}] news...", feed.category);
            match self.run_category(source, feed).await {
                Ok(saved) => {
                    info!("[{}] Saved: {}", feed.category, saved);
                    total += saved;
                }
                Err(e) => error!("Error processing {}: {:#}", feed.category, e),
            }
        }

        let stamp = self.now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.store.set_setting(LAST_NEWS_UPDATE_KEY, &stamp).await?;
        info!("Total news fetched: {}", total);
        Ok(total)
    }

    async fn run_category(&self, source: &dyn FeedSource, feed: &common::FeedConfig) -> Result<usize> {
        let candidates = source.fetch(&feed.url).await?;
        info!("[{}] RSS entries: {}", feed.category, candidates.len());
        let items = self.curate(&feed.category, candidates).await;
        self.store.save_bulk(&items).await
    }
}

/// Apply the output contract: non-empty title and link, category forced to the
/// requested one, summary capped to a few lines.
fn normalize(article: CuratedArticle, category: &str, today: chrono::NaiveDate) -> Option<CuratedItem> {
    let title = article.title.trim().to_string();
    let link = article.link.trim().to_string();
    if title.is_empty() || link.is_empty() {
        warn!("dropping curated article without title or link: {:?}", article);
        return None;
    }
    if !article.category.is_empty() && article.category != category {
        warn!(
            "provider labelled '{}' as {}, keeping {}",
            title, article.category, category
        );
    }
    Some(CuratedItem {
        collection_date: today,
        title,
        summary: cap_lines(&article.summary, SUMMARY_MAX_LINES),
        source_url: link,
        category: category.to_string(),
    })
}
