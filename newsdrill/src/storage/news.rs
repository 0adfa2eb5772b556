use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::Store;

/// A curated article ready to be stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratedItem {
    /// Local day the item was collected on
    pub collection_date: NaiveDate,
    pub title: String,
    /// At most 3 lines
    pub summary: String,
    pub source_url: String,
    pub category: String,
}

/// A stored news row
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct NewsItem {
    pub id: i64,
    #[sqlx(rename = "date")]
    pub collection_date: NaiveDate,
    pub title: String,
    pub summary: String,
    #[sqlx(rename = "url")]
    pub source_url: String,
    pub category: String,
    pub is_saved: bool,
    pub user_note: String,
    pub delivered: bool,
}

/// Optional narrowing of news queries
#[derive(Debug, Clone, Default)]
pub struct NewsFilter {
    pub category: Option<String>,
    pub date: Option<NaiveDate>,
}

impl NewsFilter {
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            date: None,
        }
    }

    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

const NEWS_COLUMNS: &str = "id, date, title, summary, url, category, is_saved, user_note, delivered";

impl Store {
    /// Whether an item with this source URL was already stored
    pub async fn url_exists(&self, url: &str) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM news WHERE url = ? LIMIT 1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .context("failed to check existing news url")?;
        Ok(found.is_some())
    }

    /// Insert items, silently skipping URLs already present.
    /// Returns the number of rows actually inserted.
    pub async fn save_bulk(&self, items: &[CuratedItem]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let mut inserted = 0usize;
        for item in items {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO news (date, title, summary, url, category) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(item.collection_date)
            .bind(&item.title)
            .bind(&item.summary)
            .bind(&item.source_url)
            .bind(&item.category)
            .execute(&mut tx)
            .await
            .with_context(|| format!("failed to insert news {}", item.source_url))?;

            if result.rows_affected() > 0 {
                inserted += 1;
            } else {
                debug!("Skipping already stored url: {}", item.source_url);
            }
        }
        tx.commit().await.context("failed to commit news batch")?;

        info!("Stored {} of {} curated items", inserted, items.len());
        Ok(inserted)
    }

    /// Undelivered items, oldest collection date first, then insertion order
    pub async fn get_undelivered(&self, filter: &NewsFilter, limit: usize) -> Result<Vec<NewsItem>> {
        let sql = format!(
            "SELECT {} FROM news
             WHERE delivered = 0
               AND (? IS NULL OR category = ?)
               AND (? IS NULL OR date = ?)
             ORDER BY date ASC, id ASC
             LIMIT ?",
            NEWS_COLUMNS
        );
        sqlx::query_as::<_, NewsItem>(&sql)
            .bind(filter.category.as_deref())
            .bind(filter.category.as_deref())
            .bind(filter.date)
            .bind(filter.date)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch undelivered news")
    }

    /// Flag items as delivered. Repeating ids, or an empty list, is harmless.
    pub async fn mark_delivered(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        for id in ids {
            sqlx::query("UPDATE news SET delivered = 1 WHERE id = ?")
                .bind(id)
                .execute(&mut tx)
                .await
                .with_context(|| format!("failed to mark news {} delivered", id))?;
        }
        tx.commit().await.context("failed to commit delivery marks")?;
        Ok(())
    }

    /// Newest first, for browsing
    pub async fn get_news(&self, filter: &NewsFilter, limit: usize) -> Result<Vec<NewsItem>> {
        let sql = format!(
            "SELECT {} FROM news
             WHERE (? IS NULL OR category = ?)
               AND (? IS NULL OR date = ?)
             ORDER BY date DESC, id DESC
             LIMIT ?",
            NEWS_COLUMNS
        );
        sqlx::query_as::<_, NewsItem>(&sql)
            .bind(filter.category.as_deref())
            .bind(filter.category.as_deref())
            .bind(filter.date)
            .bind(filter.date)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch news")
    }

    pub async fn get_saved_news(&self) -> Result<Vec<NewsItem>> {
        let sql = format!(
            "SELECT {} FROM news WHERE is_saved = 1 ORDER BY date DESC, id DESC",
            NEWS_COLUMNS
        );
        sqlx::query_as::<_, NewsItem>(&sql)
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch saved news")
    }

    pub async fn set_saved(&self, id: i64, saved: bool) -> Result<()> {
        sqlx::query("UPDATE news SET is_saved = ? WHERE id = ?")
            .bind(saved)
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update saved flag of news {}", id))?;
        Ok(())
    }

    pub async fn update_note(&self, id: i64, note: &str) -> Result<()> {
        sqlx::query("UPDATE news SET user_note = ? WHERE id = ?")
            .bind(note)
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update note of news {}", id))?;
        Ok(())
    }

    /// Distinct collection dates, newest first
    pub async fn news_dates(&self) -> Result<Vec<NaiveDate>> {
        sqlx::query_scalar::<_, NaiveDate>("SELECT DISTINCT date FROM news ORDER BY date DESC")
            .fetch_all(&self.pool)
            .await
            .context("failed to list news dates")
    }
}
