//! SQLite-backed persistence for curated news, vocabulary and settings.
//!
//! All statements go through one shared pool. The news `url` column is the dedup key,
//! enforced by a UNIQUE constraint and `INSERT OR IGNORE`.

use sqlx::SqlitePool;

mod news;
mod settings;
mod vocab;

pub use news::{CuratedItem, NewsFilter, NewsItem};
pub use settings::{DRILL_INTERVAL_KEY, LAST_NEWS_UPDATE_KEY, NEWS_TIMES_KEY};
pub use vocab::{VocabItem, WordStatus};

/// Handle over the application database; cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[cfg(test)]
pub(crate) async fn memory_store() -> Store {
    Store::new(common::init_memory_pool().await.expect("memory pool"))
}
