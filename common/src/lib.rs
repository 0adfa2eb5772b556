/*!
common/src/lib.rs

Shared configuration types and DB helper functions for newsdrill.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader that merges a default and an override config file
- Helpers to initialize and migrate an SQLite database
*/

use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// News triggers used when neither the config file nor the settings table provide any.
pub const DEFAULT_NEWS_TIMES: [&str; 3] = ["06:00", "12:00", "18:00"];

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/newsdrill.db")
    pub path: String,
}

/// Delivery scheduler configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Wall-clock times in "HH:MM" 24h format when the news batch is delivered
    #[serde(default)]
    pub times: Vec<String>,
    /// Hours between two vocabulary drills
    pub drill_interval_hours: Option<u64>,
    pub poll_interval_seconds: Option<u64>,
    pub error_cooldown_seconds: Option<u64>,
    /// How long after its time a news trigger may still fire (missed ticks, late start)
    pub catch_up_minutes: Option<i64>,
    /// Offset of the local delivery timezone from UTC (KST = 9)
    pub utc_offset_hours: Option<i32>,
    /// Items (or words) per delivered message
    pub batch_size: Option<usize>,
    /// Only deliver news collected on the current local day
    pub today_only: Option<bool>,
}

impl SchedulerConfig {
    pub fn times_or_default(&self) -> Vec<String> {
        if self.times.is_empty() {
            DEFAULT_NEWS_TIMES.iter().map(|t| t.to_string()).collect()
        } else {
            self.times.clone()
        }
    }

    /// Local timezone used for HH:MM triggers and collection dates.
    /// Out-of-range offsets fall back to UTC.
    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset_hours
            .unwrap_or(9)
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

/// One RSS endpoint and the category its entries are curated under
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub category: String,
    pub url: String,
}

/// Curation (fetch + summarize) configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurationConfig {
    /// Maximum number of new entries sent to a provider per category per run
    pub batch_size: Option<usize>,
    /// Pause between two categories, to stay under provider rate limits
    pub category_pause_seconds: Option<u64>,
    /// Minutes between two curation runs
    pub fetch_interval_minutes: Option<u64>,
    pub fetch_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl CurationConfig {
    pub fn feeds_or_default(&self) -> Vec<FeedConfig> {
        if !self.feeds.is_empty() {
            return self.feeds.clone();
        }
        [
            ("Economy", "https://feeds.bbci.co.uk/news/business/rss.xml"),
            ("Society", "https://feeds.bbci.co.uk/news/uk/rss.xml"),
            ("World", "https://feeds.bbci.co.uk/news/world/rss.xml"),
        ]
        .iter()
        .map(|(category, url)| FeedConfig {
            category: category.to_string(),
            url: url.to_string(),
        })
        .collect()
    }
}

/// One AI backend. The credential is read from the env var named by `api_key_env`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
}

/// AI backends, tried in the fixed order xai -> groq -> gemini
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub xai: Option<ProviderConfig>,
    pub groq: Option<ProviderConfig>,
    pub gemini: Option<ProviderConfig>,
}

/// Telegram bot used as the notification channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub api_base: Option<String>,
    pub token_env: Option<String>,
    pub chat_id_env: Option<String>,
    /// Literal chat id, used when `chat_id_env` is unset
    pub chat_id: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Webhook listener settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
    /// Externally reachable base URL, used to register the webhook
    pub public_url: Option<String>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub curation: CurationConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    pub telegram: Option<TelegramConfig>,
    pub server: Option<ServerConfig>,
}

impl Config {
    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for (path, label) in [(default_path, "default"), (override_path, "override")] {
            let Some(path) = path else { continue };
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {} config: {}", label, path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse {} configuration", label))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Run SQL migrations from the workspace `migrations` directory (embedded at compile time).
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("../migrations")
        .run(pool)
        .await
        .context("Failed to run sqlx migrations")?;

    Ok(())
}

/// Initialize an SQLite connection pool.
///
/// This function will create the parent directory if necessary and return a configured
/// `SqlitePool` in WAL mode. Defaults are conservative for small hosts:
/// - max_connections: 5
/// - connection timeout default provided by `sqlx`
///
/// Example:
///   let pool = init_db_pool("data/newsdrill.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(15));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}

/// Single-connection in-memory pool with migrations applied. Every connection of an
/// in-memory database is a separate database, so the pool must never open a second one.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .context("Failed to open in-memory sqlite database")?;
    run_migrations(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn config_from_string_and_db_pool() {
        let toml = r#"
            [database]
            path = "data/test.db"

            [scheduler]
            times = ["05:00", "11:00"]
            drill_interval_hours = 2

            [[curation.feeds]]
            category = "Tech"
            url = "https://example.com/rss"

            [providers.groq]
            api_key_env = "GROQ_API_KEY"
        "#;

        let cfg: Config = toml::from_str(toml).expect("parse config");
        assert_eq!(cfg.scheduler.times_or_default(), vec!["05:00", "11:00"]);
        assert_eq!(cfg.scheduler.drill_interval_hours, Some(2));
        assert_eq!(cfg.curation.feeds_or_default().len(), 1);
        assert!(cfg.providers.xai.is_none());
        assert_eq!(
            cfg.providers.groq.as_ref().and_then(|g| g.api_key_env.as_deref()),
            Some("GROQ_API_KEY")
        );

        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("nested").join("newsdrill.db");
        let pool = init_db_pool(&db_path.to_string_lossy()).await.expect("init pool");
        run_migrations(&pool).await.expect("migrate");
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('news', 'vocab', 'settings', 'quiz_log')",
        )
        .fetch_one(&pool)
        .await
        .expect("count tables");
        assert_eq!(tables, 4);
    }

    #[test]
    fn defaults_apply_when_sections_missing() {
        let cfg: Config = toml::from_str("[database]\npath = \"x.db\"\n").expect("parse");
        assert_eq!(cfg.scheduler.times_or_default(), DEFAULT_NEWS_TIMES.to_vec());
        assert_eq!(cfg.scheduler.utc_offset().local_minus_utc(), 9 * 3600);
        let feeds = cfg.curation.feeds_or_default();
        assert_eq!(feeds[0].category, "Economy");
        assert_eq!(feeds.len(), 3);
    }

    #[tokio::test]
    async fn override_file_wins_on_merge() {
        let dir = tempfile::tempdir().expect("tempdir");
        let default_path = dir.path().join("default.toml");
        let override_path = dir.path().join("override.toml");
        std::fs::write(
            &default_path,
            "[database]\npath = \"a.db\"\n[scheduler]\ntimes = [\"06:00\"]\nutc_offset_hours = 9\n",
        )
        .expect("write default");
        std::fs::write(&override_path, "[scheduler]\ntimes = [\"07:30\"]\n").expect("write override");

        let cfg = Config::load_with_defaults(Some(&default_path), Some(&override_path))
            .await
            .expect("load");
        assert_eq!(cfg.database.path, "a.db");
        assert_eq!(cfg.scheduler.times, vec!["07:30"]);
        assert_eq!(cfg.scheduler.utc_offset_hours, Some(9));
    }
}
