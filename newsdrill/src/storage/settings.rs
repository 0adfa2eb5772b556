use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use tracing::warn;

use super::Store;
use crate::schedule::{self, TriggerId, TriggerTime};

pub const NEWS_TIMES_KEY: &str = "news_schedule_times";
pub const DRILL_INTERVAL_KEY: &str = "drill_interval_hours";
pub const LAST_NEWS_UPDATE_KEY: &str = "last_news_update";

impl Store {
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read setting {}", key))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to write setting {}", key))?;
        Ok(())
    }

    /// Persisted daily news times. An unparsable stored value is reported and ignored.
    pub async fn news_schedule_times(&self) -> Result<Option<Vec<TriggerTime>>> {
        let Some(raw) = self.get_setting(NEWS_TIMES_KEY).await? else {
            return Ok(None);
        };
        let parts: Vec<&str> = raw.split(',').collect();
        match schedule::validate_times(&parts) {
            Ok(times) => Ok(Some(times)),
            Err(e) => {
                warn!("ignoring stored {} '{}': {}", NEWS_TIMES_KEY, raw, e);
                Ok(None)
            }
        }
    }

    /// Validate and persist daily news times. A rejected list leaves the stored value as is;
    /// the error downcasts to [`schedule::ScheduleError`].
    pub async fn set_news_schedule_times<S: AsRef<str>>(&self, times: &[S]) -> Result<Vec<TriggerTime>> {
        let times = schedule::validate_times(times)?;
        let joined = times
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.set_setting(NEWS_TIMES_KEY, &joined).await?;
        Ok(times)
    }

    pub async fn drill_interval_hours(&self) -> Result<Option<i64>> {
        let Some(raw) = self.get_setting(DRILL_INTERVAL_KEY).await? else {
            return Ok(None);
        };
        match raw.trim().parse::<i64>().ok().map(schedule::validate_interval_hours) {
            Some(Ok(hours)) => Ok(Some(hours)),
            _ => {
                warn!("ignoring stored {} '{}'", DRILL_INTERVAL_KEY, raw);
                Ok(None)
            }
        }
    }

    pub async fn set_drill_interval_hours(&self, hours: i64) -> Result<()> {
        let hours = schedule::validate_interval_hours(hours)?;
        self.set_setting(DRILL_INTERVAL_KEY, &hours.to_string()).await
    }

    /// When a trigger last fired, so restarts do not fire it again
    pub async fn trigger_last_fired(&self, id: TriggerId) -> Result<Option<DateTime<FixedOffset>>> {
        let key = id.settings_key();
        let Some(raw) = self.get_setting(&key).await? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Ok(Some(at)),
            Err(e) => {
                warn!("ignoring stored {} '{}': {}", key, raw, e);
                Ok(None)
            }
        }
    }

    pub async fn record_trigger_fired(&self, id: TriggerId, at: DateTime<FixedOffset>) -> Result<()> {
        self.set_setting(&id.settings_key(), &at.to_rfc3339()).await
    }
}
