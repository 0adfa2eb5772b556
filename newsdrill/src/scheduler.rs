//! Delivery of queued news and vocabulary drills at configured times.
//!
//! The scheduler polls on a fixed interval. Each tick evaluates every trigger against the
//! clock passed in, so tests drive it with arbitrary timestamps. Trigger state (when it
//! last fired) lives in the settings table, which makes restarts idempotent.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::notify::cards::{all_memorized_card, drill_card, news_card};
use crate::notify::NotificationChannel;
use crate::schedule::{
    drill_interval, interval_due, news_occurrence_due, validate_times, TriggerId, TriggerPhase, TriggerState, TriggerTime,
};
use crate::storage::{NewsFilter, Store};

/// Effective scheduler settings, resolved from config
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub news_times: Vec<TriggerTime>,
    pub drill_interval: Duration,
    pub poll_interval: std::time::Duration,
    pub error_cooldown: std::time::Duration,
    pub catch_up: Duration,
    pub batch_size: usize,
    pub offset: FixedOffset,
    /// Only deliver items collected on the current local day
    pub today_only: bool,
}

impl SchedulerSettings {
    pub fn from_config(cfg: &common::SchedulerConfig) -> Result<Self> {
        let news_times = validate_times(&cfg.times_or_default())?;
        let drill_hours = i64::try_from(cfg.drill_interval_hours.unwrap_or(3)).unwrap_or(i64::MAX);
        let catch_up_minutes = cfg.catch_up_minutes.unwrap_or(60).max(1);
        Ok(Self {
            news_times,
            drill_interval: drill_interval(drill_hours)?,
            poll_interval: std::time::Duration::from_secs(cfg.poll_interval_seconds.unwrap_or(60).max(1)),
            error_cooldown: std::time::Duration::from_secs(cfg.error_cooldown_seconds.unwrap_or(60)),
            catch_up: Duration::try_minutes(catch_up_minutes)
                .with_context(|| format!("catch_up_minutes {} is out of range", catch_up_minutes))?,
            batch_size: cfg.batch_size.unwrap_or(5).max(1),
            offset: cfg.utc_offset(),
            today_only: cfg.today_only.unwrap_or(false),
        })
    }
}

/// What a tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    News { trigger: TriggerTime, items: usize },
    /// Nothing queued; the trigger is settled without a message
    NewsEmpty { trigger: TriggerTime },
    NewsFailed { trigger: TriggerTime },
    /// `words == 0` means the "all memorized" card was sent
    Drill { words: usize },
    DrillFailed,
}

pub struct DeliveryScheduler {
    store: Store,
    channel: Arc<dyn NotificationChannel>,
    settings: SchedulerSettings,
    drill_interval: Duration,
    news: Vec<TriggerState>,
    drill: TriggerState,
}

fn advance(state: &mut TriggerState, phase: TriggerPhase) {
    if state.phase != phase {
        debug!(trigger = %state.id, from = ?state.phase, to = ?phase, "trigger transition");
        state.phase = phase;
    }
}

impl DeliveryScheduler {
    /// Build the scheduler and rehydrate trigger state from the store.
    pub async fn load(store: Store, channel: Arc<dyn NotificationChannel>, settings: SchedulerSettings) -> Result<Self> {
        let drill_last = store.trigger_last_fired(TriggerId::Drill).await?;
        let mut scheduler = Self {
            store,
            channel,
            drill_interval: settings.drill_interval,
            settings,
            news: Vec::new(),
            drill: TriggerState::new(TriggerId::Drill, drill_last),
        };
        scheduler.refresh_triggers().await?;
        Ok(scheduler)
    }

    pub fn news_triggers(&self) -> &[TriggerState] {
        &self.news
    }

    pub fn drill_trigger(&self) -> &TriggerState {
        &self.drill
    }

    /// Pick up schedule changes saved in the settings table since the last tick
    async fn refresh_triggers(&mut self) -> Result<()> {
        let times = match self.store.news_schedule_times().await? {
            Some(times) => times,
            None => self.settings.news_times.clone(),
        };
        let current: Vec<TriggerTime> = self
            .news
            .iter()
            .filter_map(|s| match s.id {
                TriggerId::News(t) => Some(t),
                TriggerId::Drill => None,
            })
            .collect();

        if current != times {
            let mut states = Vec::with_capacity(times.len());
            for time in &times {
                let id = TriggerId::News(*time);
                states.push(TriggerState::new(id, self.store.trigger_last_fired(id).await?));
            }
            let listed: Vec<String> = times.iter().map(|t| t.to_string()).collect();
            info!("News delivery times: {}", listed.join(", "));
            self.news = states;
        }

        let interval = match self.store.drill_interval_hours().await? {
            Some(hours) => drill_interval(hours).unwrap_or_else(|e| {
                warn!("ignoring stored drill interval {}: {}", hours, e);
                self.settings.drill_interval
            }),
            None => self.settings.drill_interval,
        };
        if interval != self.drill_interval {
            info!("Vocabulary drill every {} hours", interval.num_hours());
            self.drill_interval = interval;
        }
        Ok(())
    }

    /// Evaluate every trigger at `now` and deliver whatever is due.
    pub async fn tick(&mut self, now: DateTime<FixedOffset>) -> Result<Vec<Delivery>> {
        self.refresh_triggers().await?;
        let mut deliveries = Vec::new();

        for idx in 0..self.news.len() {
            let TriggerId::News(time) = self.news[idx].id else {
                continue;
            };
            if news_occurrence_due(time, now, self.news[idx].last_fired, self.settings.catch_up).is_none() {
                continue;
            }
            info!("Executing scheduled news notification at {}", time);
            advance(&mut self.news[idx], TriggerPhase::Due);
            advance(&mut self.news[idx], TriggerPhase::Sending);
            let outcome = match self.send_news(time, now).await {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!("News delivery for {} failed: {:#}", time, e);
                    Delivery::NewsFailed { trigger: time }
                }
            };
            let state = &mut self.news[idx];
            match &outcome {
                Delivery::NewsFailed { .. } => advance(state, TriggerPhase::Idle),
                _ => {
                    state.last_fired = Some(now);
                    advance(state, TriggerPhase::Settled);
                }
            }
            deliveries.push(outcome);
        }

        if let Some(delivery) = self.check_drill(now).await? {
            deliveries.push(delivery);
        }
        Ok(deliveries)
    }

    async fn send_news(&self, trigger: TriggerTime, now: DateTime<FixedOffset>) -> Result<Delivery> {
        let id = TriggerId::News(trigger);
        let filter = if self.settings.today_only {
            NewsFilter::default().on_date(now.date_naive())
        } else {
            NewsFilter::default()
        };
        let items = self.store.get_undelivered(&filter, self.settings.batch_size).await?;
        info!("Unsent news count: {}", items.len());

        if items.is_empty() {
            info!("No unsent news found, skipping");
            self.store.record_trigger_fired(id, now).await?;
            return Ok(Delivery::NewsEmpty { trigger });
        }

        let card = news_card(&items, now);
        if !self.channel.send_card(&card).await {
            warn!("News delivery for {} failed, will retry", trigger);
            return Ok(Delivery::NewsFailed { trigger });
        }

        let ids: Vec<i64> = items.iter().map(|n| n.id).collect();
        self.store.mark_delivered(&ids).await?;
        self.store.record_trigger_fired(id, now).await?;
        info!("News notification sent, {} articles marked as sent", ids.len());
        Ok(Delivery::News {
            trigger,
            items: ids.len(),
        })
    }

    async fn check_drill(&mut self, now: DateTime<FixedOffset>) -> Result<Option<Delivery>> {
        if self.drill.last_fired.is_none() {
            // first start: the first drill comes one interval from now
            self.store.record_trigger_fired(TriggerId::Drill, now).await?;
            self.drill.last_fired = Some(now);
            advance(&mut self.drill, TriggerPhase::Settled);
            return Ok(None);
        }
        if !interval_due(now, self.drill.last_fired, self.drill_interval) {
            return Ok(None);
        }

        info!("Executing vocab drill (every {} hours)", self.drill_interval.num_hours());
        advance(&mut self.drill, TriggerPhase::Due);
        advance(&mut self.drill, TriggerPhase::Sending);
        let sent = deliver_drill(&self.store, self.channel.as_ref(), self.settings.batch_size, now).await;
        match sent {
            Ok(Some(words)) => {
                self.store.record_trigger_fired(TriggerId::Drill, now).await?;
                self.drill.last_fired = Some(now);
                advance(&mut self.drill, TriggerPhase::Settled);
                Ok(Some(Delivery::Drill { words }))
            }
            Ok(None) => {
                advance(&mut self.drill, TriggerPhase::Idle);
                Ok(Some(Delivery::DrillFailed))
            }
            Err(e) => {
                advance(&mut self.drill, TriggerPhase::Idle);
                Err(e)
            }
        }
    }

    /// Poll until `shutdown` is notified. A failing tick is logged and followed by a
    /// cooldown; it never ends the loop.
    pub async fn run(mut self, shutdown: Arc<Notify>) {
        info!(
            "Delivery scheduler started: {} news times, drill every {} hours",
            self.settings.news_times.len(),
            self.drill_interval.num_hours()
        );

        loop {
            let now = Utc::now().with_timezone(&self.settings.offset);
            let pause = match self.tick(now).await {
                Ok(deliveries) => {
                    for delivery in &deliveries {
                        debug!(?delivery, "tick delivered");
                    }
                    self.settings.poll_interval
                }
                Err(e) => {
                    error!("Error in scheduler loop: {:#}", e);
                    self.settings.error_cooldown
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {},
                _ = shutdown.notified() => {
                    info!("scheduler: shutdown requested, exiting loop");
                    break;
                }
            }
        }
    }
}

/// Send a drill of up to `count` random active words, or the "all memorized" card when
/// none is left. Returns the number of words sent, `None` if the channel failed.
pub async fn deliver_drill(
    store: &Store,
    channel: &dyn NotificationChannel,
    count: usize,
    now: DateTime<FixedOffset>,
) -> Result<Option<usize>> {
    let words = store.random_active_words(count).await?;
    let card = if words.is_empty() {
        warn!("No active words left");
        all_memorized_card(now)
    } else {
        drill_card(&words, now)
    };

    if !channel.send_card(&card).await {
        error!("Failed to send vocab drill");
        return Ok(None);
    }
    info!("Vocab drill sent, {} words", words.len());
    Ok(Some(words.len()))
}
