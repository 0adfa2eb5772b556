//! Delivery trigger definitions and their due-ness rules.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Upper bound on configured daily news times
pub const MAX_NEWS_TIMES: usize = 5;

/// Longest accepted drill interval (one week)
pub const MAX_DRILL_INTERVAL_HOURS: i64 = 168;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("'{0}' is not a time, expected HH:MM")]
    Format(String),
    #[error("'{0}' is out of range, hour must be 0-23 and minute 0-59")]
    Range(String),
    #[error("at most {} delivery times are allowed, got {0}", MAX_NEWS_TIMES)]
    TooMany(usize),
    #[error("at least one delivery time is required")]
    Empty,
    #[error("drill interval must be between 1 and {} hours", MAX_DRILL_INTERVAL_HOURS)]
    Interval,
}

/// Wall-clock time of day, minute precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerTime {
    hour: u32,
    minute: u32,
}

impl TriggerTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// This time on `date` in the given offset
    pub fn on(&self, date: NaiveDate, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
        let naive = date.and_hms_opt(self.hour, self.minute, 0)?;
        offset.from_local_datetime(&naive).single()
    }
}

impl fmt::Display for TriggerTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TriggerTime {
    type Err = ScheduleError;

    /// Accepts `H:MM` or `HH:MM`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let format_err = || ScheduleError::Format(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(format_err)?;
        let well_formed = (1..=2).contains(&h.len())
            && m.len() == 2
            && h.chars().chain(m.chars()).all(|c| c.is_ascii_digit());
        if !well_formed {
            return Err(format_err());
        }
        let hour: u32 = h.parse().map_err(|_| format_err())?;
        let minute: u32 = m.parse().map_err(|_| format_err())?;
        TriggerTime::new(hour, minute).ok_or_else(|| ScheduleError::Range(s.to_string()))
    }
}

/// Validate a list of daily news times. Blank entries are ignored; the result is
/// sorted and deduplicated.
pub fn validate_times<S: AsRef<str>>(times: &[S]) -> Result<Vec<TriggerTime>, ScheduleError> {
    let mut parsed = times
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .map(TriggerTime::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    parsed.sort();
    parsed.dedup();

    if parsed.is_empty() {
        return Err(ScheduleError::Empty);
    }
    if parsed.len() > MAX_NEWS_TIMES {
        return Err(ScheduleError::TooMany(parsed.len()));
    }
    Ok(parsed)
}

pub fn validate_interval_hours(hours: i64) -> Result<i64, ScheduleError> {
    if !(1..=MAX_DRILL_INTERVAL_HOURS).contains(&hours) {
        return Err(ScheduleError::Interval);
    }
    Ok(hours)
}

/// Validated drill interval as a duration
pub fn drill_interval(hours: i64) -> Result<Duration, ScheduleError> {
    let hours = validate_interval_hours(hours)?;
    Duration::try_hours(hours).ok_or(ScheduleError::Interval)
}

/// Identity of a trigger; also its key in the settings table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerId {
    News(TriggerTime),
    Drill,
}

impl TriggerId {
    pub fn settings_key(&self) -> String {
        match self {
            TriggerId::News(time) => format!("trigger:news:{}", time),
            TriggerId::Drill => "trigger:drill".to_string(),
        }
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerId::News(time) => write!(f, "news@{}", time),
            TriggerId::Drill => f.write_str("drill"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPhase {
    Idle,
    Due,
    Sending,
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerState {
    pub id: TriggerId,
    pub last_fired: Option<DateTime<FixedOffset>>,
    pub phase: TriggerPhase,
}

impl TriggerState {
    pub fn new(id: TriggerId, last_fired: Option<DateTime<FixedOffset>>) -> Self {
        Self {
            id,
            last_fired,
            phase: TriggerPhase::Idle,
        }
    }
}

/// The occurrence of a daily trigger that should fire at `now`, if any.
///
/// An occurrence is due from its wall-clock time until `catch_up` later, unless the
/// trigger already fired at or after it. Yesterday's occurrence is considered too, so
/// a late-evening trigger can still catch up shortly after midnight.
pub fn news_occurrence_due(
    time: TriggerTime,
    now: DateTime<FixedOffset>,
    last_fired: Option<DateTime<FixedOffset>>,
    catch_up: Duration,
) -> Option<DateTime<FixedOffset>> {
    let today = now.date_naive();
    let days = [Some(today), today.pred_opt()];
    days.into_iter()
        .flatten()
        .filter_map(|day| time.on(day, now.offset()))
        .find(|at| {
            *at <= now && now - *at < catch_up && last_fired.map_or(true, |fired| fired < *at)
        })
}

/// Interval triggers fire once `interval` has passed since the last firing.
/// A trigger that never fired is not due; the caller seeds it.
pub fn interval_due(now: DateTime<FixedOffset>, last_fired: Option<DateTime<FixedOffset>>, interval: Duration) -> bool {
    last_fired.map_or(false, |fired| now - fired >= interval)
}
