//! Deadline arithmetic and urgency classification.
//!
//! Everything here is pure: the current instant is always passed in, so the
//! same inputs give the same outputs regardless of wall clock. Periodic
//! re-evaluation (countdowns, the expiry sweep) belongs to the caller.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn suffix(&self) -> char {
        match self {
            TimeUnit::Seconds => 's',
            TimeUnit::Minutes => 'm',
            TimeUnit::Hours => 'h',
            TimeUnit::Days => 'd',
        }
    }
}

/// `now + amount * unit`.
///
/// Negative amounts and out-of-range results are validation errors.
pub fn create_deadline(
    now: DateTime<Utc>,
    amount: i64,
    unit: TimeUnit,
) -> Result<DateTime<Utc>, LifecycleError> {
    if amount < 0 {
        return Err(LifecycleError::Validation(format!(
            "deadline amount must be >= 0, got {amount}"
        )));
    }
    let span = match unit {
        TimeUnit::Seconds => Duration::try_seconds(amount),
        TimeUnit::Minutes => Duration::try_minutes(amount),
        TimeUnit::Hours => Duration::try_hours(amount),
        TimeUnit::Days => Duration::try_days(amount),
    }
    .ok_or_else(|| LifecycleError::Validation(format!("deadline span out of range: {amount}")))?;

    now.checked_add_signed(span)
        .ok_or_else(|| LifecycleError::Validation("deadline out of range".into()))
}

/// A relative window such as "24h" or "10m".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub amount: i64,
    pub unit: TimeUnit,
}

impl Window {
    pub const fn new(amount: i64, unit: TimeUnit) -> Self {
        Self { amount, unit }
    }

    pub fn deadline_from(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, LifecycleError> {
        create_deadline(now, self.amount, self.unit)
    }

    pub fn as_duration(&self) -> Duration {
        let ms_per_unit = match self.unit {
            TimeUnit::Seconds => MS_PER_SECOND,
            TimeUnit::Minutes => MS_PER_MINUTE,
            TimeUnit::Hours => MS_PER_HOUR,
            TimeUnit::Days => MS_PER_DAY,
        };
        Duration::milliseconds(self.amount.saturating_mul(ms_per_unit))
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for Window {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || LifecycleError::Validation(format!("window must look like 30s, 10m, 24h or 7d: {s:?}"));

        let unit = match s.chars().last().ok_or_else(bad)? {
            's' => TimeUnit::Seconds,
            'm' => TimeUnit::Minutes,
            'h' => TimeUnit::Hours,
            'd' => TimeUnit::Days,
            _ => return Err(bad()),
        };
        let amount: i64 = s[..s.len() - 1].parse().map_err(|_| bad())?;
        if amount <= 0 {
            return Err(bad());
        }
        Ok(Window { amount, unit })
    }
}

/// Remaining time until a deadline, broken down for countdown display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRemaining {
    /// Signed milliseconds; `<= 0` once the deadline has passed.
    pub total_ms: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub expired: bool,
}

pub fn time_remaining(deadline: DateTime<Utc>, now: DateTime<Utc>) -> TimeRemaining {
    let total_ms = (deadline - now).num_milliseconds();
    let left = total_ms.max(0);

    TimeRemaining {
        total_ms,
        days: left / MS_PER_DAY,
        hours: (left % MS_PER_DAY) / MS_PER_HOUR,
        minutes: (left % MS_PER_HOUR) / MS_PER_MINUTE,
        seconds: (left % MS_PER_MINUTE) / MS_PER_SECOND,
        expired: total_ms <= 0,
    }
}

/// Deadline has elapsed at `now`; same boundary as `TimeRemaining::expired`.
pub fn is_elapsed(deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= deadline
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Normal,
    Warning,
    Critical,
    Expired,
}

/// Fractions of the total window at or below which a deadline escalates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UrgencyThresholds {
    pub critical: f64,
    pub warning: f64,
}

impl Default for UrgencyThresholds {
    fn default() -> Self {
        Self {
            critical: 0.15,
            warning: 0.4,
        }
    }
}

pub fn urgency_level(
    deadline: DateTime<Utc>,
    total_duration: Duration,
    now: DateTime<Utc>,
    thresholds: &UrgencyThresholds,
) -> Urgency {
    let remaining = time_remaining(deadline, now);
    if remaining.expired {
        return Urgency::Expired;
    }

    let total_ms = total_duration.num_milliseconds();
    if total_ms <= 0 {
        return Urgency::Critical;
    }

    let ratio = remaining.total_ms as f64 / total_ms as f64;
    if ratio <= thresholds.critical {
        Urgency::Critical
    } else if ratio <= thresholds.warning {
        Urgency::Warning
    } else {
        Urgency::Normal
    }
}
