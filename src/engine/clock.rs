//! Time source and trading calendar.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use std::sync::RwLock;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut now) = self.now.write() {
            *now = instant;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.write() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Local calendar of the market the strategies trade in.
#[derive(Debug, Clone, Copy)]
pub struct TradingCalendar {
    offset: FixedOffset,
}

impl TradingCalendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Calendar for a whole-hour UTC offset; out-of-range offsets fall back to UTC.
    pub fn from_offset_hours(hours: i32) -> Self {
        let offset = FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Whole local calendar days from `since` to `now`.
    pub fn days_between(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        (self.local_date(now) - self.local_date(since)).num_days()
    }

    /// At least `days` local calendar days have passed since `since`.
    pub fn has_elapsed(&self, since: DateTime<Utc>, now: DateTime<Utc>, days: u32) -> bool {
        self.days_between(since, now) >= i64::from(days)
    }
}
