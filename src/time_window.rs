//! Submission window of the CCS registry.
//!
//! Detailing requests are only accepted on business days between 10:00 and
//! 18:55 (registry local time). Outside that window requests are queued and
//! submitted by the batch processor.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset, TimeZone, Utc, Weekday};

/// Source of the current instant, injectable so workflows can be tested at a
/// fixed point in time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

const WINDOW_OPENS: (u32, u32) = (10, 0);
const WINDOW_CLOSES: (u32, u32) = (18, 55);

/// Returns whether `now` is Monday–Friday within `[10:00, 18:55)` in the
/// time zone `now` carries.
pub fn is_within_submission_window<Tz: TimeZone>(now: &DateTime<Tz>) -> bool {
    if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }

    let time = now.time();
    let (Some(opens), Some(closes)) = (
        NaiveTime::from_hms_opt(WINDOW_OPENS.0, WINDOW_OPENS.1, 0),
        NaiveTime::from_hms_opt(WINDOW_CLOSES.0, WINDOW_CLOSES.1, 0),
    ) else {
        return false;
    };

    time >= opens && time < closes
}

/// The registry's civil time zone, expressed as a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionWindow {
    offset: FixedOffset,
}

impl SubmissionWindow {
    /// Out-of-range offsets fall back to UTC; `Config` rejects them earlier.
    pub fn new(utc_offset_hours: i32) -> Self {
        let offset = utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    pub fn brasilia() -> Self {
        Self::new(-3)
    }

    pub fn local(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset)
    }

    pub fn is_open(&self, instant: DateTime<Utc>) -> bool {
        is_within_submission_window(&self.local(instant))
    }
}

impl Default for SubmissionWindow {
    fn default() -> Self {
        Self::brasilia()
    }
}
