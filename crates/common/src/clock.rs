//! America/Bogota wall clock.
//!
//! Colombia has observed a fixed UTC-05:00 offset without DST since 1993, so
//! the zone is represented as a `FixedOffset`.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

const BOGOTA_OFFSET_SECS: i32 = 5 * 3600;

pub fn bogota_offset() -> FixedOffset {
    FixedOffset::west_opt(BOGOTA_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

fn now_bogota() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&bogota_offset())
}

/// Source of "now" for date rules. Swapped for a fixed clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        now_bogota()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn bogota_is_five_hours_behind_utc() {
        assert_eq!(bogota_offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn late_utc_evening_is_still_same_day_in_bogota() {
        let utc = Utc.with_ymd_and_hms(2026, 3, 10, 3, 30, 0).unwrap();
        let clock = FixedClock(utc.with_timezone(&bogota_offset()));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
    }
}
