//! OLE automation `DATE`
//!
//! Days since 1899-12-30 with the time of day as the fraction. Before the
//! epoch the fraction still counts forward, so -1.25 is 1899-12-29 06:00.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use axcom::DATE;

/// `DATE` that marks "no date"; anything at or above it decodes to nothing.
pub const INVALID_DATE: DATE = 949_998.0;

/// Earliest representable `DATE` (0100-01-01)
const MIN_DATE: DATE = -657_434.0;

const MS_PER_DAY: i64 = 86_400_000;

fn epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)
}

/// Decode a `DATE`, rounded to the millisecond.
#[must_use]
pub fn date_to_datetime(date: DATE) -> Option<NaiveDateTime> {
    if !date.is_finite() || date >= INVALID_DATE || date < MIN_DATE {
        return None;
    }
    let mut days = date.trunc() as i64;
    let mut ms = (date.fract().abs() * MS_PER_DAY as f64).round() as i64;
    if ms >= MS_PER_DAY {
        days += 1;
        ms = 0;
    }
    epoch()?
        .checked_add_signed(Duration::days(days))?
        .checked_add_signed(Duration::milliseconds(ms))
}

/// Encode a datetime; `None` encodes as [`INVALID_DATE`].
#[must_use]
pub fn datetime_to_date(value: Option<NaiveDateTime>) -> DATE {
    let Some(value) = value else {
        return INVALID_DATE;
    };
    let Some(epoch) = epoch() else {
        return INVALID_DATE;
    };
    let days = (value.date() - epoch.date()).num_days();
    let time = value.time();
    let ms = i64::from(time.num_seconds_from_midnight()) * 1000
        + i64::from(time.nanosecond() / 1_000_000);
    let fraction = ms as f64 / MS_PER_DAY as f64;
    if days >= 0 {
        days as f64 + fraction
    } else {
        days as f64 - fraction
    }
}

/// Encode a date at midnight.
#[must_use]
pub fn date_only_to_date(date: NaiveDate) -> DATE {
    datetime_to_date(date.and_hms_opt(0, 0, 0))
}

/// Encode a time of day on the epoch day.
#[must_use]
pub fn time_only_to_date(time: NaiveTime) -> DATE {
    datetime_to_date(epoch().map(|e| e.date().and_time(time)))
}
