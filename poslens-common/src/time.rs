//! Calendar and timezone utilities
//!
//! Every aggregation job buckets transactions by the tenant's local
//! calendar, so the UTC→local conversion lives here and is applied
//! exactly once per timestamp.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse an IANA timezone name ("Asia/Jakarta", "America/New_York")
pub fn parse_tz(name: &str) -> Option<Tz> {
    name.parse::<Tz>().ok()
}

/// A UTC timestamp resolved into the tenant's local calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalParts {
    /// Local calendar date
    pub date: NaiveDate,
    /// Local hour of day, 0-23
    pub hour: u32,
    /// Local day of week, Monday = 0 through Sunday = 6
    pub weekday: u32,
}

/// Resolve a UTC timestamp into local date / hour / weekday
pub fn local_parts(ts: DateTime<Utc>, tz: Tz) -> LocalParts {
    let local = ts.with_timezone(&tz);
    LocalParts {
        date: local.date_naive(),
        hour: local.hour(),
        weekday: local.weekday().num_days_from_monday(),
    }
}

/// Local calendar date of a UTC timestamp
pub fn local_date(ts: DateTime<Utc>, tz: Tz) -> NaiveDate {
    ts.with_timezone(&tz).date_naive()
}

/// Monday of the ISO week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

/// Whole calendar months elapsed between two dates
///
/// A partial month does not count: 2025-01-15 → 2025-07-14 is 5 months,
/// 2025-01-15 → 2025-07-15 is 6.
pub fn whole_months_between(first: NaiveDate, last: NaiveDate) -> i64 {
    if last < first {
        return 0;
    }
    let mut months = (last.year() as i64 - first.year() as i64) * 12
        + (last.month() as i64 - first.month() as i64);
    if last.day() < first.day() {
        months -= 1;
    }
    months.max(0)
}

/// Integer division rounded half away from zero
///
/// Used for monetary averages (minor currency units stay integral).
/// Returns 0 when the divisor is 0.
pub fn div_round(num: i64, den: i64) -> i64 {
    if den == 0 {
        return 0;
    }
    let quotient = num / den;
    let remainder = num % den;
    if remainder == 0 {
        return quotient;
    }
    // Round half away from zero on the remainder magnitude
    if 2 * remainder.abs() >= den.abs() {
        quotient + if (num < 0) != (den < 0) { -1 } else { 1 }
    } else {
        quotient
    }
}
