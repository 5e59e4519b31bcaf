//! Calendar boundaries used for day bucketing and trending windows.
//!
//! Every function takes the reference clock explicitly and returns the
//! epoch-millisecond timestamp of local midnight at the start of the named
//! period, where "local" is the time zone carried by `now`. Production code
//! passes `Local::now()`; tests pass fixed `Utc` instants.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Milliseconds since the epoch at the start of `now`'s calendar day.
pub fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    local_midnight(&now.timezone(), now.date_naive())
}

/// Start of the current week.
///
/// `iso` selects Monday as the first day of the week; otherwise the week
/// starts on Sunday.
pub fn start_of_week<Tz: TimeZone>(now: &DateTime<Tz>, iso: bool) -> i64 {
    let date = now.date_naive();
    let weekday = date.weekday();
    let back = if iso {
        weekday.num_days_from_monday()
    } else {
        weekday.num_days_from_sunday()
    };
    local_midnight(&now.timezone(), date - Duration::days(i64::from(back)))
}

/// Start of the current calendar month.
pub fn start_of_month<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    let date = now.date_naive();
    local_midnight(&now.timezone(), date - Duration::days(i64::from(date.day0())))
}

/// Start of the calendar day `days` days before `now`.
pub fn start_of_n_days_ago<Tz: TimeZone>(now: &DateTime<Tz>, days: u32) -> i64 {
    let date = now.date_naive();
    local_midnight(&now.timezone(), date - Duration::days(i64::from(days)))
}

/// Format an epoch-millisecond timestamp as a `YYYY-MM-DD` date in `tz`.
///
/// Returns `None` for timestamps outside chrono's representable range.
pub fn millis_to_date_string<Tz: TimeZone>(millis: i64, tz: &Tz) -> Option<String>
where
    Tz::Offset: std::fmt::Display,
{
    tz.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Parse a date or date-time property value into epoch milliseconds.
///
/// Accepts RFC 3339 timestamps, `YYYY-MM-DDTHH:MM[:SS]` local date-times and
/// plain `YYYY-MM-DD` dates (read as local midnight in `tz`).
pub fn date_string_to_millis<Tz: TimeZone>(value: &str, tz: &Tz) -> Option<i64> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.timestamp_millis());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| local_midnight(tz, date))
}

/// Local midnight of `date` in `tz`.
///
/// A few zones skip midnight on DST transition days; the first instant of
/// such a day is one hour later.
fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> i64 {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight).timestamp_millis())
}
