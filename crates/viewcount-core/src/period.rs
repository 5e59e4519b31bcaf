//! Trending time periods and the open-log retention window derived from them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::ViewCountError;
use crate::time;

/// A look-back window for trending queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimePeriod {
    #[serde(rename = "today")]
    Today,
    #[default]
    #[serde(rename = "3-days")]
    Days3,
    #[serde(rename = "7-days")]
    Days7,
    #[serde(rename = "14-days")]
    Days14,
    #[serde(rename = "30-days")]
    Days30,
    #[serde(rename = "week")]
    Week,
    #[serde(rename = "week-iso")]
    WeekIso,
    #[serde(rename = "month")]
    Month,
}

/// Number of days of open history kept per entry.
///
/// Derived from the longest supported period so that adding a period with a
/// longer window automatically widens retention.
pub const LOG_RETENTION_DAYS: u32 = TimePeriod::longest_lookback_days();

impl TimePeriod {
    /// Every supported period, in display order.
    pub const ALL: [TimePeriod; 8] = [
        TimePeriod::Today,
        TimePeriod::Days3,
        TimePeriod::Days7,
        TimePeriod::Days14,
        TimePeriod::Days30,
        TimePeriod::Week,
        TimePeriod::WeekIso,
        TimePeriod::Month,
    ];

    /// The serialized name of this period.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TimePeriod::Today => "today",
            TimePeriod::Days3 => "3-days",
            TimePeriod::Days7 => "7-days",
            TimePeriod::Days14 => "14-days",
            TimePeriod::Days30 => "30-days",
            TimePeriod::Week => "week",
            TimePeriod::WeekIso => "week-iso",
            TimePeriod::Month => "month",
        }
    }

    /// Upper bound on how many days before today this window can start.
    #[must_use]
    pub const fn max_lookback_days(self) -> u32 {
        match self {
            TimePeriod::Today => 0,
            TimePeriod::Days3 => 3,
            TimePeriod::Days7 => 7,
            TimePeriod::Days14 => 14,
            TimePeriod::Days30 => 30,
            TimePeriod::Week | TimePeriod::WeekIso => 7,
            TimePeriod::Month => 31,
        }
    }

    const fn longest_lookback_days() -> u32 {
        let mut longest = 0;
        let mut i = 0;
        while i < Self::ALL.len() {
            let days = Self::ALL[i].max_lookback_days();
            if days > longest {
                longest = days;
            }
            i += 1;
        }
        longest
    }

    /// Epoch milliseconds at which this window starts, relative to `now`.
    pub fn start_millis<Tz: TimeZone>(self, now: &DateTime<Tz>) -> i64 {
        match self {
            TimePeriod::Today => time::start_of_day(now),
            TimePeriod::Days3 => time::start_of_n_days_ago(now, 3),
            TimePeriod::Days7 => time::start_of_n_days_ago(now, 7),
            TimePeriod::Days14 => time::start_of_n_days_ago(now, 14),
            TimePeriod::Days30 => time::start_of_n_days_ago(now, 30),
            TimePeriod::Week => time::start_of_week(now, false),
            TimePeriod::WeekIso => time::start_of_week(now, true),
            TimePeriod::Month => time::start_of_month(now),
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimePeriod {
    type Err = ViewCountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|period| period.as_str() == s)
            .ok_or_else(|| ViewCountError::UnknownValue {
                kind: "time period",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn retention_covers_every_period() {
        assert_eq!(LOG_RETENTION_DAYS, 31);
        for period in TimePeriod::ALL {
            assert!(period.max_lookback_days() <= LOG_RETENTION_DAYS);
        }
    }

    #[test]
    fn period_names_roundtrip_through_serde_and_from_str() {
        for period in TimePeriod::ALL {
            let json = serde_json::to_string(&period).expect("serialize");
            assert_eq!(json, format!("\"{}\"", period.as_str()));
            let back: TimePeriod = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(back, period);
            assert_eq!(period.as_str().parse::<TimePeriod>().unwrap(), period);
        }
    }

    #[test]
    fn unknown_period_is_rejected() {
        let err = "fortnight".parse::<TimePeriod>().unwrap_err();
        assert!(err.to_string().contains("fortnight"));
        assert!(serde_json::from_str::<TimePeriod>("\"fortnight\"").is_err());
    }

    #[test]
    fn window_starts_never_exceed_lookback() {
        let now = Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap();
        let today = time::start_of_day(&now);
        for period in TimePeriod::ALL {
            let start = period.start_millis(&now);
            assert!(start <= today);
            let lookback_days = (today - start) / 86_400_000;
            assert!(lookback_days <= i64::from(period.max_lookback_days()));
        }
    }
}
