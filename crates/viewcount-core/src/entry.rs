//! Counter entries, one per tracked item.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::period::LOG_RETENTION_DAYS;
use crate::settings::CountMethod;
use crate::time;

/// Open counters for a single item, keyed by its vault path.
///
/// Invariants maintained by [`CounterEntry::record_open`]:
/// - `unique_days_opened <= total_times_opened`
/// - `open_log` is sorted by timestamp and holds nothing older than
///   [`LOG_RETENTION_DAYS`] days before the most recent open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterEntry {
    pub path: String,
    pub total_times_opened: u64,
    pub unique_days_opened: u64,
    #[serde(rename = "openLogs", default)]
    pub open_log: Vec<OpenLogEntry>,
}

/// A single recorded open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenLogEntry {
    pub timestamp_millis: i64,
}

/// Snapshot record written before 2.0.0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyEntry {
    pub path: String,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub last_view_millis: i64,
}

impl CounterEntry {
    /// A fresh entry with zeroed counters and an empty log.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            total_times_opened: 0,
            unique_days_opened: 0,
            open_log: Vec::new(),
        }
    }

    /// Timestamp of the most recent open, or 0 if never opened.
    #[must_use]
    pub fn last_open_millis(&self) -> i64 {
        self.open_log.last().map_or(0, |log| log.timestamp_millis)
    }

    /// The counter selected by `method`.
    #[must_use]
    pub fn view_count(&self, method: CountMethod) -> u64 {
        match method {
            CountMethod::UniqueDaysOpened => self.unique_days_opened,
            CountMethod::TotalTimesOpened => self.total_times_opened,
        }
    }

    /// Number of logged opens at or after `start_millis`.
    #[must_use]
    pub fn opens_since(&self, start_millis: i64) -> usize {
        let older = self
            .open_log
            .partition_point(|log| log.timestamp_millis < start_millis);
        self.open_log.len() - older
    }

    /// Apply one open at `now`.
    ///
    /// Increments the total unconditionally and the unique-day count when the
    /// previous open predates the start of `now`'s day. Log entries older than
    /// the retention window are dropped before `now` is appended.
    ///
    /// Returns `true` when this open started a new day for the item.
    pub fn record_open<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> bool {
        let new_day = self.last_open_millis() < time::start_of_day(now);

        self.total_times_opened += 1;
        if new_day {
            self.unique_days_opened += 1;
        }

        self.prune_log(time::start_of_n_days_ago(now, LOG_RETENTION_DAYS));

        let timestamp_millis = now.timestamp_millis();
        let at = self
            .open_log
            .partition_point(|log| log.timestamp_millis <= timestamp_millis);
        self.open_log.insert(at, OpenLogEntry { timestamp_millis });

        new_day
    }

    /// Drop log entries older than `retention_start_millis`.
    pub fn prune_log(&mut self, retention_start_millis: i64) {
        self.open_log
            .retain(|log| log.timestamp_millis >= retention_start_millis);
    }
}

impl LegacyEntry {
    /// Convert to the current entry shape.
    ///
    /// The legacy last-view time becomes the single log entry. Unique days
    /// are seeded from the old count only when the old store counted once a
    /// day; otherwise there is no way to recover them and they start at 0.
    #[must_use]
    pub fn upgrade(self, once_a_day: bool) -> CounterEntry {
        CounterEntry {
            path: self.path,
            total_times_opened: self.view_count,
            unique_days_opened: if once_a_day { self.view_count } else { 0 },
            open_log: vec![OpenLogEntry {
                timestamp_millis: self.last_view_millis,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn first_open_counts_as_new_day() {
        let mut entry = CounterEntry::new("a.md");
        assert!(entry.record_open(&at(2025, 3, 1, 9)));
        assert_eq!(entry.total_times_opened, 1);
        assert_eq!(entry.unique_days_opened, 1);
        assert_eq!(entry.open_log.len(), 1);
    }

    #[test]
    fn same_day_opens_only_bump_total() {
        let mut entry = CounterEntry::new("a.md");
        entry.record_open(&at(2025, 3, 1, 9));
        assert!(!entry.record_open(&at(2025, 3, 1, 13)));
        assert!(!entry.record_open(&at(2025, 3, 1, 23)));
        assert_eq!(entry.total_times_opened, 3);
        assert_eq!(entry.unique_days_opened, 1);
    }

    #[test]
    fn log_is_pruned_on_write() {
        let mut entry = CounterEntry::new("a.md");
        entry.record_open(&at(2025, 1, 1, 9));
        entry.record_open(&at(2025, 1, 20, 9));
        let now = at(2025, 3, 1, 9);
        entry.record_open(&now);

        let cutoff = time::start_of_n_days_ago(&now, LOG_RETENTION_DAYS);
        assert!(entry.open_log.iter().all(|l| l.timestamp_millis >= cutoff));
        assert_eq!(entry.open_log.len(), 1);
        assert_eq!(entry.total_times_opened, 3);
    }

    #[test]
    fn out_of_order_open_keeps_log_sorted() {
        let mut entry = CounterEntry::new("a.md");
        let later = at(2025, 3, 2, 12);
        entry.record_open(&later);
        entry.record_open(&(later - Duration::hours(2)));
        assert!(entry
            .open_log
            .windows(2)
            .all(|w| w[0].timestamp_millis <= w[1].timestamp_millis));
        assert_eq!(entry.last_open_millis(), later.timestamp_millis());
    }

    #[test]
    fn opens_since_counts_inclusive_boundary() {
        let mut entry = CounterEntry::new("a.md");
        let midnight = at(2025, 3, 2, 0);
        entry.record_open(&(midnight - Duration::hours(1)));
        entry.record_open(&midnight);
        entry.record_open(&(midnight + Duration::hours(5)));
        assert_eq!(entry.opens_since(midnight.timestamp_millis()), 2);
        assert_eq!(entry.opens_since(0), 3);
    }

    #[test]
    fn view_count_follows_method() {
        let mut entry = CounterEntry::new("a.md");
        entry.record_open(&at(2025, 3, 1, 9));
        entry.record_open(&at(2025, 3, 1, 10));
        assert_eq!(entry.view_count(CountMethod::TotalTimesOpened), 2);
        assert_eq!(entry.view_count(CountMethod::UniqueDaysOpened), 1);
    }

    #[test]
    fn legacy_upgrade_seeds_counters() {
        let legacy = LegacyEntry {
            path: "notes/old.md".to_string(),
            view_count: 7,
            last_view_millis: 1_700_000_000_000,
        };

        let daily = legacy.clone().upgrade(true);
        assert_eq!(daily.total_times_opened, 7);
        assert_eq!(daily.unique_days_opened, 7);
        assert_eq!(daily.last_open_millis(), 1_700_000_000_000);

        let every_open = legacy.upgrade(false);
        assert_eq!(every_open.total_times_opened, 7);
        assert_eq!(every_open.unique_days_opened, 0);
        assert_eq!(every_open.open_log.len(), 1);
    }

    #[test]
    fn entry_serializes_with_snapshot_field_names() {
        let mut entry = CounterEntry::new("a.md");
        entry.record_open(&at(2025, 3, 1, 9));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["path"], "a.md");
        assert_eq!(json["totalTimesOpened"], 1);
        assert_eq!(json["uniqueDaysOpened"], 1);
        assert!(json["openLogs"][0]["timestampMillis"].is_i64());
    }
}
