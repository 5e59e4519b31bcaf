//! The counter store state machine.
//!
//! [`CounterStore`] owns the canonical [`EntrySet`]. Every mutation goes
//! through its public operations, which schedule a debounced snapshot save
//! and a debounced refresh notification. The host drives the schedule:
//!
//! ```ignore
//! loop {
//!     let deadline = store.next_deadline();
//!     tokio::select! {
//!         event = events.next() => { /* store.handle_open(..).await, etc. */ }
//!         () = sleep_until(deadline) => store.flush_due(Instant::now()),
//!     }
//! }
//! store.shutdown();
//! ```
//!
//! Soft failures (snapshot I/O, frontmatter writes) are logged and published
//! to subscribers as [`StoreEvent::Warning`]; they never abort an operation.

use std::cmp::Reverse;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use viewcount_core::codec;
use viewcount_core::error::{Result, ViewCountError};
use viewcount_core::settings::MAX_INSERTION_DELAY_MS;
use viewcount_core::{CounterEntry, Settings, TimePeriod};

use crate::blob::BlobStore;
use crate::coalesce::Coalescer;
use crate::entries::EntrySet;
use crate::metadata::MetadataStore;
use crate::mirror::FrontmatterMirror;

/// Snapshot key, relative to the host's private config area.
pub const SNAPSHOT_FILE: &str = "view-count.json";

/// Quiet period before a burst of mutations is saved and announced.
pub const QUIESCENCE: Duration = Duration::from_millis(200);

const EVENT_CAPACITY: usize = 64;

/// Notifications published to store subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The entry set changed; displays should re-render.
    Refreshed,
    /// A one-line, user-visible notice about a recovered failure.
    Warning(String),
}

/// Sort direction for [`CounterStore::entries_by_view_count`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Per-item open counters over a blob-backed snapshot.
pub struct CounterStore<B, M> {
    blobs: B,
    metadata: M,
    settings: Settings,
    entries: EntrySet,
    save: Coalescer,
    refresh: Coalescer,
    events: broadcast::Sender<StoreEvent>,
    read_only: bool,
}

impl<B: BlobStore, M: MetadataStore> CounterStore<B, M> {
    /// An empty store. Call [`CounterStore::load`] to read the snapshot.
    pub fn new(blobs: B, metadata: M, settings: Settings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            blobs,
            metadata,
            settings,
            entries: EntrySet::default(),
            save: Coalescer::new(QUIESCENCE),
            refresh: Coalescer::new(QUIESCENCE),
            events,
            read_only: false,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the active settings.
    ///
    /// Mirrors are not touched; call [`CounterStore::sync_all_to_frontmatter`]
    /// when the counting mode or mirror settings changed.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
        self.refresh.request(Instant::now());
    }

    /// Keep the snapshot and every item's frontmatter untouched.
    ///
    /// Opens are still counted in memory. Used while stored data has not
    /// been brought to the current format, so the store cannot overwrite
    /// what it could not read.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Receive refresh and warning notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn blobs_mut(&mut self) -> &mut B {
        &mut self.blobs
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut M {
        &mut self.metadata
    }

    fn mirror(&self) -> FrontmatterMirror {
        FrontmatterMirror::new(self.settings.view_count_property_name.as_str())
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn warn_user(&self, message: String) {
        warn!("{message}");
        self.publish(StoreEvent::Warning(message));
    }

    fn schedule(&mut self) {
        let now = Instant::now();
        self.save.request(now);
        self.refresh.request(now);
    }

    // --- persistence ---

    fn read_snapshot(&mut self) -> Result<Vec<CounterEntry>> {
        if !self.blobs.exists(SNAPSHOT_FILE)? {
            if self.read_only {
                return Ok(Vec::new());
            }
            debug!(key = SNAPSHOT_FILE, "creating empty snapshot");
            self.blobs
                .create(SNAPSHOT_FILE, &codec::serialize::<CounterEntry>(&[])?)?;
            return Ok(Vec::new());
        }
        codec::deserialize(&self.blobs.read(SNAPSHOT_FILE)?)
    }

    /// Read the snapshot, creating an empty one on first run.
    ///
    /// A corrupt snapshot loads as an empty store. I/O failures leave the
    /// in-memory entries untouched. Both publish a warning; returns `false`
    /// in either case.
    pub fn load(&mut self) -> bool {
        trace!("loading counter snapshot");
        let loaded = match self.read_snapshot() {
            Ok(entries) => {
                debug!(entries = entries.len(), "loaded counter snapshot");
                self.entries = EntrySet::from_entries(entries);
                true
            }
            Err(ViewCountError::CorruptStore(reason)) => {
                self.entries = EntrySet::default();
                let message = if self.read_only {
                    format!("View count data is unreadable and was left as is: {reason}")
                } else {
                    format!("View count data is unreadable and was reset: {reason}")
                };
                self.warn_user(message);
                false
            }
            Err(e) => {
                self.warn_user(format!("Failed to load view count data: {e}"));
                false
            }
        };
        self.publish(StoreEvent::Refreshed);
        loaded
    }

    /// Write the full snapshot now.
    ///
    /// Failures are logged and published as a warning; returns `false` then,
    /// and when the store is read-only.
    pub fn save(&mut self) -> bool {
        if self.read_only {
            debug!(entries = self.entries.len(), "read-only, snapshot not saved");
            return false;
        }
        let written = codec::serialize(self.entries.as_slice())
            .and_then(|text| self.blobs.write(SNAPSHOT_FILE, &text));
        match written {
            Ok(()) => {
                debug!(entries = self.entries.len(), "saved counter snapshot");
                true
            }
            Err(e) => {
                self.warn_user(format!("Failed to save view count data: {e}"));
                false
            }
        }
    }

    // --- events ---

    /// Record an open of `path` at `now`.
    ///
    /// Excluded paths are ignored and return `false`. When mirroring is
    /// enabled and the entry is new, waits out the configured insertion delay
    /// before writing the count into the item's frontmatter.
    pub async fn handle_open<Tz: TimeZone>(&mut self, path: &str, now: &DateTime<Tz>) -> bool {
        trace!(path, "handle open");
        if self.settings.is_excluded(path) {
            debug!(path, "ignoring open of excluded path");
            return false;
        }

        let method = self.settings.view_count_type;
        let (entry, created) = self.entries.get_or_insert(path);
        let new_day = entry.record_open(now);
        let count = entry.view_count(method);
        debug!(
            path,
            created,
            new_day,
            total = entry.total_times_opened,
            unique_days = entry.unique_days_opened,
            "recorded open"
        );

        if self.settings.save_view_count_to_frontmatter && !self.read_only {
            let delay = self.settings.templater_delay.min(MAX_INSERTION_DELAY_MS);
            if created && delay > 0 {
                trace!(path, delay_ms = delay, "waiting before first mirror write");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            self.write_mirror(path, count);
        }

        self.schedule();
        true
    }

    fn write_mirror(&mut self, path: &str, count: u64) {
        let mirror = self.mirror();
        match mirror.write_count(&mut self.metadata, path, count) {
            Ok(true) => {}
            Ok(false) => trace!(path, "item cannot carry frontmatter"),
            Err(e) => self.warn_user(format!("Failed to update frontmatter of {path}: {e}")),
        }
    }

    /// Move the entry for `old_path` to `new_path`. No-op if untracked.
    pub fn rename(&mut self, old_path: &str, new_path: &str) -> bool {
        trace!(old_path, new_path, "rename");
        if !self.entries.rename(old_path, new_path) {
            return false;
        }
        debug!(old_path, new_path, "renamed entry");
        self.schedule();
        true
    }

    /// Drop the entry for `path`. No-op if untracked.
    pub fn delete(&mut self, path: &str) -> bool {
        trace!(path, "delete");
        if self.entries.remove(path).is_none() {
            return false;
        }
        debug!(path, "deleted entry");
        self.schedule();
        true
    }

    /// Bring every tracked item's mirror in line with the current settings.
    ///
    /// Writes the active-mode count when mirroring is enabled and removes the
    /// property otherwise. Returns the number of items touched.
    pub fn sync_all_to_frontmatter(&mut self) -> usize {
        if self.read_only {
            debug!("read-only, frontmatter not synced");
            return 0;
        }
        let mirror = self.mirror();
        let enabled = self.settings.save_view_count_to_frontmatter;
        let method = self.settings.view_count_type;
        debug!(enabled, property = mirror.property(), "syncing frontmatter");

        let mut touched = 0;
        let mut failures = Vec::new();
        for entry in self.entries.iter() {
            let result = if enabled {
                mirror.write_count(&mut self.metadata, &entry.path, entry.view_count(method))
            } else {
                mirror.clear(&mut self.metadata, &entry.path)
            };
            match result {
                Ok(true) => touched += 1,
                Ok(false) => {}
                Err(e) => {
                    failures.push(format!("Failed to sync frontmatter of {}: {e}", entry.path));
                }
            }
        }
        for message in failures {
            self.warn_user(message);
        }
        touched
    }

    /// Remove a previously mirrored `property` from every tracked item.
    pub fn clear_mirror_property(&mut self, property: &str) -> usize {
        if self.read_only {
            debug!(property, "read-only, frontmatter not cleared");
            return 0;
        }
        let mirror = FrontmatterMirror::new(property);
        let mut cleared = 0;
        let mut failures = Vec::new();
        for entry in self.entries.iter() {
            match mirror.clear(&mut self.metadata, &entry.path) {
                Ok(true) => cleared += 1,
                Ok(false) => {}
                Err(e) => {
                    failures.push(format!("Failed to clear {property} on {}: {e}", entry.path));
                }
            }
        }
        for message in failures {
            self.warn_user(message);
        }
        cleared
    }

    // --- queries ---

    #[must_use]
    pub fn entries(&self) -> &[CounterEntry] {
        self.entries.as_slice()
    }

    /// The active-mode count for `path`, or 0 if untracked.
    #[must_use]
    pub fn get_view_count(&self, path: &str) -> u64 {
        self.entries
            .get(path)
            .map_or(0, |entry| entry.view_count(self.settings.view_count_type))
    }

    /// Milliseconds of the most recent open of `path`, or 0.
    #[must_use]
    pub fn get_last_open_time(&self, path: &str) -> i64 {
        self.entries.get(path).map_or(0, CounterEntry::last_open_millis)
    }

    /// Opens of `path` within `period` as seen from `now`.
    pub fn get_trending_weight<Tz: TimeZone>(
        &self,
        path: &str,
        period: TimePeriod,
        now: &DateTime<Tz>,
    ) -> usize {
        self.entries
            .get(path)
            .map_or(0, |entry| entry.opens_since(period.start_millis(now)))
    }

    /// Entries sorted by active-mode count; ties keep insertion order.
    #[must_use]
    pub fn entries_by_view_count(&self, order: SortOrder) -> Vec<&CounterEntry> {
        let method = self.settings.view_count_type;
        let mut sorted: Vec<&CounterEntry> = self.entries.iter().collect();
        match order {
            SortOrder::Ascending => sorted.sort_by_key(|entry| entry.view_count(method)),
            SortOrder::Descending => sorted.sort_by_key(|entry| Reverse(entry.view_count(method))),
        }
        sorted
    }

    /// Entries opened within `period`, heaviest first; ties keep insertion
    /// order.
    pub fn entries_by_trending<Tz: TimeZone>(
        &self,
        period: TimePeriod,
        now: &DateTime<Tz>,
    ) -> Vec<(&CounterEntry, usize)> {
        let start = period.start_millis(now);
        let mut weighted: Vec<(&CounterEntry, usize)> = self
            .entries
            .iter()
            .map(|entry| (entry, entry.opens_since(start)))
            .filter(|(_, weight)| *weight > 0)
            .collect();
        weighted.sort_by_key(|(_, weight)| Reverse(*weight));
        weighted
    }

    /// Short status line such as `1 view` or `12 views`.
    #[must_use]
    pub fn status_text(&self, path: &str) -> String {
        match self.get_view_count(path) {
            1 => "1 view".to_string(),
            n => format!("{n} views"),
        }
    }

    // --- scheduling ---

    /// Earliest instant at which [`CounterStore::flush_due`] has work.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.save.deadline(), self.refresh.deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    #[must_use]
    pub fn has_pending_save(&self) -> bool {
        self.save.is_pending()
    }

    /// Run the debounced save and refresh whose quiet period has elapsed.
    pub fn flush_due(&mut self, now: Instant) {
        if self.save.take_due(now) {
            self.save();
        }
        if self.refresh.take_due(now) {
            self.publish(StoreEvent::Refreshed);
        }
    }

    /// Flush all pending work immediately.
    pub fn shutdown(&mut self) {
        if self.save.take() {
            debug!("flushing pending save on shutdown");
            self.save();
        }
        if self.refresh.take() {
            self.publish(StoreEvent::Refreshed);
        }
    }
}
