//! Storage strategies used before 2.0.0.
//!
//! Older installations kept a flat `{path, viewCount, lastViewMillis}` record
//! per item, either in the snapshot file or directly in each item's
//! frontmatter. [`LegacyStorage`] exposes the operation set both shared so the
//! migration chain can read whichever one was authoritative.

use std::fmt::Display;

use chrono::{DateTime, TimeZone};
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use viewcount_core::error::{Result, ViewCountError};
use viewcount_core::{codec, time, LegacyEntry};
use viewcount_store::{BlobStore, MetadataStore, SNAPSHOT_FILE};

/// The collaborators a legacy strategy reads and writes through.
pub struct StorageIo<'a> {
    pub blobs: &'a mut dyn BlobStore,
    pub metadata: &'a mut dyn MetadataStore,
}

/// A pre-2.0.0 storage strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyStorage {
    /// Counts live in the snapshot file.
    File { entries: Vec<LegacyEntry> },
    /// Counts live in each item's frontmatter.
    Property {
        entries: Vec<LegacyEntry>,
        view_count_property: String,
        last_view_property: String,
        once_a_day: bool,
    },
}

impl LegacyStorage {
    #[must_use]
    pub fn file() -> Self {
        Self::File {
            entries: Vec::new(),
        }
    }

    pub fn property(
        view_count_property: impl Into<String>,
        last_view_property: impl Into<String>,
        once_a_day: bool,
    ) -> Self {
        Self::Property {
            entries: Vec::new(),
            view_count_property: view_count_property.into(),
            last_view_property: last_view_property.into(),
            once_a_day,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[LegacyEntry] {
        match self {
            Self::File { entries } | Self::Property { entries, .. } => entries,
        }
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<LegacyEntry> {
        match self {
            Self::File { entries } | Self::Property { entries, .. } => entries,
        }
    }

    fn entries_mut(&mut self) -> &mut Vec<LegacyEntry> {
        match self {
            Self::File { entries } | Self::Property { entries, .. } => entries,
        }
    }

    fn find(&self, path: &str) -> Option<&LegacyEntry> {
        self.entries().iter().find(|entry| entry.path == path)
    }

    /// Read the authoritative representation into memory.
    ///
    /// The file strategy creates an empty snapshot when none exists. The
    /// property strategy reads every item carrying the count property; last
    /// view values may be millisecond numbers or date strings in `tz`.
    /// Items whose frontmatter cannot be read are left out and returned, one
    /// error per item.
    ///
    /// # Errors
    ///
    /// Propagates blob failures and a failure to list items, and returns
    /// [`viewcount_core::ViewCountError::CorruptStore`] for an unreadable
    /// snapshot.
    pub fn load<Tz: TimeZone>(
        &mut self,
        io: &mut StorageIo<'_>,
        tz: &Tz,
    ) -> Result<Vec<ViewCountError>> {
        let mut skipped = Vec::new();
        match self {
            Self::File { entries } => {
                if io.blobs.exists(SNAPSHOT_FILE)? {
                    *entries = codec::deserialize(&io.blobs.read(SNAPSHOT_FILE)?)?;
                } else {
                    io.blobs
                        .create(SNAPSHOT_FILE, &codec::serialize::<LegacyEntry>(&[])?)?;
                    entries.clear();
                }
            }
            Self::Property {
                entries,
                view_count_property,
                last_view_property,
                ..
            } => {
                entries.clear();
                for path in io.metadata.list_items()? {
                    let props = match io.metadata.read_frontmatter(&path) {
                        Ok(Some(props)) => props,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(path = %path, error = %e, "skipping unreadable item");
                            skipped.push(e);
                            continue;
                        }
                    };
                    let Some(view_count) = count_value(&props, view_count_property) else {
                        continue;
                    };
                    entries.push(LegacyEntry {
                        last_view_millis: millis_value(&props, last_view_property, tz)
                            .unwrap_or(0),
                        path,
                        view_count,
                    });
                }
            }
        }
        debug!(
            entries = self.entries().len(),
            skipped = skipped.len(),
            "loaded legacy storage"
        );
        Ok(skipped)
    }

    /// Count an open of `path` at `now`.
    ///
    /// With `once_a_day` set, the property strategy skips opens on the same
    /// day as the recorded last view. Returns whether the count changed.
    ///
    /// # Errors
    ///
    /// Propagates blob and metadata failures.
    pub fn increment_view_count<Tz: TimeZone>(
        &mut self,
        path: &str,
        now: &DateTime<Tz>,
        io: &mut StorageIo<'_>,
    ) -> Result<bool>
    where
        Tz::Offset: Display,
    {
        let now_millis = now.timestamp_millis();
        match self {
            Self::File { entries } => {
                match entries.iter_mut().find(|entry| entry.path == path) {
                    Some(entry) => {
                        entry.view_count += 1;
                        entry.last_view_millis = now_millis;
                    }
                    None => entries.push(LegacyEntry {
                        path: path.to_string(),
                        view_count: 1,
                        last_view_millis: now_millis,
                    }),
                }
                save(entries, io)?;
                Ok(true)
            }
            Self::Property {
                entries,
                view_count_property,
                last_view_property,
                once_a_day,
            } => {
                let (view_key, last_key, once_a_day) =
                    (view_count_property.as_str(), last_view_property.as_str(), *once_a_day);
                let tz = now.timezone();
                let today = time::start_of_day(now);
                let view_date = time::millis_to_date_string(now_millis, &tz);
                let mut counted = None;

                io.metadata.process_frontmatter(path, &mut |props| {
                    let last = millis_value(props, last_key, &tz).unwrap_or(0);
                    if once_a_day && last >= today {
                        return;
                    }
                    let count = count_value(props, view_key).unwrap_or(0) + 1;
                    props.insert(Value::from(view_key), Value::from(count));
                    if let Some(date) = &view_date {
                        props.insert(Value::from(last_key), Value::from(date.as_str()));
                    }
                    counted = Some(count);
                })?;

                let Some(count) = counted else {
                    return Ok(false);
                };
                match entries.iter_mut().find(|entry| entry.path == path) {
                    Some(entry) => {
                        entry.view_count = count;
                        entry.last_view_millis = now_millis;
                    }
                    None => entries.push(LegacyEntry {
                        path: path.to_string(),
                        view_count: count,
                        last_view_millis: now_millis,
                    }),
                }
                Ok(true)
            }
        }
    }

    #[must_use]
    pub fn get_view_count(&self, path: &str) -> u64 {
        self.find(path).map_or(0, |entry| entry.view_count)
    }

    #[must_use]
    pub fn get_last_view_time(&self, path: &str) -> i64 {
        self.find(path).map_or(0, |entry| entry.last_view_millis)
    }

    /// Point the entry for `old_path` at `new_path`.
    ///
    /// # Errors
    ///
    /// Propagates blob failures when the file strategy persists the change.
    pub fn rename_entry(
        &mut self,
        old_path: &str,
        new_path: &str,
        io: &mut StorageIo<'_>,
    ) -> Result<()> {
        for entry in self.entries_mut().iter_mut() {
            if entry.path == old_path {
                entry.path = new_path.to_string();
            }
        }
        self.persist(io)
    }

    /// Forget `path`.
    ///
    /// # Errors
    ///
    /// Propagates blob failures when the file strategy persists the change.
    pub fn delete_entry(&mut self, path: &str, io: &mut StorageIo<'_>) -> Result<()> {
        self.entries_mut().retain(|entry| entry.path != path);
        self.persist(io)
    }

    fn persist(&self, io: &mut StorageIo<'_>) -> Result<()> {
        match self {
            Self::File { entries } => save(entries, io),
            // The item's frontmatter moves with it.
            Self::Property { .. } => Ok(()),
        }
    }
}

fn save(entries: &[LegacyEntry], io: &mut StorageIo<'_>) -> Result<()> {
    io.blobs.write(SNAPSHOT_FILE, &codec::serialize(entries)?)
}

fn count_value(props: &Mapping, property: &str) -> Option<u64> {
    props.get(property).and_then(Value::as_u64)
}

/// A last-view property as epoch milliseconds.
pub(crate) fn millis_value<Tz: TimeZone>(props: &Mapping, property: &str, tz: &Tz) -> Option<i64> {
    match props.get(property)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => time::date_string_to_millis(s, tz),
        _ => None,
    }
}
