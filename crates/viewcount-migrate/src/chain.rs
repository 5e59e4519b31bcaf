//! The settings migration chain.
//!
//! The persisted settings record carries the plugin version that last wrote
//! it. On start-up every [`Transform`] whose target is above that version runs
//! in ascending order: first a pure reshape of the record, then any data side
//! effect (rewriting the counter snapshot, rewriting frontmatter).
//!
//! Reshapes only insert derived keys when they are absent and side effects
//! check for the new representation before writing, so the chain can be run
//! again over its own output. The version tag is only advanced when every
//! side effect succeeded; after a failure the old tag is kept and the next
//! start retries.

use std::fmt::Display;

use chrono::TimeZone;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use viewcount_core::error::{Result, ViewCountError};
use viewcount_core::settings::DEFAULT_PROPERTY_NAME;
use viewcount_core::{codec, time, CounterEntry, PluginVersion, Settings};
use viewcount_store::{BlobStore, MetadataStore, SNAPSHOT_FILE};

use crate::legacy::{millis_value, LegacyStorage, StorageIo};

/// The version this build writes into the settings record.
pub const CURRENT_VERSION: PluginVersion = PluginVersion::new(2, 4, 1);

const OLD_LAST_VIEW_PROPERTY: &str = "last-view-time";
const DEFAULT_LAST_VIEW_PROPERTY: &str = "view-date";

/// One version-gated step of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// 0.5.0: last-view times become `YYYY-MM-DD` dates under `view-date`.
    ViewDateProperty,
    /// 1.2.2: the templater toggle becomes a delay in milliseconds.
    TemplaterDelay,
    /// 2.0.0: flat counts become rich entries with an open log.
    RichSnapshot,
    /// 2.4.0: list view preferences.
    ListDefaults,
    /// 2.4.1: list view preferences renamed.
    ListRename,
}

impl Transform {
    /// Every transform, in the order the chain applies them.
    pub const ALL: [Transform; 5] = [
        Transform::ViewDateProperty,
        Transform::TemplaterDelay,
        Transform::RichSnapshot,
        Transform::ListDefaults,
        Transform::ListRename,
    ];

    #[must_use]
    pub const fn target(self) -> PluginVersion {
        match self {
            Transform::ViewDateProperty => PluginVersion::new(0, 5, 0),
            Transform::TemplaterDelay => PluginVersion::new(1, 2, 2),
            Transform::RichSnapshot => PluginVersion::new(2, 0, 0),
            Transform::ListDefaults => PluginVersion::new(2, 4, 0),
            Transform::ListRename => PluginVersion::new(2, 4, 1),
        }
    }

    /// Apply the settings-shape part of this transform.
    pub fn reshape(self, record: &mut Map<String, Value>) {
        match self {
            Transform::ViewDateProperty => {
                match string_field(record, "lastViewTimePropertyName") {
                    Some(custom) if custom != OLD_LAST_VIEW_PROPERTY => {
                        record.insert("lastViewDatePropertyName".into(), custom.into());
                    }
                    _ => insert_absent(
                        record,
                        "lastViewDatePropertyName",
                        DEFAULT_LAST_VIEW_PROPERTY.into(),
                    ),
                }
            }
            Transform::TemplaterDelay => {
                record.remove("enableTemplaterDelay");
                insert_absent(record, "templaterDelay", 0.into());
            }
            Transform::RichSnapshot => {
                let method = if bool_field(record, "incrementOnceADay") {
                    "unique-days-opened"
                } else {
                    "total-times-opened"
                };
                let mirror = is_property_storage(record);
                insert_absent(record, "viewCountType", method.into());
                insert_absent(record, "saveViewCountToFrontmatter", mirror.into());
            }
            Transform::ListDefaults => {
                insert_absent(record, "currentView", "most-viewed".into());
                insert_absent(record, "durationFilter", "3-days".into());
                insert_absent(record, "listSize", 20.into());
            }
            Transform::ListRename => {
                if let Some(period) = record.remove("durationFilter") {
                    insert_absent(record, "timePeriod", period);
                }
                if let Some(size) = record.remove("listSize") {
                    insert_absent(record, "itemCount", size);
                }
                let view = match string_field(record, "currentView").as_deref() {
                    Some("most-viewed") => Some("views"),
                    Some("trending") => Some("trends"),
                    _ => None,
                };
                if let Some(view) = view {
                    record.insert("currentView".into(), view.into());
                }
            }
        }
    }
}

/// The result of a chain run.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    /// Settings in the current shape.
    pub settings: Settings,
    /// The recorded tag, if it was present and parseable.
    pub from: Option<PluginVersion>,
    /// Targets of the transforms that ran, ascending.
    pub applied: Vec<PluginVersion>,
    /// One line per failed data side effect.
    pub warnings: Vec<String>,
    /// Whether every side effect succeeded and the tag was advanced.
    pub complete: bool,
}

/// Runs [`Transform`]s against a settings record and the stores it governs.
pub struct MigrationChain<'a, Tz> {
    io: StorageIo<'a>,
    tz: Tz,
}

impl<'a, Tz> MigrationChain<'a, Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    /// `tz` is the zone in which stored dates are read and written.
    pub fn new(blobs: &'a mut dyn BlobStore, metadata: &'a mut dyn MetadataStore, tz: Tz) -> Self {
        Self {
            io: StorageIo { blobs, metadata },
            tz,
        }
    }

    /// Bring `raw` (the persisted settings, if any) up to `current`.
    ///
    /// A missing record yields the defaults. A record without a usable
    /// version tag is taken as already current and runs no transforms.
    pub fn run(&mut self, raw: Option<Value>, current: PluginVersion) -> MigrationOutcome {
        let mut record = match raw {
            Some(Value::Object(record)) => record,
            Some(other) => {
                warn!(kind = value_kind(&other), "settings record is not an object, using defaults");
                Map::new()
            }
            None => Map::new(),
        };

        let from: Option<PluginVersion> =
            string_field(&record, "pluginVersion").and_then(|tag| tag.parse().ok());
        if from.is_none() && !record.is_empty() {
            warn!("settings record has no usable version tag, taking it as current");
        }

        let mut applied = Vec::new();
        let mut warnings = Vec::new();
        if let Some(from) = from {
            for transform in Transform::ALL.into_iter().filter(|t| from < t.target()) {
                let target = transform.target();
                info!(from = %from, to = %target, "migrating settings");
                transform.reshape(&mut record);
                match self.migrate_data(transform, &record) {
                    Ok(skipped) => {
                        warnings.extend(skipped.iter().map(|e| migration_warning(target, e)));
                    }
                    Err(e) => warnings.push(migration_warning(target, &e)),
                }
                applied.push(target);
            }
        }

        let complete = warnings.is_empty();
        let mut settings = Settings::from_value(Value::Object(record));
        if complete {
            settings.plugin_version = current.to_string();
        }
        MigrationOutcome {
            settings,
            from,
            applied,
            warnings,
            complete,
        }
    }

    /// Run the data side effect of `transform`.
    ///
    /// Items that could not be migrated are returned; the rest of the pass
    /// still runs. `Err` means the side effect as a whole failed.
    fn migrate_data(
        &mut self,
        transform: Transform,
        record: &Map<String, Value>,
    ) -> Result<Vec<ViewCountError>> {
        match transform {
            Transform::ViewDateProperty => self.migrate_view_dates(record),
            Transform::RichSnapshot => self.migrate_snapshot(record),
            Transform::TemplaterDelay | Transform::ListDefaults | Transform::ListRename => {
                Ok(Vec::new())
            }
        }
    }

    /// Move `last-view-time` values to the date property and rewrite numeric
    /// timestamps as dates.
    fn migrate_view_dates(&mut self, record: &Map<String, Value>) -> Result<Vec<ViewCountError>> {
        if string_field(record, "storageType").as_deref() == Some("file") {
            return Ok(Vec::new());
        }
        let rename_old = string_field(record, "lastViewTimePropertyName")
            .map_or(true, |name| name == OLD_LAST_VIEW_PROPERTY);
        let date_property = string_field(record, "lastViewDatePropertyName")
            .unwrap_or_else(|| DEFAULT_LAST_VIEW_PROPERTY.to_string());
        let date_key = serde_yaml::Value::from(date_property.as_str());
        let tz = &self.tz;

        let mut rewritten = 0usize;
        let mut skipped = Vec::new();
        for path in self.io.metadata.list_items()? {
            let edited = self.io.metadata.process_frontmatter(&path, &mut |props| {
                if rename_old && date_property != OLD_LAST_VIEW_PROPERTY {
                    if let Some(old) = props.remove(OLD_LAST_VIEW_PROPERTY) {
                        if !props.contains_key(&date_key) {
                            props.insert(date_key.clone(), old);
                        }
                    }
                }
                if props.get(&date_key).is_some_and(serde_yaml::Value::is_number) {
                    let date = millis_value(props, &date_property, tz)
                        .and_then(|millis| time::millis_to_date_string(millis, tz));
                    if let Some(date) = date {
                        props.insert(date_key.clone(), date.into());
                        rewritten += 1;
                    }
                }
            });
            if let Err(e) = edited {
                warn!(path = %path, error = %e, "skipping unreadable item");
                skipped.push(e);
            }
        }
        info!(rewritten, property = %date_property, "migrated last view dates");
        Ok(skipped)
    }

    /// Write the rich snapshot from whichever legacy representation was
    /// authoritative, unless a rich snapshot is already in place.
    ///
    /// Nothing is written while any item is unreadable, so a later run
    /// starts again from the complete legacy data.
    fn migrate_snapshot(&mut self, record: &Map<String, Value>) -> Result<Vec<ViewCountError>> {
        if self.has_rich_snapshot()? {
            debug!("counter snapshot already migrated");
            return Ok(Vec::new());
        }

        let once_a_day = bool_field(record, "incrementOnceADay");
        let mut legacy = if is_property_storage(record) {
            LegacyStorage::property(
                string_field(record, "viewCountPropertyName")
                    .unwrap_or_else(|| DEFAULT_PROPERTY_NAME.to_string()),
                string_field(record, "lastViewDatePropertyName")
                    .unwrap_or_else(|| DEFAULT_LAST_VIEW_PROPERTY.to_string()),
                once_a_day,
            )
        } else {
            if !self.io.blobs.exists(SNAPSHOT_FILE)? {
                debug!("no legacy snapshot to migrate");
                return Ok(Vec::new());
            }
            LegacyStorage::file()
        };
        let skipped = legacy.load(&mut self.io, &self.tz)?;
        if !skipped.is_empty() {
            warn!(
                unreadable = skipped.len(),
                "keeping legacy counters until every item can be read"
            );
            return Ok(skipped);
        }

        let entries: Vec<CounterEntry> = legacy
            .into_entries()
            .into_iter()
            .map(|entry| entry.upgrade(once_a_day))
            .collect();
        self.io
            .blobs
            .write(SNAPSHOT_FILE, &codec::serialize(&entries)?)?;
        info!(entries = entries.len(), "migrated counter snapshot");
        Ok(Vec::new())
    }

    fn has_rich_snapshot(&self) -> Result<bool> {
        if !self.io.blobs.exists(SNAPSHOT_FILE)? {
            return Ok(false);
        }
        let text = self.io.blobs.read(SNAPSHOT_FILE)?;
        Ok(codec::deserialize::<CounterEntry>(&text).is_ok_and(|entries| !entries.is_empty()))
    }
}

fn migration_warning(target: PluginVersion, cause: &ViewCountError) -> String {
    let err = ViewCountError::Migration {
        target: target.to_string(),
        message: cause.to_string(),
    };
    warn!("{err}");
    err.to_string()
}

fn insert_absent(record: &mut Map<String, Value>, key: &str, value: Value) {
    record.entry(key).or_insert(value);
}

fn string_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(record: &Map<String, Value>, key: &str) -> bool {
    record.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn is_property_storage(record: &Map<String, Value>) -> bool {
    string_field(record, "storageType").as_deref() == Some("property")
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
