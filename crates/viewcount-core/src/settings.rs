//! The versioned settings record.
//!
//! Persisted by the host as a JSON document with camelCase keys. Missing or
//! unreadable values fall back to their defaults; keys this version does not
//! know about are kept in [`Settings::extra`] so that a later migration can
//! still consume them.

use std::fmt;
use std::str::FromStr;

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ViewCountError;
use crate::period::TimePeriod;

/// Default frontmatter property for mirrored counts.
pub const DEFAULT_PROPERTY_NAME: &str = "view-count";

/// Longest allowed wait before mirroring into a newly created item.
pub const MAX_INSERTION_DELAY_MS: u64 = 5000;

/// List sizes offered by the display.
pub const ITEM_COUNTS: [u32; 6] = [10, 15, 20, 25, 50, 100];

const DEFAULT_ITEM_COUNT: u32 = 20;

/// Which counter is reported as an item's view count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CountMethod {
    #[default]
    UniqueDaysOpened,
    TotalTimesOpened,
}

/// The list shown by the display component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListView {
    #[default]
    Views,
    Trends,
}

/// Log verbosity persisted with the settings.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Plugin configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    #[serde(deserialize_with = "or_default")]
    pub view_count_type: CountMethod,
    #[serde(deserialize_with = "or_default")]
    pub save_view_count_to_frontmatter: bool,
    #[serde(deserialize_with = "or_default_property")]
    pub view_count_property_name: String,
    #[serde(deserialize_with = "or_default")]
    pub plugin_version: String,
    #[serde(deserialize_with = "or_default")]
    pub log_level: LogLevel,
    #[serde(deserialize_with = "or_default")]
    pub excluded_paths: Vec<String>,
    /// Milliseconds to wait before mirroring into a newly tracked item.
    #[serde(deserialize_with = "or_default")]
    pub templater_delay: u64,
    #[serde(deserialize_with = "or_default")]
    pub current_view: ListView,
    #[serde(deserialize_with = "or_default")]
    pub time_period: TimePeriod,
    #[serde(deserialize_with = "or_default_item_count")]
    pub item_count: u32,
    /// Keys not recognized by this version, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            view_count_type: CountMethod::default(),
            save_view_count_to_frontmatter: false,
            view_count_property_name: DEFAULT_PROPERTY_NAME.to_string(),
            plugin_version: String::new(),
            log_level: LogLevel::default(),
            excluded_paths: Vec::new(),
            templater_delay: 0,
            current_view: ListView::default(),
            time_period: TimePeriod::default(),
            item_count: DEFAULT_ITEM_COUNT,
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Read settings from an untyped record, applying defaults for anything
    /// missing or malformed. A non-object record yields the defaults.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let settings = match value {
            Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
            _ => Self::default(),
        };
        settings.normalized()
    }

    /// Serialize back into an untyped record.
    ///
    /// # Errors
    ///
    /// Returns [`ViewCountError::Serialization`] if serialization fails.
    pub fn to_value(&self) -> Result<Value, ViewCountError> {
        serde_json::to_value(self).map_err(|e| ViewCountError::Serialization(e.to_string()))
    }

    /// Clamp and clean values that the record may hold out of range.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.templater_delay = self.templater_delay.min(MAX_INSERTION_DELAY_MS);
        if !ITEM_COUNTS.contains(&self.item_count) {
            self.item_count = DEFAULT_ITEM_COUNT;
        }
        if self.view_count_property_name.trim().is_empty() {
            self.view_count_property_name = DEFAULT_PROPERTY_NAME.to_string();
        }
        self.excluded_paths = normalize_paths(self.excluded_paths.iter().map(String::as_str));
        self
    }

    /// Excluded paths joined for display in a single text field.
    #[must_use]
    pub fn excluded_paths_csv(&self) -> String {
        self.excluded_paths.join(",")
    }

    /// Replace the excluded paths from a comma-separated list.
    pub fn set_excluded_paths_csv(&mut self, csv: &str) {
        self.excluded_paths = normalize_paths(csv.split(','));
    }

    /// Whether opens of `path` are ignored.
    #[must_use]
    pub fn is_excluded(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.excluded_paths
            .iter()
            .any(|excluded| path.starts_with(excluded.as_str()))
    }
}

/// Normalize a vault-relative path for prefix comparison.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut path = path.trim().replace('\\', "/");
    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest.to_string();
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest.to_string();
        } else {
            break;
        }
    }
    path
}

fn normalize_paths<'a>(paths: impl Iterator<Item = &'a str>) -> Vec<String> {
    paths
        .map(normalize_path)
        .filter(|path| !path.is_empty())
        .collect()
}

fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

fn or_default_property<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(name) => name,
        _ => DEFAULT_PROPERTY_NAME.to_string(),
    })
}

fn or_default_item_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(u32::deserialize(value).unwrap_or(DEFAULT_ITEM_COUNT))
}

impl CountMethod {
    /// The serialized name of this method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CountMethod::UniqueDaysOpened => "unique-days-opened",
            CountMethod::TotalTimesOpened => "total-times-opened",
        }
    }
}

impl fmt::Display for CountMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountMethod {
    type Err = ViewCountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unique-days-opened" => Ok(CountMethod::UniqueDaysOpened),
            "total-times-opened" => Ok(CountMethod::TotalTimesOpened),
            other => Err(ViewCountError::UnknownValue {
                kind: "count method",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for ListView {
    type Err = ViewCountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "views" => Ok(ListView::Views),
            "trends" => Ok(ListView::Trends),
            other => Err(ViewCountError::UnknownValue {
                kind: "list view",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for LogLevel {
    type Err = ViewCountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_lowercase())).map_err(|_| {
            ViewCountError::UnknownValue {
                kind: "log level",
                value: s.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_record_yields_defaults() {
        let settings = Settings::from_value(json!({}));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.view_count_type, CountMethod::UniqueDaysOpened);
        assert_eq!(settings.view_count_property_name, "view-count");
        assert_eq!(settings.time_period, TimePeriod::Days3);
        assert_eq!(settings.item_count, 20);
    }

    #[test]
    fn non_object_record_yields_defaults() {
        assert_eq!(Settings::from_value(Value::Null), Settings::default());
        assert_eq!(Settings::from_value(json!([1, 2])), Settings::default());
    }

    #[test]
    fn reads_original_key_names() {
        let settings = Settings::from_value(json!({
            "viewCountType": "total-times-opened",
            "saveViewCountToFrontmatter": true,
            "viewCountPropertyName": "opens",
            "pluginVersion": "2.4.1",
            "logLevel": "debug",
            "excludedPaths": ["Templates", "./Daily/"],
            "templaterDelay": 300,
            "currentView": "trends",
            "timePeriod": "week-iso",
            "itemCount": 50
        }));

        assert_eq!(settings.view_count_type, CountMethod::TotalTimesOpened);
        assert!(settings.save_view_count_to_frontmatter);
        assert_eq!(settings.view_count_property_name, "opens");
        assert_eq!(settings.plugin_version, "2.4.1");
        assert_eq!(settings.log_level, LogLevel::Debug);
        assert_eq!(settings.excluded_paths, vec!["Templates", "Daily/"]);
        assert_eq!(settings.templater_delay, 300);
        assert_eq!(settings.current_view, ListView::Trends);
        assert_eq!(settings.time_period, TimePeriod::WeekIso);
        assert_eq!(settings.item_count, 50);
        assert!(settings.extra.is_empty());
    }

    #[test]
    fn malformed_values_fall_back_individually() {
        let settings = Settings::from_value(json!({
            "viewCountType": "every-other-day",
            "templaterDelay": 999_999,
            "itemCount": 7,
            "timePeriod": 42,
            "saveViewCountToFrontmatter": true
        }));
        assert_eq!(settings.view_count_type, CountMethod::UniqueDaysOpened);
        assert_eq!(settings.templater_delay, MAX_INSERTION_DELAY_MS);
        assert_eq!(settings.item_count, 20);
        assert_eq!(settings.time_period, TimePeriod::Days3);
        assert!(settings.save_view_count_to_frontmatter);
    }

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let settings = Settings::from_value(json!({
            "storageType": "property",
            "incrementOnceADay": true
        }));
        assert_eq!(settings.extra["storageType"], "property");

        let value = settings.to_value().unwrap();
        assert_eq!(value["storageType"], "property");
        assert_eq!(value["incrementOnceADay"], true);
        assert_eq!(value["viewCountType"], "unique-days-opened");
    }

    #[test]
    fn excluded_paths_use_prefix_matching() {
        let mut settings = Settings::default();
        settings.set_excluded_paths_csv(" Templates/ , ,/Archive,.\\Private");
        assert_eq!(settings.excluded_paths, vec!["Templates/", "Archive", "Private"]);
        assert_eq!(settings.excluded_paths_csv(), "Templates/,Archive,Private");

        assert!(settings.is_excluded("Templates/daily.md"));
        assert!(settings.is_excluded("/Archive/2023/old.md"));
        assert!(settings.is_excluded("Private\\diary.md"));
        assert!(!settings.is_excluded("notes/Templates.md"));
    }

    #[test]
    fn empty_exclusion_list_excludes_nothing() {
        let mut settings = Settings::default();
        settings.set_excluded_paths_csv("");
        assert!(settings.excluded_paths.is_empty());
        assert!(!settings.is_excluded("anything.md"));
    }

    #[test]
    fn parse_enums_from_strings() {
        assert_eq!(
            "total-times-opened".parse::<CountMethod>().unwrap(),
            CountMethod::TotalTimesOpened
        );
        assert_eq!("trends".parse::<ListView>().unwrap(), ListView::Trends);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
