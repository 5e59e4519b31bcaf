//! Snapshot codec.
//!
//! The counter snapshot is a pretty-printed JSON document with the entry
//! list under a single `items` field:
//!
//! ```json
//! {
//!   "items": [
//!     { "path": "a.md", "totalTimesOpened": 3, "uniqueDaysOpened": 2, "openLogs": [] }
//!   ]
//! }
//! ```
//!
//! The codec is generic over the record type so the same envelope reads
//! both current and legacy snapshots.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ViewCountError};

#[derive(Serialize)]
struct Envelope<'a, T> {
    items: &'a [T],
}

/// Serialize entries into the snapshot envelope.
///
/// # Errors
///
/// Returns [`ViewCountError::Serialization`] if an entry cannot be serialized.
pub fn serialize<T: Serialize>(entries: &[T]) -> Result<String> {
    let mut text = serde_json::to_string_pretty(&Envelope { items: entries })
        .map_err(|e| ViewCountError::Serialization(e.to_string()))?;
    text.push('\n');
    Ok(text)
}

/// Parse a snapshot into its entry list.
///
/// Blank input, a document without an `items` field, or a `null` list all
/// read as an empty store.
///
/// # Errors
///
/// Returns [`ViewCountError::CorruptStore`] if the text is not valid JSON or
/// the items do not match `T`.
pub fn deserialize<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let document: Value =
        serde_json::from_str(text).map_err(|e| ViewCountError::CorruptStore(e.to_string()))?;

    match document.get("items") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(items) => {
            Vec::<T>::deserialize(items).map_err(|e| ViewCountError::CorruptStore(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{CounterEntry, LegacyEntry, OpenLogEntry};
    use proptest::prelude::*;

    fn sample() -> Vec<CounterEntry> {
        vec![
            CounterEntry {
                path: "notes/a.md".to_string(),
                total_times_opened: 5,
                unique_days_opened: 2,
                open_log: vec![
                    OpenLogEntry {
                        timestamp_millis: 1_740_000_000_000,
                    },
                    OpenLogEntry {
                        timestamp_millis: 1_740_090_000_000,
                    },
                ],
            },
            CounterEntry::new("b.md"),
        ]
    }

    #[test]
    fn serialize_is_pretty_and_enveloped() {
        let text = serialize(&sample()).unwrap();
        assert!(text.starts_with("{\n  \"items\": [\n"));
        assert!(text.contains("\"totalTimesOpened\": 5"));
        assert!(text.contains("\"openLogs\""));
    }

    #[test]
    fn roundtrip_preserves_entries_and_order() {
        let entries = sample();
        let back: Vec<CounterEntry> = deserialize(&serialize(&entries).unwrap()).unwrap();
        assert_eq!(back, entries);
    }

    #[test]
    fn empty_list_roundtrips() {
        let text = serialize::<CounterEntry>(&[]).unwrap();
        let back: Vec<CounterEntry> = deserialize(&text).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn blank_or_fieldless_documents_read_as_empty() {
        assert!(deserialize::<CounterEntry>("").unwrap().is_empty());
        assert!(deserialize::<CounterEntry>("  \n").unwrap().is_empty());
        assert!(deserialize::<CounterEntry>("{}").unwrap().is_empty());
        assert!(deserialize::<CounterEntry>("{\"items\": null}")
            .unwrap()
            .is_empty());
        assert!(deserialize::<CounterEntry>("{\"items\": []}")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn malformed_text_is_a_corrupt_store() {
        let err = deserialize::<CounterEntry>("{\"items\": [").unwrap_err();
        assert!(matches!(err, ViewCountError::CorruptStore(_)));

        let err = deserialize::<CounterEntry>("{\"items\": 3}").unwrap_err();
        assert!(matches!(err, ViewCountError::CorruptStore(_)));
    }

    #[test]
    fn legacy_snapshots_use_the_same_envelope() {
        let text = r#"{ "items": [ { "path": "old.md", "viewCount": 4, "lastViewMillis": 1700000000000 } ] }"#;
        let entries: Vec<LegacyEntry> = deserialize(text).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].view_count, 4);
        assert_eq!(entries[0].last_view_millis, 1_700_000_000_000);
    }

    fn arb_entry() -> impl Strategy<Value = CounterEntry> {
        (
            "[a-z]{1,8}(/[a-z]{1,8}){0,2}\\.md",
            0u64..10_000,
            prop::collection::vec(0i64..4_000_000_000_000, 0..8),
        )
            .prop_map(|(path, total, mut stamps)| {
                stamps.sort_unstable();
                CounterEntry {
                    path,
                    total_times_opened: total,
                    unique_days_opened: total / 2,
                    open_log: stamps
                        .into_iter()
                        .map(|timestamp_millis| OpenLogEntry { timestamp_millis })
                        .collect(),
                }
            })
    }

    proptest! {
        #[test]
        fn deserialize_inverts_serialize(entries in prop::collection::vec(arb_entry(), 0..12)) {
            let text = serialize(&entries).unwrap();
            let back: Vec<CounterEntry> = deserialize(&text).unwrap();
            prop_assert_eq!(back, entries);
        }
    }
}
