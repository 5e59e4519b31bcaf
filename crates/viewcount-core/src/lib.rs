//! # viewcount-core
//!
//! Core types for tracking how often items in a vault are opened.
//!
//! This crate defines the foundational types used across the other crates:
//! - [`CounterEntry`]: per-item counters and the rolling open log
//! - Time boundaries ([`time`]) and trending periods ([`TimePeriod`])
//! - [`Settings`]: the versioned configuration record
//! - Snapshot codec ([`codec`]) and frontmatter text handling ([`frontmatter`])
//! - [`PluginVersion`]: the semantic version tag driving migrations
//! - Error hierarchy ([`ViewCountError`])

pub mod codec;
pub mod entry;
pub mod error;
pub mod frontmatter;
pub mod period;
pub mod settings;
pub mod time;
pub mod version;

pub use entry::{CounterEntry, LegacyEntry, OpenLogEntry};
pub use error::{Result, ViewCountError};
pub use period::{TimePeriod, LOG_RETENTION_DAYS};
pub use settings::{CountMethod, ListView, LogLevel, Settings};
pub use version::PluginVersion;
