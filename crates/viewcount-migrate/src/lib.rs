//! # viewcount-migrate
//!
//! Brings persisted settings and counter data forward to the current shape.
//!
//! - [`LegacyStorage`]: the pre-2.0.0 storage strategies, file-backed and
//!   frontmatter-backed, exposing the operation set they shared
//! - [`MigrationChain`]: version-gated settings transforms and their data
//!   side effects, run once at start-up before the counter store loads

pub mod chain;
pub mod legacy;

pub use chain::{MigrationChain, MigrationOutcome, Transform, CURRENT_VERSION};
pub use legacy::{LegacyStorage, StorageIo};
