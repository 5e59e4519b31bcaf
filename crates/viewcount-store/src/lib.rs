//! # viewcount-store
//!
//! The counter store and its collaborators.
//!
//! The store owns the canonical entry set. It applies open, rename and
//! delete events, answers view-count and trending queries, mirrors counts
//! into each item's frontmatter and persists a whole snapshot through a
//! [`BlobStore`]. Saves and refresh notifications are coalesced by a
//! [`Coalescer`] and driven by the host's event loop.

pub mod blob;
pub mod coalesce;
pub mod entries;
pub mod metadata;
pub mod mirror;
pub mod store;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use coalesce::{sleep_until, Coalescer};
pub use entries::EntrySet;
pub use metadata::{FsMetadataStore, MemoryMetadataStore, MetadataStore};
pub use mirror::FrontmatterMirror;
pub use store::{CounterStore, SortOrder, StoreEvent, QUIESCENCE, SNAPSHOT_FILE};
