//! Key-value blob storage for the snapshot file.
//!
//! Keys are `/`-separated paths relative to the host's private config area.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use viewcount_core::error::{Result, ViewCountError};

/// Existence, read, write and create operations on text blobs.
pub trait BlobStore {
    /// Whether a blob exists at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ViewCountError::Io`] if existence cannot be determined.
    fn exists(&self, key: &str) -> Result<bool>;

    /// Read the blob at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ViewCountError::Io`] if the blob is missing or unreadable.
    fn read(&self, key: &str) -> Result<String>;

    /// Write `data` at `key`, replacing any existing blob.
    ///
    /// # Errors
    ///
    /// Returns [`ViewCountError::Io`] if the write fails.
    fn write(&mut self, key: &str, data: &str) -> Result<()>;

    /// Create a new blob at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ViewCountError::Io`] if a blob already exists or the write fails.
    fn create(&mut self, key: &str, data: &str) -> Result<()>;
}

/// Blobs stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.resolve(key).try_exists()?)
    }

    fn read(&self, key: &str) -> Result<String> {
        Ok(fs::read_to_string(self.resolve(key))?)
    }

    fn write(&mut self, key: &str, data: &str) -> Result<()> {
        let path = self.resolve(key);
        Self::ensure_parent(&path)?;

        // Replace atomically through a sibling temp file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn create(&mut self, key: &str, data: &str) -> Result<()> {
        let path = self.resolve(key);
        Self::ensure_parent(&path)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(data.as_bytes())?;
        Ok(())
    }
}

/// In-memory blobs, with optional failure injection for exercising the
/// soft-failure paths of the store and the migration chain.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: BTreeMap<String, String>,
    writes: usize,
    fail_reads: bool,
    fail_writes: bool,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob without counting it as a write.
    #[must_use]
    pub fn with_blob(mut self, key: &str, data: &str) -> Self {
        self.blobs.insert(key.to_string(), data.to_string());
        self
    }

    /// Current contents of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.blobs.get(key).map(String::as_str)
    }

    /// Number of successful `write` and `create` calls.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    fn injected(op: &str, key: &str) -> ViewCountError {
        ViewCountError::Io(std::io::Error::other(format!("injected {op} failure for {key}")))
    }
}

impl BlobStore for MemoryBlobStore {
    fn exists(&self, key: &str) -> Result<bool> {
        if self.fail_reads {
            return Err(Self::injected("exists", key));
        }
        Ok(self.blobs.contains_key(key))
    }

    fn read(&self, key: &str) -> Result<String> {
        if self.fail_reads {
            return Err(Self::injected("read", key));
        }
        self.blobs.get(key).cloned().ok_or_else(|| {
            ViewCountError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("no blob at {key}"),
            ))
        })
    }

    fn write(&mut self, key: &str, data: &str) -> Result<()> {
        if self.fail_writes {
            return Err(Self::injected("write", key));
        }
        self.blobs.insert(key.to_string(), data.to_string());
        self.writes += 1;
        Ok(())
    }

    fn create(&mut self, key: &str, data: &str) -> Result<()> {
        if self.fail_writes {
            return Err(Self::injected("create", key));
        }
        if self.blobs.contains_key(key) {
            return Err(ViewCountError::Io(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("blob already exists at {key}"),
            )));
        }
        self.blobs.insert(key.to_string(), data.to_string());
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_store_writes_and_reads_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsBlobStore::new(dir.path());

        assert!(!store.exists("plugins/view-count/data.json").unwrap());
        store.write("plugins/view-count/data.json", "{}").unwrap();
        assert!(store.exists("plugins/view-count/data.json").unwrap());
        assert_eq!(store.read("plugins/view-count/data.json").unwrap(), "{}");
        assert!(dir
            .path()
            .join("plugins")
            .join("view-count")
            .join("data.json")
            .exists());
    }

    #[test]
    fn fs_store_write_replaces_without_leaving_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsBlobStore::new(dir.path());
        store.write("view-count.json", "one").unwrap();
        store.write("view-count.json", "two").unwrap();
        assert_eq!(store.read("view-count.json").unwrap(), "two");
        assert!(!dir.path().join("view-count.json.tmp").exists());
    }

    #[test]
    fn fs_store_create_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsBlobStore::new(dir.path());
        store.create("view-count.json", "first").unwrap();
        assert!(store.create("view-count.json", "second").is_err());
        assert_eq!(store.read("view-count.json").unwrap(), "first");
    }

    #[test]
    fn fs_store_read_of_missing_blob_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(matches!(
            store.read("missing.json"),
            Err(ViewCountError::Io(_))
        ));
    }

    #[test]
    fn memory_store_counts_writes_and_injects_failures() {
        let mut store = MemoryBlobStore::new().with_blob("a", "seed");
        assert_eq!(store.write_count(), 0);
        store.write("a", "new").unwrap();
        assert_eq!(store.get("a"), Some("new"));
        assert_eq!(store.write_count(), 1);

        store.set_fail_writes(true);
        assert!(store.write("a", "lost").is_err());
        assert_eq!(store.get("a"), Some("new"));

        store.set_fail_reads(true);
        assert!(store.read("a").is_err());
        assert!(store.exists("a").is_err());
    }
}
