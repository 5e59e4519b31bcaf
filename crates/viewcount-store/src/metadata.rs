//! Per-item metadata access.
//!
//! An item's metadata is the YAML frontmatter block of a markdown file.
//! Items that cannot carry frontmatter (images, PDFs, missing files) report
//! `false`/`None` rather than an error.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::debug;
use walkdir::WalkDir;

use viewcount_core::error::{Result, ViewCountError};
use viewcount_core::frontmatter;

/// Read-modify-write access to the key-value block attached to an item.
pub trait MetadataStore {
    /// Apply `edit` to the item's property map and persist the result.
    ///
    /// Returns `false` when the item does not exist or cannot carry
    /// frontmatter; `edit` is not called in that case.
    ///
    /// # Errors
    ///
    /// Returns [`ViewCountError::Metadata`] if the existing block cannot be
    /// parsed, or [`ViewCountError::Io`] if the item cannot be read or written.
    fn process_frontmatter(
        &mut self,
        path: &str,
        edit: &mut dyn FnMut(&mut Mapping),
    ) -> Result<bool>;

    /// The item's property map, or `None` when the item does not exist or
    /// cannot carry frontmatter.
    ///
    /// # Errors
    ///
    /// Same as [`MetadataStore::process_frontmatter`].
    fn read_frontmatter(&self, path: &str) -> Result<Option<Mapping>>;

    /// Paths of every item that can carry frontmatter.
    ///
    /// # Errors
    ///
    /// Returns [`ViewCountError::Io`] if the listing fails.
    fn list_items(&self) -> Result<Vec<String>>;

    /// Read a single property.
    ///
    /// # Errors
    ///
    /// Same as [`MetadataStore::read_frontmatter`].
    fn read_property(&self, path: &str, property: &str) -> Result<Option<Value>> {
        Ok(self
            .read_frontmatter(path)?
            .and_then(|props| props.get(property).cloned()))
    }
}

fn is_markdown(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

/// Rewrite markdown `content` with `edit` applied to its frontmatter.
fn edit_content(
    path: &str,
    content: &str,
    edit: &mut dyn FnMut(&mut Mapping),
) -> Result<Option<String>> {
    frontmatter::update_properties(content, |props| edit(props))
        .map_err(|e| ViewCountError::metadata(path, e))
}

/// Markdown files under a vault root.
#[derive(Debug, Clone)]
pub struct FsMetadataStore {
    root: PathBuf,
}

impl FsMetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |full, part| full.join(part))
    }

    fn read_markdown(&self, path: &str) -> Result<Option<String>> {
        if !is_markdown(path) {
            return Ok(None);
        }
        let full = self.resolve(path);
        if !full.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(full)?))
    }
}

impl MetadataStore for FsMetadataStore {
    fn process_frontmatter(
        &mut self,
        path: &str,
        edit: &mut dyn FnMut(&mut Mapping),
    ) -> Result<bool> {
        let Some(content) = self.read_markdown(path)? else {
            return Ok(false);
        };

        if let Some(updated) = edit_content(path, &content, edit)? {
            debug!(path, "rewriting frontmatter");
            fs::write(self.resolve(path), updated)?;
        }
        Ok(true)
    }

    fn read_frontmatter(&self, path: &str) -> Result<Option<Mapping>> {
        let Some(content) = self.read_markdown(path)? else {
            return Ok(None);
        };
        let (props, _) =
            frontmatter::read_properties(&content).map_err(|e| ViewCountError::metadata(path, e))?;
        Ok(Some(props))
    }

    fn list_items(&self) -> Result<Vec<String>> {
        let mut items = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            // Skip hidden directories (.obsidian, .trash)
            .filter_entry(|entry| {
                entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
            });

        for entry in walker {
            let entry = entry.map_err(|e| ViewCountError::Io(std::io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if is_markdown(&key) {
                items.push(key);
            }
        }
        Ok(items)
    }
}

/// Markdown items held in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataStore {
    items: BTreeMap<String, String>,
    fail_writes: bool,
}

impl MemoryMetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an item's full markdown content.
    #[must_use]
    pub fn with_item(mut self, path: &str, content: &str) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: &str, content: &str) {
        self.items.insert(path.to_string(), content.to_string());
    }

    /// Current markdown content of an item.
    #[must_use]
    pub fn content(&self, path: &str) -> Option<&str> {
        self.items.get(path).map(String::as_str)
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn process_frontmatter(
        &mut self,
        path: &str,
        edit: &mut dyn FnMut(&mut Mapping),
    ) -> Result<bool> {
        if !is_markdown(path) {
            return Ok(false);
        }
        let Some(content) = self.items.get(path) else {
            return Ok(false);
        };

        if let Some(updated) = edit_content(path, content, edit)? {
            if self.fail_writes {
                return Err(ViewCountError::Io(std::io::Error::other(format!(
                    "injected write failure for {path}"
                ))));
            }
            self.items.insert(path.to_string(), updated);
        }
        Ok(true)
    }

    fn read_frontmatter(&self, path: &str) -> Result<Option<Mapping>> {
        if !is_markdown(path) {
            return Ok(None);
        }
        let Some(content) = self.items.get(path) else {
            return Ok(None);
        };
        let (props, _) =
            frontmatter::read_properties(content).map_err(|e| ViewCountError::metadata(path, e))?;
        Ok(Some(props))
    }

    fn list_items(&self) -> Result<Vec<String>> {
        Ok(self
            .items
            .keys()
            .filter(|path| is_markdown(path))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_count(store: &mut dyn MetadataStore, path: &str, count: u64) -> bool {
        store
            .process_frontmatter(path, &mut |props| {
                props.insert("view-count".into(), count.into());
            })
            .unwrap()
    }

    #[test]
    fn fs_store_edits_frontmatter_in_place() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("notes")).unwrap();
        fs::write(
            dir.path().join("notes").join("a.md"),
            "---\ntags: [x]\n---\n# A\n",
        )
        .unwrap();

        let mut store = FsMetadataStore::new(dir.path());
        assert!(set_count(&mut store, "notes/a.md", 4));

        let written = fs::read_to_string(dir.path().join("notes").join("a.md")).unwrap();
        assert!(written.contains("view-count: 4"));
        assert!(written.ends_with("# A\n"));
        assert_eq!(
            store.read_property("notes/a.md", "view-count").unwrap(),
            Some(Value::from(4))
        );
    }

    #[test]
    fn fs_store_skips_missing_and_non_markdown_items() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let mut store = FsMetadataStore::new(dir.path());
        assert!(!set_count(&mut store, "image.png", 1));
        assert!(!set_count(&mut store, "gone.md", 1));
        assert!(store.read_frontmatter("gone.md").unwrap().is_none());
    }

    #[test]
    fn fs_store_lists_markdown_outside_hidden_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".obsidian")).unwrap();
        fs::create_dir_all(root.join("projects")).unwrap();
        fs::write(root.join(".obsidian").join("hidden.md"), "").unwrap();
        fs::write(root.join("projects").join("b.md"), "").unwrap();
        fs::write(root.join("a.md"), "").unwrap();
        fs::write(root.join("c.txt"), "").unwrap();

        let store = FsMetadataStore::new(root);
        assert_eq!(store.list_items().unwrap(), vec!["a.md", "projects/b.md"]);
    }

    #[test]
    fn malformed_frontmatter_is_a_metadata_error() {
        let mut store = MemoryMetadataStore::new().with_item("bad.md", "---\ntags: [unclosed\n---\n");
        let err = store
            .process_frontmatter("bad.md", &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, ViewCountError::Metadata { .. }));
    }

    #[test]
    fn memory_store_round_trips_properties() {
        let mut store = MemoryMetadataStore::new()
            .with_item("a.md", "Body\n")
            .with_item("pic.png", "");
        assert!(set_count(&mut store, "a.md", 2));
        assert!(!set_count(&mut store, "pic.png", 2));
        assert_eq!(store.content("a.md"), Some("---\nview-count: 2\n---\nBody\n"));
        assert_eq!(store.list_items().unwrap(), vec!["a.md"]);
    }
}
