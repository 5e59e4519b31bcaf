//! Mirrors a computed counter into an item's frontmatter.

use serde_yaml::Value;

use viewcount_core::error::Result;

use crate::metadata::MetadataStore;

/// Writes and clears a single numeric frontmatter property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontmatterMirror {
    property: String,
}

impl FrontmatterMirror {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
        }
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Set the property to `count`.
    ///
    /// Returns `false` if the item cannot carry frontmatter.
    ///
    /// # Errors
    ///
    /// Propagates errors from the metadata store.
    pub fn write_count<M: MetadataStore + ?Sized>(
        &self,
        metadata: &mut M,
        path: &str,
        count: u64,
    ) -> Result<bool> {
        let key = Value::from(self.property.as_str());
        metadata.process_frontmatter(path, &mut |props| {
            props.insert(key.clone(), Value::from(count));
        })
    }

    /// Remove the property if present.
    ///
    /// # Errors
    ///
    /// Propagates errors from the metadata store.
    pub fn clear<M: MetadataStore + ?Sized>(&self, metadata: &mut M, path: &str) -> Result<bool> {
        let property = self.property.as_str();
        metadata.process_frontmatter(path, &mut |props| {
            props.remove(property);
        })
    }

    /// Read the mirrored value back as a count.
    ///
    /// Non-numeric or negative values read as `None`.
    ///
    /// # Errors
    ///
    /// Propagates errors from the metadata store.
    pub fn read_count<M: MetadataStore + ?Sized>(
        &self,
        metadata: &M,
        path: &str,
    ) -> Result<Option<u64>> {
        Ok(metadata
            .read_property(path, &self.property)?
            .and_then(|value| value.as_u64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemoryMetadataStore;

    #[test]
    fn write_then_read_count() {
        let mut metadata = MemoryMetadataStore::new().with_item("a.md", "# A\n");
        let mirror = FrontmatterMirror::new("opens");

        assert!(mirror.write_count(&mut metadata, "a.md", 9).unwrap());
        assert_eq!(mirror.read_count(&metadata, "a.md").unwrap(), Some(9));
        assert!(metadata.content("a.md").unwrap().contains("opens: 9"));
    }

    #[test]
    fn clear_removes_only_the_mirrored_property() {
        let mut metadata =
            MemoryMetadataStore::new().with_item("a.md", "---\nopens: 3\ntags: [x]\n---\n# A\n");
        let mirror = FrontmatterMirror::new("opens");

        assert!(mirror.clear(&mut metadata, "a.md").unwrap());
        assert_eq!(mirror.read_count(&metadata, "a.md").unwrap(), None);
        assert!(metadata.content("a.md").unwrap().contains("tags"));
    }

    #[test]
    fn non_numeric_values_do_not_read_as_counts() {
        let metadata =
            MemoryMetadataStore::new().with_item("a.md", "---\nopens: lots\n---\n");
        let mirror = FrontmatterMirror::new("opens");
        assert_eq!(mirror.read_count(&metadata, "a.md").unwrap(), None);
    }

    #[test]
    fn items_without_frontmatter_support_are_skipped() {
        let mut metadata = MemoryMetadataStore::new();
        let mirror = FrontmatterMirror::new("opens");
        assert!(!mirror.write_count(&mut metadata, "missing.md", 1).unwrap());
        assert!(!mirror.clear(&mut metadata, "missing.md").unwrap());
    }
}
