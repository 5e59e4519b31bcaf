//! The canonical entry set.

use tracing::warn;

use viewcount_core::CounterEntry;

/// Entries keyed by path, in insertion order.
///
/// Paths are unique: every construction site goes through
/// [`EntrySet::from_entries`] or [`EntrySet::get_or_insert`], and
/// [`EntrySet::rename`] replaces rather than duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntrySet {
    entries: Vec<CounterEntry>,
}

impl EntrySet {
    /// Build from a loaded snapshot, keeping the first entry for any
    /// duplicated path.
    #[must_use]
    pub fn from_entries(entries: Vec<CounterEntry>) -> Self {
        let mut set = Self {
            entries: Vec::with_capacity(entries.len()),
        };
        for entry in entries {
            if set.contains(&entry.path) {
                warn!(path = %entry.path, "dropping duplicate counter entry");
                continue;
            }
            set.entries.push(entry);
        }
        set
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.path == path)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.position(path).is_some()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&CounterEntry> {
        self.entries.iter().find(|entry| entry.path == path)
    }

    /// The entry for `path`, creating a zeroed one if absent.
    ///
    /// The flag is `true` when the entry was created by this call.
    pub fn get_or_insert(&mut self, path: &str) -> (&mut CounterEntry, bool) {
        match self.position(path) {
            Some(i) => (&mut self.entries[i], false),
            None => {
                self.entries.push(CounterEntry::new(path));
                let last = self.entries.len() - 1;
                (&mut self.entries[last], true)
            }
        }
    }

    /// Move the entry at `old_path` to `new_path`, keeping its position.
    ///
    /// A stale entry already at `new_path` is discarded. Returns `false` if
    /// `old_path` is not tracked.
    pub fn rename(&mut self, old_path: &str, new_path: &str) -> bool {
        if old_path == new_path {
            return self.contains(old_path);
        }
        let Some(i) = self.position(old_path) else {
            return false;
        };
        self.entries[i].path = new_path.to_string();
        if let Some(stale) = self
            .entries
            .iter()
            .enumerate()
            .position(|(j, entry)| j != i && entry.path == new_path)
        {
            warn!(path = new_path, "replacing stale entry at rename target");
            self.entries.remove(stale);
        }
        true
    }

    /// Remove and return the entry for `path`.
    pub fn remove(&mut self, path: &str) -> Option<CounterEntry> {
        self.position(path).map(|i| self.entries.remove(i))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CounterEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[CounterEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a EntrySet {
    type Item = &'a CounterEntry;
    type IntoIter = std::slice::Iter<'a, CounterEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(set: &EntrySet) -> Vec<&str> {
        set.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn get_or_insert_creates_once() {
        let mut set = EntrySet::default();
        let (_, created) = set.get_or_insert("a.md");
        assert!(created);
        let (entry, created) = set.get_or_insert("a.md");
        assert!(!created);
        entry.total_times_opened = 4;
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a.md").unwrap().total_times_opened, 4);
    }

    #[test]
    fn duplicates_in_snapshot_keep_first() {
        let mut first = CounterEntry::new("a.md");
        first.total_times_opened = 1;
        let mut second = CounterEntry::new("a.md");
        second.total_times_opened = 2;

        let set = EntrySet::from_entries(vec![first, CounterEntry::new("b.md"), second]);
        assert_eq!(paths(&set), vec!["a.md", "b.md"]);
        assert_eq!(set.get("a.md").unwrap().total_times_opened, 1);
    }

    #[test]
    fn rename_keeps_position() {
        let mut set = EntrySet::from_entries(vec![
            CounterEntry::new("a.md"),
            CounterEntry::new("b.md"),
            CounterEntry::new("c.md"),
        ]);
        assert!(set.rename("b.md", "z.md"));
        assert_eq!(paths(&set), vec!["a.md", "z.md", "c.md"]);
        assert!(!set.rename("missing.md", "y.md"));
    }

    #[test]
    fn rename_onto_tracked_path_discards_stale_entry() {
        let mut moved = CounterEntry::new("a.md");
        moved.total_times_opened = 9;
        let mut set = EntrySet::from_entries(vec![moved, CounterEntry::new("b.md")]);

        assert!(set.rename("a.md", "b.md"));
        assert_eq!(paths(&set), vec!["b.md"]);
        assert_eq!(set.get("b.md").unwrap().total_times_opened, 9);
    }

    #[test]
    fn remove_returns_entry() {
        let mut set = EntrySet::from_entries(vec![CounterEntry::new("a.md")]);
        assert!(set.remove("a.md").is_some());
        assert!(set.remove("a.md").is_none());
        assert!(set.is_empty());
    }
}
