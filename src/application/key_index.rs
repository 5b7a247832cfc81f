use std::collections::HashMap;

use crate::domain::canonical::CanonicalRow;
use crate::domain::digest::RowDigest;
use crate::domain::value_objects::RowKey;

/// What the index remembers about one target row.
#[derive(Debug, Clone)]
pub struct KeyIndexEntry {
    pub digest: RowDigest,
    /// Kept only when the table is small enough to hold full rows.
    pub row: Option<CanonicalRow>,
}

/// RowKey → digest map of one side, consumed as the other side is matched
/// against it. Whatever is left at the end exists on the indexed side only.
#[derive(Debug, Default)]
pub struct KeyIndex {
    entries: HashMap<RowKey, KeyIndexEntry>,
    duplicates: u64,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. A key already present is counted as a duplicate and
    /// the first entry wins.
    pub fn insert(&mut self, key: RowKey, entry: KeyIndexEntry) {
        use std::collections::hash_map::Entry;
        match self.entries.entry(key) {
            Entry::Occupied(_) => self.duplicates += 1,
            Entry::Vacant(v) => {
                v.insert(entry);
            }
        }
    }

    pub fn take(&mut self, key: &RowKey) -> Option<KeyIndexEntry> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Remaining entries, sorted by key.
    pub fn into_remaining(self) -> Vec<(RowKey, KeyIndexEntry)> {
        let mut rest: Vec<_> = self.entries.into_iter().collect();
        rest.sort_by(|a, b| a.0.cmp(&b.0));
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: &str) -> RowKey {
        RowKey(vec![v.to_string()])
    }

    fn entry(b: u8) -> KeyIndexEntry {
        KeyIndexEntry {
            digest: RowDigest([b; 16]),
            row: None,
        }
    }

    #[test]
    fn duplicates_keep_first_entry() {
        let mut index = KeyIndex::new();
        index.insert(key("1"), entry(1));
        index.insert(key("1"), entry(2));
        assert_eq!(index.len(), 1);
        assert_eq!(index.duplicates(), 1);
        assert_eq!(index.take(&key("1")).map(|e| e.digest), Some(RowDigest([1; 16])));
        assert!(index.is_empty());
    }

    #[test]
    fn remaining_entries_are_sorted() {
        let mut index = KeyIndex::new();
        for k in ["c", "a", "b"] {
            index.insert(key(k), entry(0));
        }
        index.take(&key("b"));
        let keys: Vec<RowKey> = index.into_remaining().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![key("a"), key("c")]);
    }
}
