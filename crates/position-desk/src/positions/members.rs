use serde::Serialize;

use super::domain::{Member, MemberId};

/// Synchronizer-local identity of a collection entry.
///
/// Stays stable while the entry's server identifier is still unassigned and after it
/// is patched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntryKey(pub(crate) u64);

impl EntryKey {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry<T> {
    pub key: EntryKey,
    pub record: T,
}

/// Insertion-ordered dependent collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberList<T> {
    entries: Vec<Entry<T>>,
}

impl<T> Default for MemberList<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Member> MemberList<T> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry<T>> {
        self.entries.iter()
    }

    pub fn records(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|entry| &entry.record)
    }

    pub fn get(&self, key: EntryKey) -> Option<&T> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.record)
    }

    /// Key of the first entry carrying the given server identifier.
    pub fn key_of(&self, id: MemberId) -> Option<EntryKey> {
        self.entries
            .iter()
            .find(|entry| id.is_assigned() && entry.record.id() == id)
            .map(|entry| entry.key)
    }

    pub(crate) fn push(&mut self, key: EntryKey, record: T) {
        self.entries.push(Entry { key, record });
    }

    /// Detach an entry, returning it with the index it occupied.
    pub(crate) fn remove(&mut self, key: EntryKey) -> Option<(usize, Entry<T>)> {
        let index = self.entries.iter().position(|entry| entry.key == key)?;
        Some((index, self.entries.remove(index)))
    }

    /// Put a detached entry back, as close to its old index as the list allows.
    pub(crate) fn restore(&mut self, index: usize, entry: Entry<T>) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
    }

    /// Patch the server identifier of an entry; false when the entry is gone.
    pub(crate) fn assign_id(&mut self, key: EntryKey, id: MemberId) -> bool {
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                entry.record.set_id(id);
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn to_records(&self) -> Vec<T> {
        self.records().cloned().collect()
    }
}
