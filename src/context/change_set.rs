// src/context/change_set.rs
//
// Change tracking for the SQLite data context
//
// Entries are keyed by (collection, encoded key). Every staging operation
// bumps a sequence number so pending changes flush in the order they were
// staged, and so a flush only accepts entries that were not restaged while
// it ran.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Added,
    Modified,
    Deleted,
    Unchanged,
}

#[derive(Debug, Clone)]
struct Entry {
    state: EntryState,
    body: serde_json::Value,
    sequence: u64,
}

/// A staged change waiting for the next flush.
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub collection: &'static str,
    pub key: String,
    pub state: EntryState,
    pub body: serde_json::Value,
    sequence: u64,
}

#[derive(Debug, Default)]
pub struct ChangeSet {
    entries: HashMap<(&'static str, String), Entry>,
    next_sequence: u64,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an entity loaded from the store. An entity that is already
    /// tracked keeps its current state and body.
    pub fn attach(&mut self, collection: &'static str, key: String, body: serde_json::Value) {
        let sequence = self.bump();
        self.entries.entry((collection, key)).or_insert(Entry {
            state: EntryState::Unchanged,
            body,
            sequence,
        });
    }

    pub fn stage_added(&mut self, collection: &'static str, key: String, body: serde_json::Value) {
        let state = match self.state(collection, &key) {
            // Re-adding a row staged for removal overwrites it instead.
            Some(EntryState::Deleted) => EntryState::Modified,
            _ => EntryState::Added,
        };
        self.put(collection, key, state, body);
    }

    pub fn stage_modified(&mut self, collection: &'static str, key: String, body: serde_json::Value) {
        let state = match self.state(collection, &key) {
            Some(EntryState::Added) => EntryState::Added,
            _ => EntryState::Modified,
        };
        self.put(collection, key, state, body);
    }

    pub fn stage_deleted(&mut self, collection: &'static str, key: String, body: serde_json::Value) {
        match self.state(collection, &key) {
            // Never persisted, so there is nothing to remove from the store.
            Some(EntryState::Added) => {
                self.entries.remove(&(collection, key));
            }
            _ => self.put(collection, key, EntryState::Deleted, body),
        }
    }

    pub fn state(&self, collection: &'static str, key: &str) -> Option<EntryState> {
        self.entries
            .get(&(collection, key.to_string()))
            .map(|entry| entry.state)
    }

    pub fn contains(&self, collection: &'static str, key: &str) -> bool {
        self.state(collection, key).is_some()
    }

    /// Locally known body for a key, if tracked and not staged for removal.
    pub fn local_body(&self, collection: &'static str, key: &str) -> Option<serde_json::Value> {
        self.entries
            .get(&(collection, key.to_string()))
            .filter(|entry| entry.state != EntryState::Deleted)
            .map(|entry| entry.body.clone())
    }

    /// All non-unchanged entries, in staging order.
    pub fn pending(&self) -> Vec<PendingChange> {
        let mut pending: Vec<PendingChange> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.state != EntryState::Unchanged)
            .map(|((collection, key), entry)| PendingChange {
                collection: *collection,
                key: key.clone(),
                state: entry.state,
                body: entry.body.clone(),
                sequence: entry.sequence,
            })
            .collect();
        pending.sort_by_key(|change| change.sequence);
        pending
    }

    /// Mark flushed changes as persisted.
    pub fn accept(&mut self, flushed: &[PendingChange]) {
        for change in flushed {
            let id = (change.collection, change.key.clone());
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            if entry.sequence != change.sequence {
                continue;
            }
            if entry.state == EntryState::Deleted {
                self.entries.remove(&id);
            } else {
                entry.state = EntryState::Unchanged;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn put(&mut self, collection: &'static str, key: String, state: EntryState, body: serde_json::Value) {
        let sequence = self.bump();
        self.entries.insert((collection, key), Entry { state, body, sequence });
    }

    fn bump(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }
}
