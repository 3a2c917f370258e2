//! Snapshot tracking for objects registered in a patch set.
//!
//! Each entry keeps a deep copy taken at registration time next to the
//! caller's live handle. Snapshots are never mutated; live handles are only
//! read.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use patchset_core::{Resource, Shared, Uid};

use crate::diff::{self, ObjectDiff};

/// A registered object: its original snapshot and the caller's live handle.
#[derive(Debug)]
pub struct TrackedEntry<T> {
    snapshot: T,
    live: Shared<T>,
}

impl<T: Resource> TrackedEntry<T> {
    pub fn snapshot(&self) -> &T {
        &self.snapshot
    }

    pub fn live(&self) -> &Shared<T> {
        &self.live
    }

    /// Diff the live object's current state against the snapshot.
    pub fn diff(&self) -> Result<ObjectDiff, serde_json::Error> {
        let live = self.live.read();
        diff::diff_object(&self.snapshot, &*live)
    }

    /// Whether the live object carries a deletion marker right now.
    pub fn is_deleting(&self) -> bool {
        self.live.read().meta().is_deleting()
    }
}

/// Identity → tracked entry. First registration wins.
#[derive(Debug)]
pub struct Tracker<T> {
    entries: HashMap<Uid, TrackedEntry<T>>,
}

impl<T> Default for Tracker<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: Resource> Tracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `object` under `uid` unless `uid` is already tracked.
    ///
    /// Returns `false` (and leaves the existing entry untouched) for a
    /// duplicate identity.
    pub fn add(&mut self, uid: Uid, object: Shared<T>) -> bool {
        match self.entries.entry(uid) {
            Entry::Occupied(slot) => {
                tracing::debug!(uid = %slot.key(), "identity already tracked; keeping first registration");
                false
            }
            Entry::Vacant(slot) => {
                let snapshot = object.read().clone();
                slot.insert(TrackedEntry {
                    snapshot,
                    live: object,
                });
                true
            }
        }
    }

    /// Live handles by identity. Snapshots are not exposed here.
    pub fn entries(&self) -> HashMap<Uid, Shared<T>> {
        self.entries
            .iter()
            .map(|(uid, entry)| (uid.clone(), entry.live.clone()))
            .collect()
    }

    pub fn snapshot_of(&self, uid: &Uid) -> Option<&T> {
        self.entries.get(uid).map(|e| &e.snapshot)
    }

    pub fn get(&self, uid: &Uid) -> Option<&TrackedEntry<T>> {
        self.entries.get(uid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uid, &TrackedEntry<T>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
