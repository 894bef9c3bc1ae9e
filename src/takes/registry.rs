//! Thread-safe id -> metadata store for the takes of one device.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::models::{TakeId, TakeMetadata};

/// Ids are allocated from an atomic counter and never reused, even after
/// [`remove_all`](Self::remove_all).
#[derive(Default)]
pub struct TakeRegistry {
    next_id: AtomicU32,
    takes: Mutex<HashMap<TakeId, TakeMetadata>>,
}

impl TakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TakeId, TakeMetadata>> {
        self.takes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `metadata` under a freshly allocated id.
    pub fn add(&self, metadata: TakeMetadata) -> TakeId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, metadata);
        id
    }

    /// Returns false if `id` was not present.
    pub fn remove(&self, id: TakeId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn remove_all(&self) {
        self.lock().clear();
    }

    /// Replace the metadata of an existing take. Returns false if `id` is absent.
    pub fn update(&self, id: TakeId, metadata: TakeMetadata) -> bool {
        match self.lock().get_mut(&id) {
            Some(slot) => {
                *slot = metadata;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: TakeId) -> Option<TakeMetadata> {
        self.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: TakeId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Snapshot of the current ids, ascending.
    pub fn list_ids(&self) -> Vec<TakeId> {
        let mut ids: Vec<TakeId> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Snapshot of all entries, ascending by id.
    pub fn entries(&self) -> Vec<(TakeId, TakeMetadata)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, metadata)| (*id, metadata.clone()))
            .collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
