use super::job::UnitId;
use bytes::Bytes;
use std::collections::HashMap;

/// Original input bytes keyed by unit id.
///
/// Owned by the controller, which is the only writer; the dispatcher reads
/// from it to build jobs. Cloning a payload only bumps a reference count.
#[derive(Debug, Default)]
pub struct PayloadCache {
    entries: HashMap<UnitId, Bytes>,
}

impl PayloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: UnitId, payload: Bytes) {
        self.entries.insert(id, payload);
    }

    pub fn get(&self, id: &UnitId) -> Option<Bytes> {
        self.entries.get(id).cloned()
    }

    pub fn remove(&mut self, id: &UnitId) -> Option<Bytes> {
        self.entries.remove(id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
