// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Session storage backends.

use parking_lot::Mutex;
use std::collections::HashMap;

use super::types::SessionRecord;

/// Storage for session records.
///
/// Every method is one critical section: `update` applies its closure and
/// `sweep` removes every matching record while holding the same lock, so
/// callers never observe a half-applied change. Implementations must not
/// call back into the store from inside the closures.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &str) -> Option<SessionRecord>;

    /// Insert or replace a record.
    fn set(&self, record: SessionRecord);

    fn delete(&self, id: &str) -> Option<SessionRecord>;

    /// Mutate a record in place. Returns `false` if the id is unknown.
    fn update(&self, id: &str, f: &mut dyn FnMut(&mut SessionRecord)) -> bool;

    /// Remove and return every record for which `expired` holds.
    fn sweep(&self, expired: &dyn Fn(&SessionRecord) -> bool) -> Vec<SessionRecord>;

    fn list(&self) -> Vec<SessionRecord>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process store, one mutex around a map.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, id: &str) -> Option<SessionRecord> {
        self.records.lock().get(id).cloned()
    }

    fn set(&self, record: SessionRecord) {
        self.records.lock().insert(record.id().to_string(), record);
    }

    fn delete(&self, id: &str) -> Option<SessionRecord> {
        self.records.lock().remove(id)
    }

    fn update(&self, id: &str, f: &mut dyn FnMut(&mut SessionRecord)) -> bool {
        match self.records.lock().get_mut(id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    fn sweep(&self, expired: &dyn Fn(&SessionRecord) -> bool) -> Vec<SessionRecord> {
        let mut records = self.records.lock();
        let ids: Vec<String> = records
            .iter()
            .filter(|(_, record)| expired(record))
            .map(|(id, _)| id.clone())
            .collect();

        ids.iter().filter_map(|id| records.remove(id)).collect()
    }

    fn list(&self) -> Vec<SessionRecord> {
        self.records.lock().values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }
}
