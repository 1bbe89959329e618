//! Ids the local identity has fully released as seller.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::error::{EscrowError, EscrowResult};
use crate::storage::store::KeyValueStore;

const COMPLETED_KEY: &str = "completed.ids";

/// Monotonic id set, persisted as a JSON array in its own store.
#[derive(Clone)]
pub struct CompletedIds {
    store: Arc<dyn KeyValueStore>,
    // Serializes read-modify-write of the stored array.
    write_lock: Arc<Mutex<()>>,
}

impl CompletedIds {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// All recorded ids, ascending.
    pub fn load(&self) -> EscrowResult<BTreeSet<u64>> {
        match self.store.get(COMPLETED_KEY)? {
            None => Ok(BTreeSet::new()),
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| EscrowError::Persistence(format!("Corrupt completed id set: {}", e))),
        }
    }

    pub fn contains(&self, id: u64) -> EscrowResult<bool> {
        Ok(self.load()?.contains(&id))
    }

    /// Record `id`. Returns false if it was already present.
    pub fn insert(&self, id: u64) -> EscrowResult<bool> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| EscrowError::Persistence("completed id lock poisoned".to_string()))?;

        let mut ids = self.load()?;
        if !ids.insert(id) {
            return Ok(false);
        }
        let raw = serde_json::to_string(&ids)
            .map_err(|e| EscrowError::Persistence(e.to_string()))?;
        self.store.put(COMPLETED_KEY, &raw)?;
        tracing::debug!(record_id = id, total = ids.len(), "Recorded completed escrow");
        Ok(true)
    }
}
