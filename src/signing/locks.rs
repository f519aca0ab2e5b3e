use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per document id, created on demand and dropped once
/// nobody holds or waits on it.
#[derive(Debug, Default)]
pub struct DocumentLocks {
    slots: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of a state-changing operation on one document.
pub struct DocumentGuard<'a> {
    locks: &'a DocumentLocks,
    document_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, document_id: i64) -> DocumentGuard<'_> {
        let slot = self.slots().entry(document_id).or_default().clone();
        let guard = slot.lock_owned().await;
        DocumentGuard {
            locks: self,
            document_id,
            guard: Some(guard),
        }
    }

    /// Number of documents with a live lock slot.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<i64, Arc<AsyncMutex<()>>>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for DocumentGuard<'_> {
    fn drop(&mut self) {
        // Release first so our own Arc no longer counts.
        self.guard.take();
        let mut slots = self.locks.slots();
        if let Some(slot) = slots.get(&self.document_id) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.document_id);
            }
        }
    }
}
