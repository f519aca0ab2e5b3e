use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::{BlobStore, StorageError};

/// In-process blob store with failure and latency injection.
///
/// Clones share the same blobs, like two processes mounting one bucket.
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    failing_writes: AtomicU32,
    failing_reads: AtomicU32,
    write_delay: Mutex<Option<Duration>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail with a retryable error.
    pub fn fail_next_writes(&self, n: u32) {
        self.inner.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` reads fail with a retryable error.
    pub fn fail_next_reads(&self, n: u32) {
        self.inner.failing_reads.store(n, Ordering::SeqCst);
    }

    /// Delay every subsequent write, e.g. to trip the storage timeout.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *lock(&self.inner.write_delay) = delay;
    }

    /// Current bytes under `key`, bypassing injection.
    pub fn snapshot(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.inner.blobs).get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.inner.blobs).remove(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.blobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl BlobStore for MemoryBlobStore {
    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        if take_one(&self.inner.failing_reads) {
            return Err(StorageError::Injected(format!("read {key}")));
        }
        lock(&self.inner.blobs)
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let delay = *lock(&self.inner.write_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if take_one(&self.inner.failing_writes) {
            return Err(StorageError::Injected(format!("write {key}")));
        }
        lock(&self.inner.blobs).insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.inner.blobs).remove(key);
        Ok(())
    }
}
