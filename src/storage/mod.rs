//! Byte storage for uploaded documents.
//!
//! The engine reads, writes and deletes whole blobs by key. Where the bytes
//! physically live (local disk, a cloud bucket) is the implementor's
//! business; `write` must be durable when it returns `Ok`.

pub mod local;
pub mod memory;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::auth::token;
use crate::config::Config;
use crate::errors::AppError;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

#[derive(Debug)]
pub enum StorageError {
    NotFound(String),
    InvalidKey(String),
    Timeout(Duration),
    Io(std::io::Error),
    /// Failure injected by a test double.
    Injected(String),
    Exhausted { attempts: u32, last: String },
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Timeout(_) | StorageError::Io(_) | StorageError::Injected(_)
        )
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(key) => write!(f, "blob not found: {key}"),
            StorageError::InvalidKey(key) => write!(f, "invalid blob key: {key:?}"),
            StorageError::Timeout(after) => write!(f, "timed out after {}ms", after.as_millis()),
            StorageError::Io(e) => write!(f, "I/O error: {e}"),
            StorageError::Injected(msg) => write!(f, "injected failure: {msg}"),
            StorageError::Exhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

pub trait BlobStore: Send + Sync {
    /// Read the whole blob. A missing key is `StorageError::NotFound`.
    fn read(&self, key: &str) -> impl Future<Output = Result<Vec<u8>, StorageError>> + Send;

    /// Replace the blob under `key`. Must be durable once it returns `Ok`.
    fn write(&self, key: &str, bytes: &[u8]) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Remove the blob under `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Fresh storage key for an uploaded document.
pub fn new_binary_ref() -> Result<String, AppError> {
    Ok(format!("doc_{}.pdf", token::random_hex(16)?))
}

/// Timeout and bounded-retry settings for storage calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        RetryPolicy {
            attempts: config.storage_attempts.max(1),
            timeout: config.storage_timeout,
            backoff: config.retry_backoff,
        }
    }
}

/// Run `op` under the policy's timeout, retrying retryable failures with
/// doubling backoff. Non-retryable errors are returned immediately; running
/// out of attempts yields `StorageError::Exhausted`.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut delay = policy.backoff;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(policy.timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.attempts => {
                log::warn!("{what} failed (attempt {attempt}/{}): {e}", policy.attempts);
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) if e.is_retryable() => {
                log::error!("{what} failed permanently after {attempt} attempts: {e}");
                return Err(StorageError::Exhausted {
                    attempts: attempt,
                    last: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
}
