use async_trait::async_trait;
use serde_json::{Map, Value};

/// A set of key/value pairs written by one POST.
pub type Batch = Map<String, Value>;

/// Trait for the key/value engine shared by all adapters.
///
/// Implementations own their mapping outright and serialize access
/// internally. No method may suspend while holding that internal lock.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Look up a single key.
    ///
    /// Fails with [`StorageError::StoreEmpty`] when nothing is stored at all,
    /// even if the key would otherwise be missing.
    async fn get(&self, key: &str) -> Result<Value, StorageError>;

    /// Write every pair of `batch`.
    ///
    /// All keys are validated first; a single empty key rejects the whole
    /// batch and nothing is written.
    async fn put(&self, batch: Batch) -> Result<(), StorageError>;

    /// Remove a key. Same preconditions as [`StorageBackend::get`].
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Number of stored keys.
    async fn keys_count(&self) -> usize;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("key cannot be empty")]
    KeyEmpty,
    #[error("store is empty")]
    StoreEmpty,
    #[error("key not found in store")]
    KeyNotFound,
}
