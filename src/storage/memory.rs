use super::{Batch, StorageBackend, StorageError};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// In-memory storage backend.
///
/// The whole map sits behind one `RwLock`. Writers take it exclusively for
/// the full check-then-mutate sequence; `get` takes the shared side since it
/// never mutates. Data is volatile and lost on shutdown.
pub struct MemoryStorage {
    data: RwLock<HashMap<String, Value>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

fn ensure_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        warn!("{}", StorageError::KeyEmpty);
        return Err(StorageError::KeyEmpty);
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Value, StorageError> {
        ensure_key(key)?;
        debug!(key, "get store access");

        let data = self.data.read();
        if data.is_empty() {
            return Err(StorageError::StoreEmpty);
        }

        data.get(key).cloned().ok_or(StorageError::KeyNotFound)
    }

    async fn put(&self, batch: Batch) -> Result<(), StorageError> {
        // Reject before taking the lock so a bad batch never touches the map.
        for key in batch.keys() {
            ensure_key(key)?;
        }

        let mut data = self.data.write();
        for (key, value) in batch {
            debug!(key = %key, value = %value, "added to store");
            data.insert(key, value);
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        ensure_key(key)?;
        debug!(key, "delete store access");

        let mut data = self.data.write();
        if data.is_empty() {
            return Err(StorageError::StoreEmpty);
        }

        data.remove(key).map(|_| ()).ok_or(StorageError::KeyNotFound)
    }

    async fn keys_count(&self) -> usize {
        self.data.read().len()
    }
}
