use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};

use crate::store::{CasStore, StoreError, StoreResult};

// ============================================================================
// In-Memory Linearizable KV Storage - Per-Key Atomicity Based on DashMap
// ============================================================================

/// In-memory integer KV store; every operation on a key is atomic.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct KvStore {
    store: Arc<DashMap<String, i64>>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.store.get(key).map(|v| *v.value())
    }

    /// Insert or update key-value pair, returning the previous value
    pub fn insert(&self, key: String, value: i64) -> Option<i64> {
        self.store.insert(key, value)
    }

    /// Atomically swap `key` from `expected` to `new` in a single entry operation.
    pub fn swap(
        &self,
        key: &str,
        expected: i64,
        new: i64,
        create_if_missing: bool,
    ) -> StoreResult<()> {
        match self.store.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let current = *entry.get();
                if current != expected {
                    return Err(StoreError::PreconditionFailed {
                        key: key.to_string(),
                        expected,
                        actual: Some(current),
                    });
                }
                *entry.get_mut() = new;
                Ok(())
            }
            Entry::Vacant(entry) => {
                if !create_if_missing {
                    return Err(StoreError::KeyNotFound(key.to_string()));
                }
                entry.insert(new);
                Ok(())
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Get all key-value pairs as a BTreeMap
    pub fn all(&self) -> std::collections::BTreeMap<String, i64> {
        self.store
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

#[async_trait]
impl CasStore for KvStore {
    async fn read(&self, key: &str) -> StoreResult<Option<i64>> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, value: i64) -> StoreResult<()> {
        self.insert(key.to_string(), value);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: i64,
        new: i64,
        create_if_missing: bool,
    ) -> StoreResult<()> {
        self.swap(key, expected, new, create_if_missing)
    }
}
