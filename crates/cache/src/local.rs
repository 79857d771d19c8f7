//! In-process storage backed by DashMap. Used in tests and for throwaway
//! wizard sessions that must not touch disk.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tenant_core::TenantResult;

use crate::storage::SelectionStorage;

#[derive(Clone, Default)]
pub struct MemoryStorage {
    store: Arc<DashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw access for seeding and inspecting stored blobs.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.store.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[async_trait]
impl SelectionStorage for MemoryStorage {
    async fn get(&self, key: &str) -> TenantResult<Option<String>> {
        Ok(self.store.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: String) -> TenantResult<()> {
        self.store.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> TenantResult<()> {
        self.store.remove(key);
        Ok(())
    }
}
