//! Wizard state store: persists the in-progress selection under one key so
//! a restart does not lose progress.
//!
//! Writes are debounced: every `save` replaces the pending selection and
//! re-arms a timer, and only the latest selection is written when it fires.
//! The timer runs on the Tokio runtime the store was created in, so `save`
//! may be called from any thread. Without a runtime the selection stays
//! pending until the next `flush`.
//! Reads fail closed: a missing, unreadable or malformed blob is a cache
//! miss, never an error.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenant_core::{TenantResult, WizardSelection};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::storage::SelectionStorage;

/// Bumped whenever the persisted shape changes; older blobs are ignored.
const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSelection {
    version: u32,
    saved_at: DateTime<Utc>,
    selection: WizardSelection,
}

pub struct WizardStateStore {
    inner: Arc<Inner>,
    debounce: Duration,
    runtime: Option<Handle>,
}

struct Inner {
    storage: Arc<dyn SelectionStorage>,
    key: String,
    generation: AtomicU64,
    pending: Mutex<Option<WizardSelection>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl WizardStateStore {
    pub fn new(storage: Arc<dyn SelectionStorage>, key: impl Into<String>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                key: key.into(),
                generation: AtomicU64::new(0),
                pending: Mutex::new(None),
                write_lock: tokio::sync::Mutex::new(()),
            }),
            debounce,
            runtime: Handle::try_current().ok(),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Schedule a debounced write of `selection`.
    pub fn save(&self, selection: &WizardSelection) {
        *self.inner.pending.lock() = Some(selection.clone());
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            debug!(key = %self.inner.key, "No runtime for debounced write, selection held until flush");
            return;
        };
        let inner = Arc::clone(&self.inner);
        let debounce = self.debounce;
        runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            let _guard = inner.write_lock.lock().await;
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let Some(selection) = inner.pending.lock().take() else {
                return;
            };
            if let Err(e) = inner.write(&selection).await {
                warn!(key = %inner.key, error = %e, "Debounced wizard state write failed");
            }
        });
    }

    /// Write `selection` immediately, cancelling any pending debounced write.
    pub async fn save_now(&self, selection: &WizardSelection) -> TenantResult<()> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let _guard = self.inner.write_lock.lock().await;
        self.inner.pending.lock().take();
        self.inner.write(selection).await
    }

    /// Write the pending selection now, if there is one.
    pub async fn flush(&self) -> TenantResult<()> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let _guard = self.inner.write_lock.lock().await;
        let pending = self.inner.pending.lock().take();
        match pending {
            Some(selection) => self.inner.write(&selection).await,
            None => Ok(()),
        }
    }

    pub fn has_pending(&self) -> bool {
        self.inner.pending.lock().is_some()
    }

    /// Read the persisted selection. `None` when absent or unusable.
    pub async fn load(&self) -> Option<WizardSelection> {
        let raw = match self.inner.storage.get(&self.inner.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                metrics::counter!("wizard.store.miss").increment(1);
                return None;
            }
            Err(e) => {
                warn!(key = %self.inner.key, error = %e, "Wizard state unreadable, using defaults");
                metrics::counter!("wizard.store.error").increment(1);
                return None;
            }
        };

        match serde_json::from_str::<PersistedSelection>(&raw) {
            Ok(persisted) if persisted.version == STATE_VERSION => {
                metrics::counter!("wizard.store.hit").increment(1);
                debug!(key = %self.inner.key, saved_at = %persisted.saved_at, "Wizard state restored");
                Some(persisted.selection)
            }
            Ok(persisted) => {
                warn!(
                    key = %self.inner.key,
                    version = persisted.version,
                    "Wizard state from another version, ignoring"
                );
                metrics::counter!("wizard.store.corrupt").increment(1);
                None
            }
            Err(e) => {
                warn!(key = %self.inner.key, error = %e, "Wizard state malformed, ignoring");
                metrics::counter!("wizard.store.corrupt").increment(1);
                None
            }
        }
    }

    /// Drop any pending write and delete the persisted selection.
    pub async fn clear(&self) -> TenantResult<()> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let _guard = self.inner.write_lock.lock().await;
        self.inner.pending.lock().take();
        self.inner.storage.remove(&self.inner.key).await?;
        debug!(key = %self.inner.key, "Wizard state cleared");
        Ok(())
    }
}

impl Inner {
    async fn write(&self, selection: &WizardSelection) -> TenantResult<()> {
        let persisted = PersistedSelection {
            version: STATE_VERSION,
            saved_at: Utc::now(),
            selection: selection.clone(),
        };
        let json = serde_json::to_string(&persisted)?;
        self.storage.set(&self.key, json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryStorage;
    use tenant_core::{AddonScope, BillingCycle, Branch, SelectedAddonAssignment};

    const KEY: &str = "tenant-admin:assign-plan:test";

    fn selection(branches: u32) -> WizardSelection {
        WizardSelection {
            plan_id: Some("growth".into()),
            billing_cycle: BillingCycle::Yearly,
            branch_count: branches,
            branches: (0..branches)
                .map(|index| Branch {
                    index,
                    name: format!("Site {index}"),
                    is_included: index < 2,
                })
                .collect(),
            addons: vec![SelectedAddonAssignment {
                addon_id: "online_ordering".into(),
                name: "Online Ordering".into(),
                scope: AddonScope::Branch,
                feature_level: Some("advanced".into()),
                quantity: 2,
                branch_index: Some(0),
                unit_price: 29.0,
            }],
        }
    }

    fn store(storage: &MemoryStorage, debounce_ms: u64) -> WizardStateStore {
        WizardStateStore::new(
            Arc::new(storage.clone()),
            KEY,
            Duration::from_millis(debounce_ms),
        )
    }

    #[tokio::test]
    async fn test_save_now_then_load_round_trips() {
        let storage = MemoryStorage::new();
        let store = store(&storage, 10);
        let original = selection(3);

        store.save_now(&original).await.unwrap();
        assert_eq!(store.load().await, Some(original));
    }

    #[tokio::test]
    async fn test_load_missing_or_corrupt_is_none() {
        let storage = MemoryStorage::new();
        let store = store(&storage, 10);
        assert!(store.load().await.is_none());

        storage.insert_raw(KEY, "{not json");
        assert!(store.load().await.is_none());

        storage.insert_raw(KEY, r#"{"version": 1, "saved_at": "2024-01-01T00:00:00Z", "selection": {"plan_id": 7}}"#);
        assert!(store.load().await.is_none());

        let future = serde_json::json!({
            "version": 99,
            "saved_at": "2024-01-01T00:00:00Z",
            "selection": selection(1),
        });
        storage.insert_raw(KEY, future.to_string());
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_debounced_save_keeps_latest() {
        let storage = MemoryStorage::new();
        let store = store(&storage, 20);

        store.save(&selection(1));
        store.save(&selection(2));
        store.save(&selection(3));
        assert!(store.has_pending());
        assert!(!storage.contains(KEY));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!store.has_pending());
        assert_eq!(store.load().await.unwrap().branch_count, 3);
    }

    #[tokio::test]
    async fn test_flush_writes_pending_immediately() {
        let storage = MemoryStorage::new();
        let store = store(&storage, 10_000);

        store.save(&selection(4));
        store.flush().await.unwrap();
        assert_eq!(store.load().await.unwrap().branch_count, 4);
        store.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_cancels_pending_write() {
        let storage = MemoryStorage::new();
        let store = store(&storage, 20);

        store.save_now(&selection(1)).await.unwrap();
        store.save(&selection(2));
        store.clear().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!storage.contains(KEY));
        assert!(store.load().await.is_none());
    }

    #[test]
    fn test_save_outside_runtime_is_held_until_flush() {
        let storage = MemoryStorage::new();
        let store = store(&storage, 10);

        store.save(&selection(2));
        assert!(store.has_pending());
        assert!(!storage.contains(KEY));

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(store.flush()).unwrap();
        assert!(!store.has_pending());
        assert_eq!(runtime.block_on(store.load()).unwrap().branch_count, 2);
    }

    #[test]
    fn test_save_from_plain_thread_uses_creating_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let storage = MemoryStorage::new();
        let store = runtime.block_on(async { store(&storage, 10) });

        std::thread::scope(|scope| {
            scope.spawn(|| store.save(&selection(3)));
        });
        runtime.block_on(async { tokio::time::sleep(Duration::from_millis(150)).await });
        assert!(!store.has_pending());
        assert_eq!(runtime.block_on(store.load()).unwrap().branch_count, 3);
    }
}
