use std::collections::HashMap;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::KeyValueStore;
use crate::enums::DataSource;
use crate::error::Result;

pub mod state;

pub use state::{ AppliedPoll, DashboardState, PERSISTED_KEYS };

/// Owns the dashboard state and writes it through to a key-value backend.
///
/// The in-memory state is authoritative. A failed write is logged and flips the store
/// into degraded mode until the next successful write.
pub struct StateStore {
    state: Mutex<DashboardState>,
    backend: Arc<dyn KeyValueStore>,
    degraded: AtomicBool,
}

impl StateStore {
    /// Loads persisted state, falling back to defaults for anything missing or unreadable.
    pub async fn load(backend: Arc<dyn KeyValueStore>, default_source: DataSource) -> Self {
        let mut docs = HashMap::new();
        let mut degraded = false;

        for key in PERSISTED_KEYS {
            match backend.get(key).await {
                Ok(Some(value)) => {
                    docs.insert(key.to_string(), value);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(key, backend = backend.backend(), error = %e, "Failed to load state");
                    degraded = true;
                }
            }
        }

        let state = DashboardState::from_persisted(&docs, default_source);
        tracing::info!(
            backend = backend.backend(),
            entities = state.entities.len(),
            rules = state.rules.values().map(Vec::len).sum::<usize>(),
            source = %state.data_source,
            "State loaded"
        );

        Self {
            state: Mutex::new(state),
            backend,
            degraded: AtomicBool::new(degraded),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub async fn snapshot(&self) -> DashboardState {
        self.state.lock().await.clone()
    }

    pub async fn read<R>(&self, f: impl FnOnce(&DashboardState) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }

    /// Applies `f` and persists the result while still holding the lock, so writes reach
    /// the backend in the order they were made. Nothing is written when `f` fails.
    pub async fn mutate<R>(&self, f: impl FnOnce(&mut DashboardState) -> Result<R>) -> Result<R> {
        let mut state = self.state.lock().await;
        let output = f(&mut state)?;
        self.persist(&state).await;
        Ok(output)
    }

    async fn persist(&self, state: &DashboardState) {
        let docs = match state.to_persisted() {
            Ok(docs) => docs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize state");
                self.degraded.store(true, Ordering::Relaxed);
                return;
            }
        };

        let mut failed = false;
        for (key, value) in docs {
            if let Err(e) = self.backend.put(key, value).await {
                tracing::error!(key, backend = self.backend.backend(), error = %e, "Failed to persist state");
                failed = true;
            }
        }

        let was_degraded = self.degraded.swap(failed, Ordering::Relaxed);
        if was_degraded && !failed {
            tracing::info!(backend = self.backend.backend(), "Persistence recovered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryKeyValueStore;
    use crate::error::AppError;
    use crate::models::TrackedEntity;
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        fn backend(&self) -> &'static str {
            "broken"
        }

        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(AppError::Storage("disk on fire".to_string()))
        }

        async fn put(&self, _key: &str, _value: String) -> Result<()> {
            Err(AppError::Storage("disk on fire".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Err(AppError::Storage("disk on fire".to_string()))
        }
    }

    fn bitcoin() -> TrackedEntity {
        TrackedEntity::coin("bitcoin", "btc", "Bitcoin", None, 1).unwrap()
    }

    #[tokio::test]
    async fn test_mutations_are_written_through() {
        let backend = Arc::new(MemoryKeyValueStore::new());
        let store = StateStore::load(backend.clone(), DataSource::CoinGecko).await;
        store.mutate(|s| s.add_entity(bitcoin())).await.unwrap();

        let reloaded = StateStore::load(backend, DataSource::Binance).await;
        let state = reloaded.snapshot().await;
        assert_eq!(state.entities.len(), 1);
        assert_eq!(state.data_source, DataSource::CoinGecko);
    }

    #[tokio::test]
    async fn test_failed_mutation_writes_nothing() {
        let backend = Arc::new(MemoryKeyValueStore::new());
        let store = StateStore::load(backend.clone(), DataSource::CoinGecko).await;
        assert!(store.mutate(|s| s.remove_entity("ghost")).await.is_err());
        assert_eq!(backend.get("trackedEntities").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_storage_failure_degrades_without_losing_state() {
        let store = StateStore::load(Arc::new(BrokenStore), DataSource::CoinGecko).await;
        assert!(store.is_degraded());

        store.mutate(|s| s.add_entity(bitcoin())).await.unwrap();
        assert!(store.is_degraded());
        assert_eq!(store.read(|s| s.entities.len()).await, 1);
    }
}
