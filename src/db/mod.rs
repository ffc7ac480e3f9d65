use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;

pub mod entity;

mod kv_repository;
pub use kv_repository::SeaOrmKeyValueStore;

/// String-keyed persistence for JSON documents.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short backend name for logs and status output.
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: String) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Process-local store. Contents are lost on exit.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
        where I: IntoIterator<Item = (K, V)>, K: Into<String>, V: Into<String>
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect()
            ),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
