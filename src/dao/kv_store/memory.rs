use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;

use super::KvStore;
use crate::dao::storage::StorageResult;

/// Process-local store. Nothing survives a restart; used for tests and throwaway runs.
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<DashMap<String, Value>>,
}

impl MemoryKvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek at a stored value.
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }
}

impl KvStore for MemoryKvStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let value = self.snapshot(key);
        Box::pin(async move { Ok(value) })
    }

    fn put(&self, key: &str, value: Value) -> BoxFuture<'static, StorageResult<()>> {
        self.entries.insert(key.to_string(), value);
        Box::pin(async { Ok(()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn put_then_get_returns_latest_value() {
        let store = MemoryKvStore::new();
        assert!(store.get("state").await.unwrap().is_none());

        store.put("state", json!({"rooms": {}})).await.unwrap();
        store.put("state", json!({"rooms": {"A": 1}})).await.unwrap();

        assert_eq!(
            store.get("state").await.unwrap(),
            Some(json!({"rooms": {"A": 1}}))
        );
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let store = MemoryKvStore::new();
        let other = store.clone();
        store.put("state", json!(1)).await.unwrap();
        assert_eq!(other.snapshot("state"), Some(json!(1)));
    }
}
