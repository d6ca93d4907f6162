/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// File-per-key backend.
pub mod file;
/// In-process backend.
pub mod memory;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::dao::storage::StorageResult;

/// Durable key-value store holding whole JSON blobs.
pub trait KvStore: Send + Sync {
    /// Short backend name reported by the health endpoint.
    fn backend(&self) -> &'static str;
    /// Fetch the blob stored under `key`, `None` when nothing was ever written.
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    /// Replace the blob stored under `key`.
    fn put(&self, key: &str, value: Value) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap round trip proving the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Keys double as file names and document ids, so they stay in a conservative alphabet.
pub(crate) fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
