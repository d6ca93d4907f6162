use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::fs;

use super::{KvStore, is_valid_key};
use crate::dao::storage::{StorageError, StorageResult};

/// Stores each key as `<dir>/<key>.json`, replaced atomically on every write.
#[derive(Clone, Debug)]
pub struct FileKvStore {
    dir: Arc<PathBuf>,
}

impl FileKvStore {
    /// Open (and create if needed) the directory backing the store.
    pub async fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|source| {
            StorageError::unavailable(format!("cannot create `{}`", dir.display()), source)
        })?;
        Ok(Self { dir: Arc::new(dir) })
    }

    /// Directory the store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KvStore for FileKvStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let path = self.path_for(key);
        let key = key.to_string();
        Box::pin(async move {
            let path = path?;
            let contents = match fs::read(&path).await {
                Ok(contents) => contents,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
                Err(err) => {
                    return Err(StorageError::unavailable(
                        format!("cannot read `{}`", path.display()),
                        err,
                    ));
                }
            };
            serde_json::from_slice(&contents)
                .map(Some)
                .map_err(|source| StorageError::Codec { key, source })
        })
    }

    fn put(&self, key: &str, value: Value) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.path_for(key);
        let key = key.to_string();
        Box::pin(async move {
            let path = path?;
            let bytes =
                serde_json::to_vec(&value).map_err(|source| StorageError::Codec { key, source })?;

            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, bytes).await.map_err(|source| {
                StorageError::unavailable(format!("cannot write `{}`", tmp.display()), source)
            })?;
            fs::rename(&tmp, &path).await.map_err(|source| {
                StorageError::unavailable(format!("cannot replace `{}`", path.display()), source)
            })
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let dir = self.dir.clone();
        Box::pin(async move {
            let metadata = fs::metadata(dir.as_path()).await.map_err(|source| {
                StorageError::unavailable(format!("cannot stat `{}`", dir.display()), source)
            })?;
            if metadata.is_dir() {
                Ok(())
            } else {
                Err(StorageError::unavailable(
                    format!("`{}` is not a directory", dir.display()),
                    std::io::Error::from(ErrorKind::NotADirectory),
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn values_survive_reopening() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileKvStore::open(tmp.path().join("registry")).await.unwrap();
        store.put("state", json!({"rooms": {}})).await.unwrap();

        let reopened = FileKvStore::open(tmp.path().join("registry")).await.unwrap();
        assert_eq!(
            reopened.get("state").await.unwrap(),
            Some(json!({"rooms": {}}))
        );
        assert!(!reopened.dir().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileKvStore::open(tmp.path()).await.unwrap();
        assert!(store.get("state").await.unwrap().is_none());
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_is_a_codec_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("state.json"), b"{not json").unwrap();
        let store = FileKvStore::open(tmp.path()).await.unwrap();

        let err = store.get("state").await.unwrap_err();
        assert!(matches!(err, StorageError::Codec { .. }));
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileKvStore::open(tmp.path()).await.unwrap();
        let err = store.put("../escape", json!(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
