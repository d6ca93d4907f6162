use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao::{
    kv_store::{KvStore, is_valid_key},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
};

/// One registry key stored as one CouchDB document.
#[derive(Debug, Serialize, Deserialize)]
struct KvDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    rev: Option<String>,
    value: Value,
}

/// [`KvStore`] backed by a CouchDB database.
#[derive(Clone)]
pub struct CouchKvStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchKvStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.with_auth(self.client.request(method, url))
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .with_auth(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document(&self, doc_id: &str) -> CouchResult<Option<KvDocument>> {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<KvDocument>()
                .await
                .map(Some)
                .map_err(|source| CouchDaoError::DecodeResponse {
                    path: doc_id.to_string(),
                    source,
                }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document(&self, document: &KvDocument) -> CouchResult<()> {
        let response = self
            .request(Method::PUT, &document.id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: document.id.clone(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: document.id.clone(),
                status: response.status(),
            })
        }
    }
}

/// CouchDB reserves ids starting with `_`.
fn doc_id(key: &str) -> CouchResult<String> {
    if is_valid_key(key) && !key.starts_with('_') {
        Ok(key.to_string())
    } else {
        Err(CouchDaoError::InvalidDocId {
            doc_id: key.to_string(),
        })
    }
}

impl KvStore for CouchKvStore {
    fn backend(&self) -> &'static str {
        "couchdb"
    }

    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        let doc_id = doc_id(key);
        Box::pin(async move {
            let doc_id = doc_id?;
            let maybe_doc = store.get_document(&doc_id).await?;
            Ok(maybe_doc.map(|doc| doc.value))
        })
    }

    fn put(&self, key: &str, value: Value) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let doc_id = doc_id(key);
        Box::pin(async move {
            let id = doc_id?;
            let rev = store
                .get_document(&id)
                .await?
                .and_then(|existing| existing.rev);
            let doc = KvDocument { id, rev, value };
            store.put_document(&doc).await.map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .with_auth(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reserved_ids_are_rejected() {
        assert_eq!(doc_id("state").unwrap(), "state");
        assert!(doc_id("_users").is_err());
        assert!(doc_id("a/b").is_err());
    }

    #[test]
    fn new_documents_omit_revision() {
        let doc = KvDocument {
            id: "state".into(),
            rev: None,
            value: json!({"rooms": {}}),
        };
        let encoded = serde_json::to_value(&doc).unwrap();
        assert_eq!(encoded, json!({"_id": "state", "value": {"rooms": {}}}));
    }

    #[test]
    fn fetched_documents_keep_revision() {
        let doc: KvDocument =
            serde_json::from_value(json!({"_id": "state", "_rev": "3-abc", "value": 1})).unwrap();
        assert_eq!(doc.rev.as_deref(), Some("3-abc"));
        assert_eq!(doc.value, json!(1));
    }
}
