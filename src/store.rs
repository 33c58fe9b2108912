//! Persistence bridge to the external document store.
//!
//! The store is a single JSON document holding one array per collection
//! (`users`, `messages`), exposed through a bin-style HTTP API. Reads and
//! writes are whole-collection; the relay path only ever appends and never
//! waits for completion. An in-memory backend backs the integration tests.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::StoreConfig;

/// Collection holding registered user accounts.
pub const USERS: &str = "users";
/// Collection holding delivered chat messages.
pub const MESSAGES: &str = "messages";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("document store returned {0}")]
    Status(StatusCode),
    #[error("document store payload malformed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Handle to the document store. Cheap to clone; the relay path clones it
/// into detached persistence tasks.
#[derive(Debug, Clone)]
pub struct DocStore {
    backend: Backend,
}

#[derive(Debug, Clone)]
enum Backend {
    Remote(RemoteStore),
    Memory(Arc<Mutex<HashMap<String, Vec<Value>>>>),
}

#[derive(Debug, Clone)]
struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
    bin_id: String,
    master_key: String,
    access_key: String,
}

impl DocStore {
    /// Store backed by the remote document API configured in `[store]`.
    pub fn remote(config: &StoreConfig) -> Self {
        Self {
            backend: Backend::Remote(RemoteStore {
                client: reqwest::Client::new(),
                base_url: config.base_url.trim_end_matches('/').to_string(),
                bin_id: config.bin_id.clone(),
                master_key: config.master_key.clone(),
                access_key: config.access_key.clone(),
            }),
        }
    }

    /// Store backed by process memory. Used by integration tests.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(Mutex::new(HashMap::new()))),
        }
    }

    /// Fetch a whole collection. A collection the document does not contain
    /// yet reads as empty.
    pub async fn fetch_collection<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Vec<T>, StoreError> {
        let records = match &self.backend {
            Backend::Remote(remote) => {
                let doc = remote.fetch_document().await?;
                doc.get(name).cloned().unwrap_or(Value::Array(Vec::new()))
            }
            Backend::Memory(collections) => {
                let collections = collections.lock().expect("store mutex poisoned");
                Value::Array(collections.get(name).cloned().unwrap_or_default())
            }
        };
        Ok(serde_json::from_value(records)?)
    }

    /// Replace a whole collection with the given records.
    pub async fn replace_collection<T: Serialize>(
        &self,
        name: &str,
        records: &[T],
    ) -> Result<(), StoreError> {
        let records = serde_json::to_value(records)?;
        match &self.backend {
            Backend::Remote(remote) => {
                let mut doc = match remote.fetch_document().await? {
                    Value::Object(doc) => doc,
                    _ => serde_json::Map::new(),
                };
                doc.insert(name.to_string(), records);
                remote.put_document(&Value::Object(doc)).await
            }
            Backend::Memory(collections) => {
                let items = match records {
                    Value::Array(items) => items,
                    other => vec![other],
                };
                collections
                    .lock()
                    .expect("store mutex poisoned")
                    .insert(name.to_string(), items);
                Ok(())
            }
        }
    }

    /// Append one record: fetch, push, replace. Read-modify-write without
    /// concurrency control; concurrent appends can lose records.
    pub async fn append<T: Serialize>(&self, name: &str, record: &T) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Remote(_) => {
                let mut records: Vec<Value> = self.fetch_collection(name).await?;
                records.push(serde_json::to_value(record)?);
                self.replace_collection(name, &records).await
            }
            Backend::Memory(collections) => {
                let value = serde_json::to_value(record)?;
                collections
                    .lock()
                    .expect("store mutex poisoned")
                    .entry(name.to_string())
                    .or_default()
                    .push(value);
                Ok(())
            }
        }
    }
}

impl RemoteStore {
    async fn fetch_document(&self) -> Result<Value, StoreError> {
        let url = format!("{}/b/{}/latest", self.base_url, self.bin_id);
        let resp = self.with_keys(self.client.get(&url)).send().await?;
        if !resp.status().is_success() {
            return Err(StoreError::Status(resp.status()));
        }
        let body: Value = resp.json().await?;
        // The API wraps the document in a `record` envelope.
        Ok(body.get("record").cloned().unwrap_or(body))
    }

    async fn put_document(&self, doc: &Value) -> Result<(), StoreError> {
        let url = format!("{}/b/{}", self.base_url, self.bin_id);
        let resp = self.with_keys(self.client.put(&url)).json(doc).send().await?;
        if !resp.status().is_success() {
            return Err(StoreError::Status(resp.status()));
        }
        Ok(())
    }

    fn with_keys(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("X-Master-Key", &self.master_key)
            .header("X-Access-Key", &self.access_key)
    }
}
