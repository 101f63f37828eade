//! Vector Store Gateway
//!
//! Persists `(id, vector, text)` records in named collections and answers
//! nearest-neighbor queries. The production backend is Chroma's REST API,
//! spoken to directly with reqwest rather than through a wrapper crate for
//! stability and full API control. The in-memory store is a brute-force
//! cosine-distance fallback for tests and offline operation.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use super::embeddings::cosine_similarity;

/// Default Chroma endpoint.
pub const DEFAULT_CHROMA_URL: &str = "http://127.0.0.1:8000";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("vector store HTTP error: {0}")]
    Http(String),
    #[error("vector store not available")]
    Unavailable,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("deserialization error: {0}")]
    Deserialize(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Http(e.to_string())
    }
}

/// Nearest-neighbor results for one query: parallel arrays sorted
/// ascending by distance, at most `top_k` entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryHits {
    pub ids: Vec<String>,
    pub distances: Vec<f64>,
    pub documents: Vec<String>,
}

impl QueryHits {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Storage backend for embedded chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the record with this id. Idempotent.
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        text: &str,
    ) -> Result<(), StoreError>;

    /// Nearest neighbors of `vector`, optionally restricted to a set of
    /// record ids.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        restrict_to_ids: Option<&[String]>,
    ) -> Result<QueryHits, StoreError>;
}

/// Chroma collection info returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionInfo {
    id: String,
    name: String,
    metadata: Option<Value>,
}

/// Raw shape of Chroma's query response (one row per query embedding).
#[derive(Debug, Clone, Deserialize)]
struct ChromaQueryResult {
    ids: Vec<Vec<String>>,
    documents: Option<Vec<Vec<Option<String>>>>,
    distances: Option<Vec<Vec<f64>>>,
}

/// Direct HTTP client for Chroma's REST API.
pub struct ChromaStore {
    http: Client,
    base_url: String,
    tenant: String,
    database: String,
    /// Collection name to Chroma collection id, filled on first use.
    collections: RwLock<HashMap<String, String>>,
}

impl ChromaStore {
    pub fn new(base_url: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tenant: "default_tenant".to_string(),
            database: "default_database".to_string(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Health check — returns the nanosecond heartbeat if healthy.
    pub async fn heartbeat(&self) -> Result<i64, StoreError> {
        debug!("Chroma heartbeat check");
        let resp = self
            .http
            .get(format!("{}/api/v1/heartbeat", self.base_url))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(StoreError::Unavailable);
        }

        let body: Value = resp.json().await?;
        Ok(body["nanosecond heartbeat"].as_i64().unwrap_or(0))
    }

    /// Resolve a collection name to its Chroma id, creating the collection
    /// on first use.
    async fn collection_id(&self, name: &str) -> Result<String, StoreError> {
        if let Some(id) = self.collections.read().get(name) {
            return Ok(id.clone());
        }

        let resp = self
            .http
            .post(format!(
                "{}/api/v1/tenants/{}/databases/{}/collections",
                self.base_url, self.tenant, self.database
            ))
            .json(&json!({ "name": name, "get_or_create": true }))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            error!(name = %name, status = %status, "Collection get_or_create failed");
            return Err(StoreError::Http(format!(
                "create collection failed ({}): {}",
                status, text
            )));
        }

        let info: CollectionInfo = serde_json::from_str(&text)
            .map_err(|e| StoreError::Deserialize(format!("{}: {}", e, text)))?;

        info!(name = %name, "Collection get_or_create");
        self.collections
            .write()
            .insert(name.to_string(), info.id.clone());
        Ok(info.id)
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        text: &str,
    ) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidInput("id cannot be empty".to_string()));
        }

        let collection_id = self.collection_id(collection).await?;
        let body = json!({
            "ids": [id],
            "embeddings": [vector],
            "documents": [text],
        });

        let resp = self
            .http
            .post(format!(
                "{}/api/v1/collections/{}/upsert",
                self.base_url, collection_id
            ))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Chroma HTTP error");
            return Err(StoreError::Http(format!("upsert failed: {}", text)));
        }

        debug!(collection = %collection, id = %id, "Upserted record");
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        restrict_to_ids: Option<&[String]>,
    ) -> Result<QueryHits, StoreError> {
        let collection_id = self.collection_id(collection).await?;

        let mut body = json!({
            "query_embeddings": [vector],
            "n_results": top_k as u32,
            "include": ["documents", "distances"],
        });
        if let Some(ids) = restrict_to_ids {
            body["ids"] = json!(ids);
        }

        debug!(collection = %collection, top_k = top_k, "Querying collection");
        let resp = self
            .http
            .post(format!(
                "{}/api/v1/collections/{}/query",
                self.base_url, collection_id
            ))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Chroma HTTP error");
            return Err(StoreError::Http(format!("query failed: {}", text)));
        }

        let raw: ChromaQueryResult = resp
            .json()
            .await
            .map_err(|e| StoreError::Deserialize(e.to_string()))?;

        // Single query embedding, so only the first row matters.
        let ids = raw.ids.into_iter().next().unwrap_or_default();
        let distances = raw
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();
        let documents = raw
            .documents
            .and_then(|d| d.into_iter().next())
            .map(|row| row.into_iter().map(Option::unwrap_or_default).collect())
            .unwrap_or_default();

        Ok(QueryHits {
            ids,
            distances,
            documents,
        })
    }
}

#[derive(Debug, Clone)]
struct MemoryRecord {
    id: String,
    vector: Vec<f32>,
    text: String,
}

/// In-memory store: brute-force cosine distance over everything in the
/// collection.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<MemoryRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|r| r.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        text: &str,
    ) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidInput("id cannot be empty".to_string()));
        }

        let mut collections = self.collections.write();
        let records = collections.entry(collection.to_string()).or_default();

        let record = MemoryRecord {
            id: id.to_string(),
            vector: vector.to_vec(),
            text: text.to_string(),
        };
        match records.iter_mut().find(|r| r.id == id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        restrict_to_ids: Option<&[String]>,
    ) -> Result<QueryHits, StoreError> {
        let collections = self.collections.read();
        let records = match collections.get(collection) {
            Some(r) => r,
            None => return Ok(QueryHits::default()),
        };

        let mut scored: Vec<(&MemoryRecord, f64)> = records
            .iter()
            .filter(|r| match restrict_to_ids {
                Some(ids) => ids.iter().any(|id| *id == r.id),
                None => true,
            })
            .map(|r| {
                // Cosine distance: 0 for identical direction, up to 2.
                let distance = 1.0 - f64::from(cosine_similarity(&r.vector, vector));
                (r, distance)
            })
            .collect();

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        let mut hits = QueryHits::default();
        for (record, distance) in scored {
            hits.ids.push(record.id.clone());
            hits.distances.push(distance);
            hits.documents.push(record.text.clone());
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_upsert_replaces_by_id() {
        let store = MemoryStore::new();
        store.upsert("c", "x", &[1.0, 0.0], "first").await.unwrap();
        store.upsert("c", "x", &[0.0, 1.0], "second").await.unwrap();
        assert_eq!(store.count("c"), 1);

        let hits = store.query("c", &[0.0, 1.0], 5, None).await.unwrap();
        assert_eq!(hits.documents, vec!["second"]);
    }

    #[tokio::test]
    async fn test_memory_query_sorted_ascending() {
        let store = MemoryStore::new();
        store.upsert("c", "near", &[1.0, 0.0], "near").await.unwrap();
        store.upsert("c", "far", &[0.0, 1.0], "far").await.unwrap();
        store
            .upsert("c", "middle", &[1.0, 1.0], "middle")
            .await
            .unwrap();

        let hits = store.query("c", &[1.0, 0.0], 3, None).await.unwrap();
        assert_eq!(hits.ids, vec!["near", "middle", "far"]);
        for pair in hits.distances.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[tokio::test]
    async fn test_memory_query_respects_top_k() {
        let store = MemoryStore::new();
        for i in 0..10 {
            store
                .upsert("c", &format!("r{}", i), &[i as f32, 1.0], "t")
                .await
                .unwrap();
        }
        let hits = store.query("c", &[1.0, 1.0], 3, None).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_memory_query_restricted_ids() {
        let store = MemoryStore::new();
        store.upsert("c", "a", &[1.0, 0.0], "a").await.unwrap();
        store.upsert("c", "b", &[0.9, 0.1], "b").await.unwrap();
        store.upsert("c", "c", &[0.0, 1.0], "c").await.unwrap();

        let restrict = vec!["b".to_string(), "c".to_string()];
        let hits = store
            .query("c", &[1.0, 0.0], 5, Some(&restrict))
            .await
            .unwrap();
        assert_eq!(hits.ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_memory_query_unknown_collection_is_empty() {
        let store = MemoryStore::new();
        let hits = store.query("missing", &[1.0], 5, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_memory_rejects_empty_id() {
        let store = MemoryStore::new();
        let err = store.upsert("c", "", &[1.0], "t").await;
        assert!(matches!(err, Err(StoreError::InvalidInput(_))));
    }
}
