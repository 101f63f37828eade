//! Ingestion and Retrieval Pipeline
//!
//! Glues the chunker, embedding gateway, vector store, and ranker into the
//! two operations the chat orchestrator consumes: ingest a document, and
//! retrieve the chunks that best answer a query.
//!
//! Retrieval is two-phase: a bounded candidate pool is ranked to pick the
//! best-matching document(s), then a second query restricted to those
//! documents' chunk records fetches the chunks actually handed to the
//! prompt builder. The ranker only aggregates what it is given — the pool
//! bound lives here, not in the ranker.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use ulid::Ulid;

use super::chunker;
use super::embeddings::{EmbeddingError, EmbeddingProvider};
use super::ranker::{select_best_documents, NeighborHit};
use super::store::{StoreError, VectorStore};

/// Default collection for ingested documents.
pub const DEFAULT_COLLECTION: &str = "markdown-store";

/// Candidate pool queried before ranking.
pub const DEFAULT_CANDIDATE_POOL: usize = 10;

/// Chunks returned from the winning document(s).
pub const DEFAULT_CHUNK_TOP_K: usize = 5;

/// Maximum file size (50 MB) accepted for ingestion.
const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("file too large: {0} bytes (max {1} bytes)")]
    FileTooLarge(u64, u64),
}

/// Tunables for one `Retriever` instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrieverSettings {
    pub collection: String,
    pub candidate_pool: usize,
    pub chunk_top_k: usize,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            candidate_pool: DEFAULT_CANDIDATE_POOL,
            chunk_top_k: DEFAULT_CHUNK_TOP_K,
        }
    }
}

/// Outcome of one ingestion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub document_id: String,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// One chunk handed back to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub document_id: String,
    pub chunk_id: String,
    pub text: String,
    pub distance: f64,
}

/// Record id for one chunk of a document.
pub fn chunk_record_id(document_id: &str, index: u32) -> String {
    format!("{}::{}", document_id, index)
}

/// Recover the document id from a chunk record id.
pub fn document_of(record_id: &str) -> &str {
    record_id
        .rsplit_once("::")
        .map(|(document, _)| document)
        .unwrap_or(record_id)
}

/// Ingestion and retrieval over one embedding backend and one store.
///
/// Constructed explicitly and passed to callers; owns no global state.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    settings: RetrieverSettings,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        settings: RetrieverSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            settings,
        }
    }

    /// Chunk, embed, and upsert one document under `document_id`.
    ///
    /// Re-ingesting the same id replaces its chunk records (upsert is
    /// replace-by-id). Chunks are embedded concurrently.
    pub async fn ingest(
        &self,
        document_id: &str,
        text: &str,
    ) -> Result<IngestSummary, RetrievalError> {
        let chunks = chunker::chunk(text);

        let embeddings = try_join_all(
            chunks
                .iter()
                .map(|chunk| self.embedder.embed_query(&chunk.text)),
        )
        .await?;

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            self.store
                .upsert(
                    &self.settings.collection,
                    &chunk_record_id(document_id, chunk.index),
                    embedding,
                    &chunk.text,
                )
                .await?;
        }

        info!(document = %document_id, chunks = chunks.len(), "Ingested document");
        Ok(IngestSummary {
            document_id: document_id.to_string(),
            chunk_count: chunks.len(),
            ingested_at: Utc::now(),
        })
    }

    /// Ingest a file from disk under a fresh ULID document id.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestSummary, RetrievalError> {
        let file_size = fs::metadata(path)?.len();
        if file_size > MAX_FILE_SIZE {
            return Err(RetrievalError::FileTooLarge(file_size, MAX_FILE_SIZE));
        }

        let text = fs::read_to_string(path)?;
        let document_id = Ulid::new().to_string();
        self.ingest(&document_id, &text).await
    }

    /// Retrieve the chunks that best answer `query`.
    ///
    /// Returns an empty vec when no document qualifies — the documented
    /// "no relevant documents" outcome, distinct from any error.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let vector = self.embedder.embed_query(query).await?;

        let pool = self
            .store
            .query(
                &self.settings.collection,
                &vector,
                self.settings.candidate_pool,
                None,
            )
            .await?;

        let hits: Vec<NeighborHit> = pool
            .ids
            .iter()
            .zip(pool.distances.iter())
            .map(|(id, distance)| NeighborHit {
                document_id: document_of(id).to_string(),
                distance: *distance,
            })
            .collect();

        let best = select_best_documents(&hits);
        if best.is_empty() {
            debug!("No relevant documents for query");
            return Ok(Vec::new());
        }

        // Narrow to the winning documents' chunk records and fetch the
        // chunks worth handing to the prompt builder.
        let restrict: Vec<String> = pool
            .ids
            .iter()
            .filter(|id| best.iter().any(|doc| doc.as_str() == document_of(id)))
            .cloned()
            .collect();

        let narrowed = self
            .store
            .query(
                &self.settings.collection,
                &vector,
                self.settings.chunk_top_k,
                Some(&restrict),
            )
            .await?;

        let mut results = Vec::with_capacity(narrowed.len());
        for i in 0..narrowed.len() {
            results.push(RetrievedChunk {
                document_id: document_of(&narrowed.ids[i]).to_string(),
                chunk_id: narrowed.ids[i].clone(),
                text: narrowed.documents.get(i).cloned().unwrap_or_default(),
                distance: narrowed.distances.get(i).copied().unwrap_or(f64::MAX),
            });
        }

        info!(
            documents = best.len(),
            chunks = results.len(),
            "Retrieval complete"
        );
        Ok(results)
    }
}
