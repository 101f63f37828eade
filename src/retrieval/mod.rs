//! Document Retrieval Core
//!
//! Handles document chunking, embedding, vector storage, and best-document
//! ranking for the chat orchestrator.

pub mod chunker;
pub mod embeddings;
pub mod pipeline;
pub mod ranker;
pub mod store;

// Re-export key public types
pub use chunker::{chunk, target_chunk_size, Chunk};
pub use embeddings::{
    cosine_similarity, Embedding, EmbeddingError, EmbeddingProvider, HashEmbedder, OllamaEmbedder,
};
pub use pipeline::{
    chunk_record_id, document_of, IngestSummary, RetrievalError, RetrievedChunk, Retriever,
    RetrieverSettings,
};
pub use ranker::{aggregate, select_best_documents, DocumentAggregate, NeighborHit};
pub use store::{ChromaStore, MemoryStore, QueryHits, StoreError, VectorStore};
