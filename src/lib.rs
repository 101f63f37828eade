// Colloquy Library
// Tool-invocation and retrieval core for the chat assistant; consumed by
// the CLI binary and the web orchestrator.

pub mod config;
pub mod retrieval;
pub mod tools;

// Re-export commonly used types
pub use config::{default_config_path, Config, ConfigError, ToolServerConfig};

pub use retrieval::{
    chunk, select_best_documents, Chunk, ChromaStore, DocumentAggregate, EmbeddingProvider,
    HashEmbedder, IngestSummary, MemoryStore, NeighborHit, OllamaEmbedder, RetrievalError,
    RetrievedChunk, Retriever, RetrieverSettings, VectorStore,
};

pub use tools::{ProcessState, ProcessStatus, ToolClient, ToolDescriptor, ToolError};
