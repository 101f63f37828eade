//! Embedding Gateway
//!
//! Turns text into fixed-dimension vectors. The production backend is an
//! Ollama embedding model spoken to over HTTP; the feature-hashing
//! embedder is a deterministic offline stand-in with no model behind it —
//! the same text always produces the same vector regardless of what else
//! has been embedded.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default embedding model.
pub const DEFAULT_EMBED_MODEL: &str = "mxbai-embed-large";

/// Dimensionality of the feature-hashing embedder.
const HASH_EMBEDDING_DIM: usize = 256;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding HTTP error: {0}")]
    Http(String),
    #[error("embedding generation failed: {0}")]
    GenerationFailed(String),
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(e: reqwest::Error) -> Self {
        EmbeddingError::Http(e.to_string())
    }
}

/// Embedding vector
pub type Embedding = Vec<f32>;

/// Produces a fixed-dimension vector for a piece of text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Embedding, EmbeddingError>;
}

/// HTTP client for Ollama's embedding endpoint.
pub struct OllamaEmbedder {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Embedding,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        debug!(model = %self.model, chars = text.len(), "Requesting embedding");
        let resp = self
            .http
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&json!({ "model": self.model, "prompt": text }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::GenerationFailed(format!(
                "{}: {}",
                status, body
            )));
        }

        let parsed: OllamaEmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::GenerationFailed(e.to_string()))?;

        if parsed.embedding.is_empty() {
            return Err(EmbeddingError::GenerationFailed(
                "model returned an empty vector".to_string(),
            ));
        }
        Ok(parsed.embedding)
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each token is hashed to a fixed bucket; the resulting term-frequency
/// vector is L2-normalized. Pure — used for tests and offline operation.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            dim: HASH_EMBEDDING_DIM,
        }
    }

    fn hash_token(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % self.dim
    }

    fn embed(&self, text: &str) -> Embedding {
        let tokens: Vec<String> = text
            .split_whitespace()
            .map(|t| {
                t.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|t| !t.is_empty())
            .collect();

        let mut tf = vec![0.0f32; self.dim];
        if tokens.is_empty() {
            return tf;
        }

        for token in &tokens {
            tf[self.hash_token(token)] += 1.0;
        }

        let norm: f32 = tf.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut tf {
                *x /= norm;
            }
        }
        tf
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        Ok(self.embed(text))
    }
}

/// Cosine similarity between two embeddings.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedder_dimension() {
        let embedder = HashEmbedder::new();
        let embedding = embedder.embed_query("Hello world this is a test").await.unwrap();
        assert_eq!(embedding.len(), HASH_EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn test_hash_embedder_stability() {
        let embedder = HashEmbedder::new();
        let first = embedder.embed_query("The quick brown fox").await.unwrap();
        let _ = embedder
            .embed_query("completely different words zebra giraffe quantum")
            .await
            .unwrap();
        let second = embedder.embed_query("The quick brown fox").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_hash_embedder_empty_text() {
        let embedder = HashEmbedder::new();
        let embedding = embedder.embed_query("").await.unwrap();
        assert!(embedding.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_mismatched_lengths() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[tokio::test]
    async fn test_related_texts_more_similar_than_unrelated() {
        let embedder = HashEmbedder::new();
        let base = embedder.embed_query("rust async runtime tokio").await.unwrap();
        let related = embedder.embed_query("tokio rust runtime").await.unwrap();
        let unrelated = embedder.embed_query("banana smoothie recipe").await.unwrap();
        assert!(cosine_similarity(&base, &related) > cosine_similarity(&base, &unrelated));
    }
}
