// Embeddings module
// Converts text into fixed-dimension vectors through an embedding provider

pub mod openai;

use crate::{RagError, Result};

pub use openai::OpenAiClient;

/// Dense vector representation of a piece of text
pub type EmbeddingVector = Vec<f32>;

/// A text embedding model.
///
/// Calls may perform blocking network I/O and are not retried by callers;
/// prefer `embed_many` over repeated `embed_one`.
pub trait Embedder: Send + Sync {
    /// Embed every input, returning one vector per text in input order
    fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;

    /// Name of the underlying model
    fn model_name(&self) -> &str;

    #[inline]
    fn embed_one(&self, text: &str) -> Result<EmbeddingVector> {
        self.embed_many(&[text.to_string()])?
            .pop()
            .ok_or_else(|| RagError::Embedding("Provider returned no embedding".to_string()))
    }
}

/// Run [`Embedder::embed_many`] on tokio's blocking thread pool
#[inline]
pub async fn embed_many_blocking<E>(
    embedder: &E,
    texts: Vec<String>,
) -> Result<Vec<EmbeddingVector>>
where
    E: Embedder + Clone + 'static,
{
    let embedder = embedder.clone();
    tokio::task::spawn_blocking(move || embedder.embed_many(&texts))
        .await
        .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))?
}
