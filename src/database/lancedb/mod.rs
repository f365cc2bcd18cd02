// LanceDB vector database module
// Handles vector storage and similarity search for embeddings


pub mod vector_store;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::documents::Chunk;
use crate::embeddings::EmbeddingVector;

pub use vector_store::{SearchHit, VectorStore};

/// A chunk and its embedding as persisted in the collection
#[derive(Debug, Clone)]
pub struct StoredRecord {
    /// Unique identifier generated at insert time
    pub id: String,
    /// The vector embedding
    pub vector: EmbeddingVector,
    /// The chunk text
    pub content: String,
    /// Provenance of the chunk
    pub metadata: RecordMetadata,
}

/// Provenance stored alongside each embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordMetadata {
    /// Path of the source document, relative to the document directory
    pub source: String,
    /// Index of the chunk within its source
    pub position: u32,
    /// RFC 3339 timestamp of the insert
    pub created_at: String,
}

impl StoredRecord {
    /// Build a record for a chunk with a fresh identifier
    #[inline]
    pub fn from_chunk(chunk: &Chunk, vector: EmbeddingVector) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            content: chunk.content.clone(),
            metadata: RecordMetadata {
                source: chunk.source.clone(),
                position: u32::try_from(chunk.position).unwrap_or(u32::MAX),
                created_at: Utc::now().to_rfc3339(),
            },
        }
    }
}
