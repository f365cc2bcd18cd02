// Database module
// Persistent vector storage for chunk embeddings

pub mod lancedb;

pub use lancedb::{RecordMetadata, SearchHit, StoredRecord, VectorStore};
