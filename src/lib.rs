use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T, E = RagError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Missing credential: {0} is not set. Add it to the environment or a .env file.")]
    MissingCredential(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Document loading error: {0}")]
    Load(String),

    #[error("Model initialization error: {0}")]
    ModelInit(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store initialization error: {0}")]
    StoreInit(String),

    #[error("Dimension mismatch: collection expects {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod documents;
pub mod embeddings;
pub mod indexer;
pub mod pipeline;
