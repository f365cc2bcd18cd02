
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::documents::chunking::ChunkingConfig;
use crate::{RagError, Result};

/// Environment variable holding the embedding provider credential
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;

const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_FILE_NAME: &str = ".env";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(skip)]
    pub api_key: Option<ApiKey>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Provider credential. Never serialized and never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_base: String,
    pub model: String,
    pub dimension: u32,
    pub batch_size: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocumentsConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            batch_size: 100,
            timeout_secs: 30,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/vector_store"),
            collection: "pdf-docs".to_string(),
        }
    }
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data/pdf"),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            api_key: None,
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            documents: DocumentsConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid API base URL: {0} (must be an http or https URL)")]
    InvalidUrl(String),
    #[error("Invalid model name: {0:?} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid batch size: {0} (must be between 1 and 2048)")]
    InvalidBatchSize(u32),
    #[error("Invalid request timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid collection name: {0:?} (cannot be empty)")]
    InvalidCollection(String),
    #[error("Invalid chunk size: {0} (must be greater than 0)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    ChunkOverlapTooLarge(usize, usize),
    #[error("Invalid top-k: {0} (must be greater than 0)")]
    InvalidTopK(usize),
    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnvValue { name: &'static str, value: String },
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

impl Config {
    /// Load configuration rooted at `base_dir`.
    ///
    /// Precedence, lowest first: defaults, `config.toml`, process environment.
    /// A `.env` file in `base_dir` is merged into the environment first without
    /// overriding variables that are already set.
    #[inline]
    pub fn load<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let env_path = base_dir.as_ref().join(ENV_FILE_NAME);
        if env_path.exists() {
            match dotenvy::from_path(&env_path) {
                Ok(()) => debug!("Loaded environment from {}", env_path.display()),
                Err(e) => warn!("Ignoring unreadable {}: {}", env_path.display(), e),
            }
        }

        Self::load_with(base_dir, |name| std::env::var(name).ok())
    }

    /// Load configuration using `lookup` in place of the process environment
    #[inline]
    pub fn load_with<P, F>(base_dir: P, lookup: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let base_dir = base_dir.as_ref();
        let config_path = base_dir.join(CONFIG_FILE_NAME);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
                path: config_path.display().to_string(),
                source,
            })?;
            let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: config_path.display().to_string(),
                source,
            })?;
            debug!("Loaded config file {}", config_path.display());
            config
        } else {
            Self::default()
        };
        config.base_dir = base_dir.to_path_buf();

        config.apply_env_overrides(lookup)?;
        config.validate_settings()?;

        Ok(config)
    }

    fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_key = lookup(API_KEY_ENV)
            .filter(|key| !key.trim().is_empty())
            .map(ApiKey::new);

        if let Some(value) = lookup("OPENAI_BASE_URL") {
            self.embedding.api_base = value;
        }
        if let Some(value) = lookup("RAG_EMBEDDING_MODEL") {
            self.embedding.model = value;
        }
        if let Some(value) = lookup("RAG_EMBEDDING_DIMENSION") {
            self.embedding.dimension = parse_env("RAG_EMBEDDING_DIMENSION", value)?;
        }
        if let Some(value) = lookup("RAG_STORE_PATH") {
            self.store.path = PathBuf::from(value);
        }
        if let Some(value) = lookup("RAG_COLLECTION_NAME") {
            self.store.collection = value;
        }
        if let Some(value) = lookup("RAG_DOCUMENTS_DIR") {
            self.documents.directory = PathBuf::from(value);
        }
        if let Some(value) = lookup("RAG_CHUNK_SIZE") {
            self.chunking.chunk_size = parse_env("RAG_CHUNK_SIZE", value)?;
        }
        if let Some(value) = lookup("RAG_CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse_env("RAG_CHUNK_OVERLAP", value)?;
        }
        if let Some(value) = lookup("RAG_TOP_K") {
            self.retrieval.top_k = parse_env("RAG_TOP_K", value)?;
        }

        Ok(())
    }

    /// Fail fast when the provider credential is absent, then check the
    /// remaining settings. Performs no I/O.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self
            .api_key
            .as_ref()
            .is_none_or(|key| key.expose().trim().is_empty())
        {
            return Err(RagError::MissingCredential(API_KEY_ENV));
        }

        self.validate_settings()?;
        Ok(())
    }

    /// Bounds checks for every setting except the credential
    #[inline]
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;

        if self.store.collection.trim().is_empty() {
            return Err(ConfigError::InvalidCollection(self.store.collection.clone()));
        }

        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunking.chunk_size));
        }

        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::ChunkOverlapTooLarge(
                self.chunking.chunk_overlap,
                self.chunking.chunk_size,
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::InvalidTopK(self.retrieval.top_k));
        }

        Ok(())
    }

    /// Get the base directory relative paths are resolved against
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE_NAME)
    }

    /// Get the directory holding the LanceDB files
    #[inline]
    pub fn store_path(&self) -> PathBuf {
        self.base_dir.join(&self.store.path)
    }

    /// Get the directory documents are ingested from
    #[inline]
    pub fn documents_dir(&self) -> PathBuf {
        self.base_dir.join(&self.documents.directory)
    }

    #[inline]
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        self.embedding.api_url()
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_url()?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(1..=8192).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if !(1..=2048).contains(&self.batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }

    /// API base as a URL whose path ends in `/`, so endpoint names can be joined onto it
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        let mut url =
            Url::parse(&self.api_base).map_err(|_| ConfigError::InvalidUrl(self.api_base.clone()))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(self.api_base.clone()));
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(url)
    }
}

impl ApiKey {
    #[inline]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[inline]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self)
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 12 {
            return f.write_str("****");
        }

        let prefix: String = chars.iter().take(3).collect();
        let suffix: String = chars.iter().skip(chars.len() - 4).collect();
        write!(f, "{}****{}", prefix, suffix)
    }
}

fn parse_env<T: FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    match value.trim().parse() {
        Ok(parsed) => Ok(parsed),
        Err(_) => Err(ConfigError::InvalidEnvValue { name, value }),
    }
}
