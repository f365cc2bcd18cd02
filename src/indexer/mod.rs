// Indexer module
// Loads documents, embeds their chunks and stores them in the vector store


use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::VectorStore;
use crate::documents::{Chunk, DocumentLoader, SourceDocument};
use crate::embeddings::{Embedder, embed_many_blocking};
use crate::{RagError, Result};

/// Ingests a document directory into a vector store
pub struct Indexer {
    loader: DocumentLoader,
}

/// Statistics about an ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub files_found: usize,
    pub files_indexed: usize,
    pub chunks_indexed: usize,
    pub errors: usize,
}

impl Indexer {
    #[inline]
    pub fn new(loader: DocumentLoader) -> Self {
        Self { loader }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(DocumentLoader::from_config(config))
    }

    #[inline]
    pub fn directory(&self) -> &Path {
        self.loader.directory()
    }

    /// Load, embed and store every supported document
    ///
    /// Unreadable files and failed embedding batches are skipped and
    /// counted. Store failures end the run.
    #[inline]
    pub async fn index<E: Embedder + Clone + 'static>(
        &self,
        embedder: &E,
        store: &mut VectorStore,
    ) -> Result<IndexingStats> {
        let mut stats = IndexingStats::default();

        let files = match self.loader.discover_files() {
            Ok(files) => files,
            Err(e) => {
                warn!("Nothing to ingest: {}", e);
                return Ok(stats);
            }
        };
        stats.files_found = files.len();
        info!(
            "Ingesting {} files from {}",
            files.len(),
            self.directory().display()
        );

        let bar = progress_bar(files.len() as u64);

        for path in &files {
            bar.set_message(path.display().to_string());

            match self.index_file(path, embedder, store).await {
                Ok(chunks) => {
                    stats.files_indexed += 1;
                    stats.chunks_indexed += chunks;
                }
                Err(e @ (RagError::Load(_) | RagError::Embedding(_))) => {
                    error!("Skipping {}: {}", path.display(), e);
                    stats.errors += 1;
                }
                Err(e) => {
                    bar.abandon();
                    return Err(e);
                }
            }
            bar.inc(1);
        }

        bar.finish_and_clear();
        info!(
            "Ingested {} chunks from {}/{} files ({} errors)",
            stats.chunks_indexed, stats.files_indexed, stats.files_found, stats.errors
        );
        Ok(stats)
    }

    async fn index_file<E: Embedder + Clone + 'static>(
        &self,
        path: &Path,
        embedder: &E,
        store: &mut VectorStore,
    ) -> Result<usize> {
        let document = self.load_file_blocking(path).await?;
        let chunks: Vec<Chunk> = self.loader.split(&document);
        if chunks.is_empty() {
            debug!("No chunks produced for {}", document.source);
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let vectors = embed_many_blocking(embedder, texts).await?;
        store.insert(&chunks, &vectors).await?;

        debug!("Indexed {} chunks from {}", chunks.len(), document.source);
        Ok(chunks.len())
    }

    /// Load a document on the blocking thread pool
    async fn load_file_blocking(&self, path: &Path) -> Result<SourceDocument> {
        let loader = self.loader.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || loader.load_file(&path))
            .await
            .map_err(|e| RagError::Load(format!("Document loading task failed: {}", e)))?
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    if console::user_attended_stderr() {
        let style = ProgressStyle::with_template("{spinner} [{pos}/{len}] Ingesting {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let bar = ProgressBar::new(len).with_style(style);
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        bar
    } else {
        ProgressBar::hidden()
    }
}
