// Retrieval pipeline
// Embeds a question, searches the vector store and assembles context


use serde::Serialize;
use tracing::{debug, error, info};

use crate::{RagError, Result};
use crate::database::{RecordMetadata, SearchHit, VectorStore};
use crate::embeddings::{Embedder, embed_many_blocking};

const CONTEXT_SEPARATOR: &str = "\n\n";

/// Answer-side view of a retrieval
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResponse {
    pub question: String,
    /// Retrieved contents joined nearest first
    pub context: String,
    pub documents: Vec<String>,
    pub metadatas: Vec<RecordMetadata>,
    pub distances: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    fn empty(question: &str, error: Option<String>) -> Self {
        Self {
            question: question.to_string(),
            error,
            ..Self::default()
        }
    }

    fn from_hits(question: &str, hits: Vec<SearchHit>) -> Self {
        let context = format_context(&hits);
        let mut response = Self::empty(question, None);
        response.context = context;
        for hit in hits {
            response.documents.push(hit.content);
            response.metadatas.push(hit.metadata);
            response.distances.push(hit.distance);
        }
        response
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Question answering front end over an embedder and a vector store
pub struct RetrievalPipeline<E: Embedder> {
    embedder: E,
    store: VectorStore,
    default_top_k: usize,
}

impl<E: Embedder + Clone + 'static> RetrievalPipeline<E> {
    #[inline]
    pub fn new(embedder: E, store: VectorStore, default_top_k: usize) -> Self {
        Self {
            embedder,
            store,
            default_top_k,
        }
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    #[inline]
    pub fn store_mut(&mut self) -> &mut VectorStore {
        &mut self.store
    }

    #[inline]
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    #[inline]
    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Retrieve the `top_k` chunks nearest to `question`
    #[inline]
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        debug!("Embedding question with {}", self.embedder.model_name());
        let query_vector = embed_many_blocking(&self.embedder, vec![question.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::Embedding("Provider returned no embedding".to_string()))?;
        self.store.search(&query_vector, top_k).await
    }

    /// Retrieve context for `question`, reporting failures inside the response
    #[inline]
    pub async fn query(&self, question: &str, top_k: usize) -> QueryResponse {
        match self.retrieve(question, top_k).await {
            Ok(hits) => {
                info!("Retrieved {} chunks for question", hits.len());
                QueryResponse::from_hits(question, hits)
            }
            Err(e) => {
                error!("Query failed: {}", e);
                QueryResponse::empty(question, Some(e.to_string()))
            }
        }
    }

    /// [`Self::query`] with the configured default number of results
    #[inline]
    pub async fn ask(&self, question: &str) -> QueryResponse {
        self.query(question, self.default_top_k).await
    }
}

/// Join hit contents in the order given
#[inline]
pub fn format_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| hit.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
