
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{API_KEY_ENV, ApiKey, Config};
use crate::embeddings::{Embedder, EmbeddingVector};
use crate::{RagError, Result};

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
/// ureq's default response body limit
const DEFAULT_BODY_LIMIT: u64 = 10 * 1024 * 1024;
/// Upper bound on the JSON size of one vector component, including the separator
const BYTES_PER_COMPONENT: u64 = 32;
/// Per-item envelope (`{"object":"embedding","index":..,"embedding":[]}`) plus slack
const BYTES_PER_ITEM: u64 = 256;

/// Blocking client for an OpenAI-compatible embeddings API
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: Url,
    api_key: ApiKey,
    model: String,
    dimension: u32,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub owned_by: Option<String>,
}

impl OpenAiClient {
    /// Build a client from configuration. Performs no network I/O.
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(RagError::MissingCredential(API_KEY_ENV))?;
        let base_url = config.api_url()?;

        Ok(Self {
            base_url,
            api_key,
            model: config.embedding.model.clone(),
            dimension: config.embedding.dimension,
            batch_size: config.embedding.batch_size.max(1),
            agent: build_agent(Duration::from_secs(config.embedding.timeout_secs)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    /// Build a client and confirm the configured model resolves
    #[inline]
    pub fn connect(config: &Config) -> Result<Self> {
        let client = Self::new(config)?;
        client.validate_model()?;
        Ok(client)
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Verify that the configured model is known to the provider
    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        debug!("Resolving embedding model: {}", self.model);

        let model = self
            .fetch_model()
            .map_err(|e| RagError::ModelInit(format!("Model '{}': {:#}", self.model, e)))?;

        info!(
            "Embedding model {} resolved at {} (owner: {})",
            model.id,
            self.base_url,
            model.owned_by.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }

    fn fetch_model(&self) -> anyhow::Result<ModelInfo> {
        let url = self
            .base_url
            .join(&format!("models/{}", self.model))
            .context("Failed to build model URL")?;
        let authorization = self.authorization();

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .header("Authorization", authorization.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch model")?;

        serde_json::from_str(&response_text).context("Failed to parse model response")
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<EmbeddingVector>> {
        let url = self
            .base_url
            .join("embeddings")
            .context("Failed to build embeddings URL")?;

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;
        let authorization = self.authorization();
        let body_limit = self.response_limit(texts.len());

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Authorization", authorization.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| {
                        resp.body_mut()
                            .with_config()
                            .limit(body_limit)
                            .read_to_string()
                    })
            })
            .context("Failed to generate embeddings")?;

        parse_embedding_response(&response_text, texts.len())
    }

    /// Largest response body accepted for a batch of `inputs` texts
    fn response_limit(&self, inputs: usize) -> u64 {
        let per_item = u64::from(self.dimension) * BYTES_PER_COMPONENT + BYTES_PER_ITEM;
        let expected = per_item.saturating_mul(inputs as u64);
        DEFAULT_BODY_LIMIT.max(expected.saturating_add(DEFAULT_BODY_LIMIT / 10))
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.api_key.expose())
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> anyhow::Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status == 429 || *status >= 500 {
                                warn!(
                                    "Provider returned status {}, attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

impl Embedder for OpenAiClient {
    fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            let batch_embeddings = self
                .embed_batch(batch)
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))
                .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;
            embeddings.extend(batch_embeddings);
        }

        debug!("Generated {} embeddings total", embeddings.len());
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Decode an embeddings response, restoring input order from each item's `index`
fn parse_embedding_response(
    response_text: &str,
    expected: usize,
) -> anyhow::Result<Vec<EmbeddingVector>> {
    let mut response: EmbeddingResponse =
        serde_json::from_str(response_text).context("Failed to parse embedding response")?;

    if response.data.len() != expected {
        return Err(anyhow::anyhow!(
            "Mismatch between request and response counts: {} vs {}",
            expected,
            response.data.len()
        ));
    }

    response.data.sort_by_key(|item| item.index);
    if response
        .data
        .iter()
        .enumerate()
        .any(|(position, item)| item.index != position)
    {
        return Err(anyhow::anyhow!(
            "Embedding response indices do not cover the request"
        ));
    }

    Ok(response
        .data
        .into_iter()
        .map(|item| item.embedding)
        .collect())
}
