//! Embedding collaborator.
//!
//! [`EmbeddingProvider`] is the seam for the external embedding service; the
//! concrete [`HttpEmbeddingProvider`] speaks the OpenAI-compatible
//! `/embeddings` protocol. Every failure surfaces as a
//! [`CollaboratorError`] so callers can degrade to lexical scoring instead
//! of aborting the run.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use promptforge_shared::config::ProviderConfig;
use promptforge_shared::{CollaboratorError, CollaboratorResult};

/// Timeout for embedding requests.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// User-Agent string for collaborator requests.
const USER_AGENT: &str = concat!("PromptForge/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// EmbeddingProvider trait
// ---------------------------------------------------------------------------

/// External embedding service.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Cache partition key: provider endpoint plus model version. Embeddings
    /// from different models are never interchangeable.
    fn partition(&self) -> String;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> CollaboratorResult<Vec<f32>>;

    /// Embed several texts in one request.
    async fn embed_batch(&self, texts: &[String]) -> CollaboratorResult<Vec<Vec<f32>>>;
}

// ---------------------------------------------------------------------------
// HTTP provider
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpEmbeddingProvider {
    /// Build a provider from config, reading the API key from the configured
    /// environment variable. Returns `None` when the key is absent; the
    /// retriever then runs lexical-only.
    pub fn from_config(config: &ProviderConfig) -> CollaboratorResult<Option<Self>> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                debug!(env = %config.api_key_env, "no embedding API key, vector search disabled");
                return Ok(None);
            }
        };
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CollaboratorError::unavailable("embeddings", e.to_string()))?;
        Ok(Some(Self {
            client,
            endpoint: config.embed_endpoint.clone(),
            model: config.embed_model.clone(),
            api_key,
        }))
    }

    async fn request(&self, input: &[String]) -> CollaboratorResult<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input,
            })
            .send()
            .await
            .map_err(|e| CollaboratorError::request("embeddings", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::request(
                "embeddings",
                format!("HTTP {status}"),
            ));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::malformed("embeddings", e.to_string()))?;

        if body.data.len() != input.len() {
            return Err(CollaboratorError::malformed(
                "embeddings",
                format!("expected {} vectors, got {}", input.len(), body.data.len()),
            ));
        }

        // The API may reorder results; restore input order by index.
        let mut vectors: Vec<Vec<f32>> = vec![Vec::new(); input.len()];
        for datum in body.data {
            if datum.index >= vectors.len() {
                return Err(CollaboratorError::malformed(
                    "embeddings",
                    format!("vector index {} out of range", datum.index),
                ));
            }
            vectors[datum.index] = datum.embedding;
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn partition(&self) -> String {
        format!("{}#{}", self.endpoint, self.model)
    }

    async fn embed(&self, text: &str) -> CollaboratorResult<Vec<f32>> {
        let input = [text.to_string()];
        let mut vectors = self.request(&input).await?;
        vectors
            .pop()
            .ok_or_else(|| CollaboratorError::malformed("embeddings", "empty response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> CollaboratorResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// In-memory embedding cache keyed by exact text, partitioned by
/// provider+model. An explicit handle the caller constructs and injects;
/// there is no process-global instance.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: Mutex<HashMap<String, Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(partition: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(partition.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, partition: &str, text: &str) -> Option<Vec<f32>> {
        let entries = self.entries.lock().ok()?;
        entries.get(&Self::key(partition, text)).cloned()
    }

    pub fn put(&self, partition: &str, text: &str, vector: Vec<f32>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(Self::key(partition, text), vector);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Embed through the cache, calling the provider only on a miss.
pub async fn embed_cached(
    provider: &dyn EmbeddingProvider,
    cache: &EmbeddingCache,
    text: &str,
) -> CollaboratorResult<Vec<f32>> {
    let partition = provider.partition();
    if let Some(vector) = cache.get(&partition, text) {
        return Ok(vector);
    }
    let vector = provider.embed(text).await?;
    cache.put(&partition, text, vector.clone());
    Ok(vector)
}
