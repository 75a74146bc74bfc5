//! Embedding providers for chunk and query vectors.
//!
//! The index treats the embedding model as a black box behind
//! [`EmbeddingProvider`]: text in, fixed-length unit vector out, deterministic
//! for identical input. Two implementations ship here: [`HttpEmbedder`] for
//! Voyage-style JSON embedding APIs, and [`LocalEmbedder`], a deterministic
//! feature-hashing embedder that works offline with no API key.

use std::sync::Arc;

use async_trait::async_trait;
use recall_core::{EmbeddingConfig, RecallError};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.voyageai.com/v1";
const BATCH_SIZE: usize = 64;
const BATCH_DELAY_MS: u64 = 200;

/// A black-box text-to-vector capability, injected into the indexer and the
/// search engine.
///
/// Implementations must be deterministic for identical input and return unit
/// length vectors of exactly [`dimensions`](Self::dimensions) floats, so that
/// dot product equals cosine similarity.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Fixed, store-wide vector length. Changing it invalidates existing
    /// vector postings and requires a full re-index.
    fn dimensions(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RecallError>;

    /// Embed a batch of texts, returning vectors in the same order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RecallError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Construct the provider named by the configuration.
///
/// `"local"` yields a [`LocalEmbedder`]; anything else is treated as a
/// Voyage-style HTTP provider and requires an API key.
///
/// # Errors
///
/// Returns [`RecallError::Config`] if a remote provider is configured
/// without an API key.
///
/// # Examples
///
/// ```
/// use recall_core::EmbeddingConfig;
/// use recall_engine::embedding::from_config;
///
/// let provider = from_config(&EmbeddingConfig::default()).unwrap();
/// assert_eq!(provider.dimensions(), 384);
/// ```
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, RecallError> {
    match config.provider.as_str() {
        "local" => Ok(Arc::new(LocalEmbedder::new(config.dimensions))),
        _ => Ok(Arc::new(HttpEmbedder::with_config(config)?)),
    }
}

/// Client for Voyage-style JSON embedding APIs.
///
/// The `reqwest::Client` (the expensive shared resource) is built exactly
/// once at construction and reused for the process lifetime; callers share
/// the embedder through an `Arc` without per-call locking.
pub struct HttpEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl std::fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
    input_type: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    /// Create a client from an [`EmbeddingConfig`].
    ///
    /// Falls back to the `RECALL_API_KEY` env var if no key is in the config.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Config`] if no API key is available.
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, RecallError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("RECALL_API_KEY").ok())
            .ok_or_else(|| {
                RecallError::Config(
                    "embedding API key not found: set embedding.api_key in .recall.toml or RECALL_API_KEY env var".into(),
                )
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, texts: Vec<String>, input_type: &str) -> Result<Vec<Vec<f32>>, RecallError> {
        let request = EmbedRequest {
            model: self.model.clone(),
            input: texts,
            input_type: input_type.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| RecallError::Embedding(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(RecallError::Embedding(format!(
                "embedding API returned {status}: {body}"
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RecallError::Embedding(format!("failed to parse response: {e}")))?;

        Ok(embed_response.data.into_iter().map(|d| d.embedding).collect())
    }

    /// Build the JSON request body (for testing the wire format).
    #[cfg(test)]
    fn build_request(&self, texts: &[String], input_type: &str) -> EmbedRequest {
        EmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
            input_type: input_type.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        let mut vectors = self.request(vec![text.to_string()], "query").await?;
        vectors
            .pop()
            .ok_or_else(|| RecallError::Embedding("empty response from embedding API".into()))
    }

    /// Splits into sub-batches with short delays for rate limiting.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RecallError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            if i > 0 {
                tokio::time::sleep(tokio::time::Duration::from_millis(BATCH_DELAY_MS)).await;
            }
            let vectors = self.request(batch.to_vec(), "document").await?;
            all.extend(vectors);
        }
        Ok(all)
    }
}

/// Deterministic feature-hashing embedder that runs entirely offline.
///
/// Words and their character trigrams are hashed into a fixed number of
/// buckets and the result is L2-normalized. Identical input always yields
/// the identical unit vector; texts sharing vocabulary land near each other.
/// Always available, so it doubles as the zero-config default and the test
/// stand-in for a real model.
///
/// # Examples
///
/// ```
/// use recall_engine::embedding::LocalEmbedder;
///
/// let embedder = LocalEmbedder::new(384);
/// assert_eq!(embedder.embed_sync("hello world").len(), 384);
/// ```
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    /// Create an embedder producing vectors of `dimensions` floats.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Embed synchronously; the async trait method delegates here.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            let token: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
            if token.is_empty() {
                continue;
            }

            vector[self.bucket(&token)] += 2.0;

            let chars: Vec<char> = token.chars().collect();
            for gram in chars.windows(3) {
                let gram: String = gram.iter().collect();
                vector[self.bucket(&gram)] += 1.0;
            }
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a, stable across platforms and runs.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash % self.dimensions as u64) as usize
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        Ok(self.embed_sync(text))
    }
}
