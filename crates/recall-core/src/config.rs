use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RecallError;

/// Top-level configuration loaded from `.recall.toml`.
///
/// Every section and field has a default, so an empty file (or no file at
/// all) yields a working local-first setup.
///
/// # Examples
///
/// ```
/// use recall_core::RecallConfig;
///
/// let config = RecallConfig::default();
/// assert_eq!(config.embedding.provider, "local");
/// assert_eq!(config.index.chunk_size_tokens, 400);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Chunking and file-selection settings for indexing.
    #[serde(default)]
    pub index: IndexConfig,
    /// Hybrid search tuning.
    #[serde(default)]
    pub search: SearchConfig,
}

impl RecallConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Io`] if the file cannot be read, or
    /// [`RecallError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use recall_core::RecallConfig;
    /// use std::path::Path;
    ///
    /// let config = RecallConfig::from_file(Path::new(".recall.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, RecallError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use recall_core::RecallConfig;
    ///
    /// let toml = r#"
    /// [search]
    /// limit = 20
    /// "#;
    /// let config = RecallConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.search.limit, 20);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, RecallError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// Configuration for the embedding provider.
///
/// The `"local"` provider is a deterministic feature-hashing embedder that
/// needs no network or API key. Remote providers use a Voyage-style JSON
/// embeddings API.
///
/// # Examples
///
/// ```
/// use recall_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, "local");
/// assert_eq!(config.dimensions, 384);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding provider (default: `"local"`).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// API key for remote providers.
    pub api_key: Option<String>,
    /// Model name for remote providers.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Custom base URL for the embeddings API.
    pub base_url: Option<String>,
    /// Embedding dimensions (default: 384). Changing this invalidates the
    /// stored vectors and requires a full re-index.
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
}

fn default_embedding_provider() -> String {
    "local".into()
}

fn default_embedding_model() -> String {
    "voyage-3-lite".into()
}

fn default_embedding_dimensions() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            model: default_embedding_model(),
            base_url: None,
            dimensions: default_embedding_dimensions(),
        }
    }
}

/// Chunking and file-selection configuration for indexing.
///
/// # Examples
///
/// ```
/// use recall_core::IndexConfig;
///
/// let config = IndexConfig::default();
/// assert_eq!(config.chunk_size_tokens, 400);
/// assert_eq!(config.overlap_tokens, 80);
/// assert!(config.patterns.iter().any(|p| p == "*.md"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Approximate token budget per chunk (default: 400).
    #[serde(default = "default_chunk_size_tokens")]
    pub chunk_size_tokens: usize,
    /// Approximate tokens of overlap seeded into the next chunk (default: 80).
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
    /// File name patterns to index (simple `*.ext` globs).
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
}

fn default_chunk_size_tokens() -> usize {
    400
}

fn default_overlap_tokens() -> usize {
    80
}

fn default_patterns() -> Vec<String> {
    vec!["*.md".into(), "*.txt".into()]
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: default_chunk_size_tokens(),
            overlap_tokens: default_overlap_tokens(),
            patterns: default_patterns(),
        }
    }
}

/// Hybrid search tuning.
///
/// The weights need not sum to 1; the hybrid score may exceed 1 only if the
/// caller configures weights that sum above 1.
///
/// # Examples
///
/// ```
/// use recall_core::SearchConfig;
///
/// let config = SearchConfig::default();
/// assert_eq!(config.limit, 10);
/// assert_eq!(config.min_score, 0.35);
/// assert_eq!(config.vector_weight, 0.7);
/// assert_eq!(config.keyword_weight, 0.3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum results to return (default: 10).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Minimum hybrid score for a result to be kept (default: 0.35).
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Weight of the normalized vector score (default: 0.7).
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    /// Weight of the normalized keyword score (default: 0.3).
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    /// Denominator used to normalize keyword scores when a query has no
    /// candidates to take a maximum over (default: 50.0). Corpus-dependent;
    /// treat as a tuning parameter.
    #[serde(default = "default_keyword_norm")]
    pub keyword_norm_default: f64,
}

fn default_limit() -> usize {
    10
}

fn default_min_score() -> f64 {
    0.35
}

fn default_vector_weight() -> f64 {
    0.7
}

fn default_keyword_weight() -> f64 {
    0.3
}

fn default_keyword_norm() -> f64 {
    50.0
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            min_score: default_min_score(),
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
            keyword_norm_default: default_keyword_norm(),
        }
    }
}
