//! Hybrid query execution: vector and keyword paths fused into one ranking.
//!
//! Both retrieval paths over-fetch, scores are normalized into `[0, 1]`,
//! and candidates are merged by chunk id so a chunk found by both paths
//! gets credit from both. One failing path degrades the search rather than
//! failing it; only both paths failing is an error.

use std::collections::HashMap;
use std::sync::Arc;

use recall_core::{RecallError, SearchConfig, SearchResult};

use crate::embedding::EmbeddingProvider;
use crate::scorer;
use crate::store::IndexStore;

/// Over-fetch factor applied to each retrieval path before fusion, so a
/// chunk ranked poorly by one path can still win on the combined score.
const CANDIDATE_FACTOR: usize = 3;

/// Executes hybrid searches against an [`IndexStore`].
pub struct SearchEngine<'a> {
    store: &'a IndexStore,
    provider: Arc<dyn EmbeddingProvider>,
    vector_weight: f64,
    keyword_weight: f64,
    keyword_norm_default: f64,
}

impl<'a> SearchEngine<'a> {
    /// Create a search engine over `store` using `provider` for query
    /// embeddings and the weights from `config`.
    pub fn new(
        store: &'a IndexStore,
        provider: Arc<dyn EmbeddingProvider>,
        config: &SearchConfig,
    ) -> Self {
        Self {
            store,
            provider,
            vector_weight: config.vector_weight,
            keyword_weight: config.keyword_weight,
            keyword_norm_default: config.keyword_norm_default,
        }
    }

    /// Run a hybrid search, returning at most `limit` results scoring at
    /// least `min_score`, best first.
    ///
    /// Ordering is total: ties on the hybrid score break on ascending chunk
    /// id, so identical queries against an identical index always return
    /// the identical list.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Query`] for an empty query or when both
    /// retrieval paths fail; a single failing path only degrades the result.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<SearchResult>, RecallError> {
        if query.trim().is_empty() {
            return Err(RecallError::Query("query must not be empty".into()));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }
        let fetch = limit.saturating_mul(CANDIDATE_FACTOR);

        let vector_result = match self.provider.embed(query).await {
            Ok(vector) => self.store.vector_search(&vector, fetch),
            Err(e) => Err(e),
        };
        let keyword_result = self.store.keyword_search(query, fetch);

        let (vector_hits, keyword_hits) = match (vector_result, keyword_result) {
            (Err(v), Err(k)) => {
                return Err(RecallError::Query(format!(
                    "both retrieval paths failed: vector: {v}; keyword: {k}"
                )))
            }
            (Ok(v), Ok(k)) => (v, k),
            (Ok(v), Err(_)) => (v, Vec::new()),
            (Err(_), Ok(k)) => (Vec::new(), k),
        };

        // Merge by chunk id; a path that missed a chunk contributes zero.
        let mut merged: HashMap<i64, (f64, f64)> = HashMap::new();
        for hit in &vector_hits {
            merged.entry(hit.chunk_id).or_insert((0.0, 0.0)).0 =
                scorer::normalize_vector(hit.distance);
        }
        let max_keyword = keyword_hits
            .iter()
            .map(|h| h.raw_score)
            .fold(0.0f64, f64::max);
        for hit in &keyword_hits {
            merged.entry(hit.chunk_id).or_insert((0.0, 0.0)).1 =
                scorer::normalize_keyword(hit.raw_score, max_keyword, self.keyword_norm_default);
        }

        let mut scored: Vec<(i64, f64, f64, f64)> = merged
            .into_iter()
            .map(|(id, (v, k))| {
                let hybrid = scorer::combine(v, k, self.vector_weight, self.keyword_weight);
                (id, v, k, hybrid)
            })
            .filter(|&(_, _, _, hybrid)| hybrid >= min_score)
            .collect();

        scored.sort_by(|a, b| {
            b.3.partial_cmp(&a.3)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        let ids: Vec<i64> = scored.iter().map(|&(id, ..)| id).collect();
        let chunks = self.store.chunks_by_ids(&ids)?;

        let mut results = Vec::with_capacity(scored.len());
        for (id, vector_score, keyword_score, hybrid_score) in scored {
            // A chunk deleted between candidate fetch and hydration is
            // silently dropped.
            let Some(chunk) = chunks.get(&id) else {
                continue;
            };
            results.push(SearchResult {
                chunk_id: id,
                path: chunk.path.clone(),
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                text: chunk.text.clone(),
                vector_score,
                keyword_score,
                hybrid_score,
            });
        }
        Ok(results)
    }
}
