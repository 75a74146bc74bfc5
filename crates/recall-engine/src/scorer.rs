//! Pure score normalization and fusion.
//!
//! Raw vector distances and raw keyword ranks live on incompatible scales,
//! so both are mapped into `[0, 1]` before being fused with fixed weights.

/// Default weight of the normalized vector score.
pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.7;
/// Default weight of the normalized keyword score.
pub const DEFAULT_KEYWORD_WEIGHT: f64 = 0.3;
/// Denominator used when a query has no keyword candidates to take a
/// maximum over. Corpus-dependent; exposed as a config knob.
pub const DEFAULT_KEYWORD_NORM: f64 = 50.0;

/// Map a cosine distance in `[0, 2]` to a similarity in `[0, 1]`.
///
/// Distance 0 means identical direction (score 1), distance 2 means
/// opposite (score 0), linear in between.
///
/// # Examples
///
/// ```
/// use recall_engine::scorer::normalize_vector;
///
/// assert_eq!(normalize_vector(0.0), 1.0);
/// assert_eq!(normalize_vector(2.0), 0.0);
/// assert_eq!(normalize_vector(1.0), 0.5);
/// assert_eq!(normalize_vector(-0.5), 1.0);
/// assert_eq!(normalize_vector(9.0), 0.0);
/// ```
pub fn normalize_vector(distance: f64) -> f64 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

/// Normalize a raw keyword score against the maximum observed in the
/// current query's candidate set.
///
/// Raw BM25 magnitudes are not comparable across queries or corpora, so the
/// normalization is per-query: the best candidate defines the scale. When
/// no candidate exists to take a maximum over, `fallback` is the
/// denominator instead.
///
/// # Examples
///
/// ```
/// use recall_engine::scorer::normalize_keyword;
///
/// assert_eq!(normalize_keyword(5.0, 10.0, 50.0), 0.5);
/// assert_eq!(normalize_keyword(10.0, 10.0, 50.0), 1.0);
/// // No observed maximum: fall back to the fixed default.
/// assert_eq!(normalize_keyword(25.0, 0.0, 50.0), 0.5);
/// ```
pub fn normalize_keyword(raw_score: f64, max_observed: f64, fallback: f64) -> f64 {
    let denominator = if max_observed > 0.0 {
        max_observed
    } else {
        fallback.max(f64::EPSILON)
    };
    (raw_score / denominator).clamp(0.0, 1.0)
}

/// Fuse the two normalized scores with fixed weights.
///
/// Weights are configurable and need not sum to 1; keeping them summing to
/// 1 is the caller's responsibility if scores must stay within `[0, 1]`.
///
/// # Examples
///
/// ```
/// use recall_engine::scorer::combine;
///
/// assert_eq!(combine(1.0, 1.0, 0.7, 0.3), 1.0);
/// assert_eq!(combine(1.0, 0.0, 0.7, 0.3), 0.7);
/// assert_eq!(combine(0.0, 1.0, 0.7, 0.3), 0.3);
/// ```
pub fn combine(vector_score: f64, keyword_score: f64, vector_weight: f64, keyword_weight: f64) -> f64 {
    vector_weight * vector_score + keyword_weight * keyword_score
}
