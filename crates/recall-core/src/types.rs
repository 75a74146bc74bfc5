use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Registry entry for one indexed source file.
///
/// One record per distinct path. Records are never physically removed; when
/// the underlying file disappears the `deleted` flag is set instead, which
/// preserves history for diagnostics.
///
/// # Examples
///
/// ```
/// use recall_core::FileRecord;
///
/// let record = FileRecord {
///     path: "notes/meeting.md".into(),
///     content_hash: "abc123".into(),
///     modified_time: 1_700_000_000,
///     size_bytes: 2048,
///     indexed_at: "2026-08-23T10:00:00Z".into(),
///     deleted: false,
/// };
/// assert!(!record.deleted);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Source path, unique within the index.
    pub path: String,
    /// Digest of the file content at index time.
    pub content_hash: String,
    /// Filesystem modification time (Unix seconds).
    pub modified_time: i64,
    /// File size in bytes.
    pub size_bytes: u64,
    /// RFC 3339 timestamp of the last successful index.
    pub indexed_at: String,
    /// Whether the file has disappeared since it was last indexed.
    pub deleted: bool,
}

/// A single hit from hybrid search.
///
/// All scores are floats in `[0, 1]`, except `hybrid_score`, which can exceed
/// 1 only when caller-supplied weights sum to more than 1.
///
/// # Examples
///
/// ```
/// use recall_core::SearchResult;
///
/// let hit = SearchResult {
///     chunk_id: 7,
///     path: "notes/crypto.md".into(),
///     start_line: 1,
///     end_line: 12,
///     text: "AES-256 key rotation".into(),
///     vector_score: 0.82,
///     keyword_score: 1.0,
///     hybrid_score: 0.874,
/// };
/// assert!(hit.hybrid_score > 0.35);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Identifier of the matched chunk.
    pub chunk_id: i64,
    /// Path of the owning file.
    pub path: String,
    /// First line of the chunk (1-based, inclusive).
    pub start_line: u32,
    /// Last line of the chunk (1-based, inclusive).
    pub end_line: u32,
    /// The chunk text.
    pub text: String,
    /// Normalized vector similarity, 0 when the vector path found nothing.
    pub vector_score: f64,
    /// Normalized keyword relevance, 0 when the keyword path found nothing.
    pub keyword_score: f64,
    /// Weighted fusion of the two scores.
    pub hybrid_score: f64,
}

/// Structured outcome of a batch indexing run.
///
/// Batch operations never abort on a single bad file; per-file failures are
/// collected in `errors` so callers can report partial success.
///
/// # Examples
///
/// ```
/// use recall_core::IndexSummary;
///
/// let summary = IndexSummary::default();
/// assert_eq!(summary.files_indexed, 0);
/// assert!(summary.errors.is_empty());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    /// Files whose chunks were (re)written.
    pub files_indexed: usize,
    /// Files skipped because their content hash was unchanged or they vanished.
    pub files_skipped: usize,
    /// Total chunks written across all indexed files.
    pub chunks_created: usize,
    /// Per-file failures; the batch continued past each of these.
    pub errors: Vec<IndexFileError>,
}

/// A single per-file failure recorded during a batch indexing run.
///
/// # Examples
///
/// ```
/// use recall_core::IndexFileError;
///
/// let err = IndexFileError {
///     path: "notes/corrupt.md".into(),
///     message: "invalid UTF-8".into(),
/// };
/// assert!(err.message.contains("UTF-8"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFileError {
    /// Path of the file that failed.
    pub path: String,
    /// Human-readable failure description.
    pub message: String,
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument
/// parsing.
///
/// # Examples
///
/// ```
/// use recall_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn output_format_default_is_text() {
        assert_eq!(OutputFormat::default(), OutputFormat::Text);
    }

    #[test]
    fn search_result_serializes_camel_case() {
        let hit = SearchResult {
            chunk_id: 1,
            path: "a.md".into(),
            start_line: 1,
            end_line: 2,
            text: "hello".into(),
            vector_score: 0.5,
            keyword_score: 0.0,
            hybrid_score: 0.35,
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert!(json.get("startLine").is_some());
        assert!(json.get("hybridScore").is_some());
        assert!(json.get("start_line").is_none());
    }

    #[test]
    fn file_record_serializes_camel_case() {
        let record = FileRecord {
            path: "a.md".into(),
            content_hash: "h".into(),
            modified_time: 0,
            size_bytes: 1,
            indexed_at: "2026-01-01T00:00:00Z".into(),
            deleted: true,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("contentHash").is_some());
        assert!(json.get("sizeBytes").is_some());
    }

    #[test]
    fn index_summary_roundtrips_through_json() {
        let summary = IndexSummary {
            files_indexed: 2,
            files_skipped: 1,
            chunks_created: 9,
            errors: vec![IndexFileError {
                path: "bad.md".into(),
                message: "boom".into(),
            }],
        };
        let json = serde_json::to_string(&summary).unwrap();
        let back: IndexSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.files_indexed, 2);
        assert_eq!(back.errors.len(), 1);
        assert_eq!(back.errors[0].path, "bad.md");
    }
}
