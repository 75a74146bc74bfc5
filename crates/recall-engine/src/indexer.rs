//! Change-aware indexing of files and directory trees.
//!
//! Indexing is idempotent: a file whose content hash matches the stored one
//! is skipped without touching the embedding provider, so repeated runs over
//! an unchanged corpus cost one hash per file and zero embeddings.

use std::path::Path;
use std::sync::Arc;

use ignore::WalkBuilder;
use recall_core::{FileRecord, IndexConfig, IndexFileError, IndexSummary, RecallError};

use crate::chunker::chunk_text;
use crate::embedding::EmbeddingProvider;
use crate::hash::content_hash;
use crate::store::IndexStore;

/// Registry key for a path: the path as given, minus a leading `./`, so the
/// same file reached through `.` and through its bare name shares one record.
fn registry_key(path: &Path) -> String {
    let key = path.to_string_lossy();
    key.strip_prefix("./").unwrap_or(&key).to_string()
}

/// What happened to a single file during indexing.
#[derive(Debug, Clone, Copy)]
pub struct IndexOutcome {
    /// Chunk rows written for this file (0 when skipped).
    pub chunks_written: usize,
    /// True when the file was unchanged (or gone) and nothing was embedded.
    pub skipped: bool,
}

/// Drives chunking, embedding, and persistence for files and trees.
///
/// Borrows the store and shares the provider; the provider is the expensive
/// injected capability and is cloned by `Arc`, never rebuilt per file.
pub struct Indexer<'a> {
    store: &'a IndexStore,
    provider: Arc<dyn EmbeddingProvider>,
    chunk_size_tokens: usize,
    overlap_tokens: usize,
}

impl<'a> Indexer<'a> {
    /// Create an indexer over `store` using `provider` for embeddings.
    pub fn new(
        store: &'a IndexStore,
        provider: Arc<dyn EmbeddingProvider>,
        config: &IndexConfig,
    ) -> Self {
        Self {
            store,
            provider,
            chunk_size_tokens: config.chunk_size_tokens,
            overlap_tokens: config.overlap_tokens,
        }
    }

    /// Index a single file, skipping unchanged content unless `force`.
    ///
    /// A path that no longer exists on disk is tombstoned: its registry
    /// record is marked deleted and its chunks are dropped, so stale results
    /// never surface. If embedding fails the stored state is untouched and
    /// the file will be retried on the next run.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Io`] if the file cannot be read,
    /// [`RecallError::Embedding`] if the provider fails, or
    /// [`RecallError::Database`] on persistence failure.
    pub async fn index_file(&self, path: &Path, force: bool) -> Result<IndexOutcome, RecallError> {
        let key = registry_key(path);

        if !path.exists() {
            self.store.mark_file_deleted(&key)?;
            return Ok(IndexOutcome {
                chunks_written: 0,
                skipped: true,
            });
        }

        let content = std::fs::read_to_string(path)?;
        let hash = content_hash(&content);

        if !force && self.store.file_hash(&key)?.as_deref() == Some(hash.as_str()) {
            return Ok(IndexOutcome {
                chunks_written: 0,
                skipped: true,
            });
        }

        let chunks = chunk_text(&content, self.chunk_size_tokens, self.overlap_tokens);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.provider.embed_batch(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(RecallError::Embedding(format!(
                "provider returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let pairs: Vec<_> = chunks.into_iter().zip(vectors).collect();
        let written = self.store.replace_chunks(&key, &pairs)?;

        let metadata = std::fs::metadata(path)?;
        let modified_time = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        self.store.upsert_file(&FileRecord {
            path: key,
            content_hash: hash,
            modified_time,
            size_bytes: metadata.len(),
            indexed_at: chrono::Utc::now().to_rfc3339(),
            deleted: false,
        })?;

        Ok(IndexOutcome {
            chunks_written: written,
            skipped: false,
        })
    }

    /// Walk a directory tree and index every file matching `patterns`.
    ///
    /// Hidden files and gitignored paths are skipped by the walker. With
    /// `force` set, every matched file is re-embedded regardless of its
    /// stored hash. A failure on one file is recorded in the summary and
    /// does not stop the run. `on_progress` is called with each matched
    /// path before it is processed.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Config`] if a pattern is malformed. Per-file
    /// failures are collected into [`IndexSummary::errors`] instead.
    pub async fn index_directory(
        &self,
        root: &Path,
        patterns: &[String],
        force: bool,
        mut on_progress: impl FnMut(&Path),
    ) -> Result<IndexSummary, RecallError> {
        let globs: Vec<glob::Pattern> = patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| RecallError::Config(format!("invalid pattern '{p}': {e}")))
            })
            .collect::<Result<_, _>>()?;

        let mut summary = IndexSummary::default();

        for entry in WalkBuilder::new(root).build() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    summary.errors.push(IndexFileError {
                        path: root.display().to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            if !globs.iter().any(|g| g.matches(name)) {
                continue;
            }

            on_progress(path);
            match self.index_file(path, force).await {
                Ok(outcome) if outcome.skipped => summary.files_skipped += 1,
                Ok(outcome) => {
                    summary.files_indexed += 1;
                    summary.chunks_created += outcome.chunks_written;
                }
                Err(e) => summary.errors.push(IndexFileError {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }),
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::LocalEmbedder;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn dimensions(&self) -> usize {
            8
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RecallError> {
            Err(RecallError::Embedding("provider unavailable".into()))
        }
    }

    fn local_provider() -> Arc<dyn EmbeddingProvider> {
        Arc::new(LocalEmbedder::new(64))
    }

    fn test_config() -> IndexConfig {
        IndexConfig {
            chunk_size_tokens: 50,
            overlap_tokens: 10,
            patterns: vec!["*.md".into(), "*.txt".into()],
        }
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn new_file_is_chunked_and_stored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "notes.md", "encryption uses AES-256 keys\n");

        let store = IndexStore::in_memory(64).unwrap();
        let indexer = Indexer::new(&store, local_provider(), &test_config());

        let outcome = indexer.index_file(&path, false).await.unwrap();
        assert!(!outcome.skipped);
        assert_eq!(outcome.chunks_written, 1);
        assert_eq!(store.stats().unwrap().total_chunks, 1);
    }

    #[tokio::test]
    async fn unchanged_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "notes.md", "stable content here\n");

        let store = IndexStore::in_memory(64).unwrap();
        let indexer = Indexer::new(&store, local_provider(), &test_config());

        indexer.index_file(&path, false).await.unwrap();
        let first_ts = store
            .file_indexed_at(&path.to_string_lossy())
            .unwrap()
            .unwrap();

        let outcome = indexer.index_file(&path, false).await.unwrap();
        assert!(outcome.skipped);
        assert_eq!(outcome.chunks_written, 0);
        let second_ts = store
            .file_indexed_at(&path.to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(first_ts, second_ts, "skip must not touch the record");
    }

    #[tokio::test]
    async fn force_reindexes_unchanged_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "notes.md", "stable content here\n");

        let store = IndexStore::in_memory(64).unwrap();
        let indexer = Indexer::new(&store, local_provider(), &test_config());

        indexer.index_file(&path, false).await.unwrap();
        let outcome = indexer.index_file(&path, true).await.unwrap();
        assert!(!outcome.skipped);
        assert_eq!(store.stats().unwrap().total_chunks, 1);
    }

    #[tokio::test]
    async fn modified_file_replaces_its_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "notes.md", "original wording\n");

        let store = IndexStore::in_memory(64).unwrap();
        let indexer = Indexer::new(&store, local_provider(), &test_config());
        indexer.index_file(&path, false).await.unwrap();

        std::fs::write(&path, "rewritten wording\n").unwrap();
        let outcome = indexer.index_file(&path, false).await.unwrap();
        assert!(!outcome.skipped);

        assert!(store.keyword_search("original", 5).unwrap().is_empty());
        assert_eq!(store.keyword_search("rewritten", 5).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_tombstoned() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "gone.md", "soon deleted\n");

        let store = IndexStore::in_memory(64).unwrap();
        let indexer = Indexer::new(&store, local_provider(), &test_config());
        indexer.index_file(&path, false).await.unwrap();

        std::fs::remove_file(&path).unwrap();
        let outcome = indexer.index_file(&path, false).await.unwrap();
        assert!(outcome.skipped);

        let key = path.to_string_lossy();
        assert!(store.file_deleted(&key).unwrap());
        assert!(store.keyword_search("deleted", 5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn embed_failure_leaves_stored_state_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "notes.md", "content to embed\n");

        let store = IndexStore::in_memory(8).unwrap();
        let failing = Indexer::new(&store, Arc::new(FailingProvider), &test_config());
        assert!(failing.index_file(&path, false).await.is_err());

        // No hash was recorded, so a working provider picks the file up.
        let key = path.to_string_lossy();
        assert!(store.file_hash(&key).unwrap().is_none());
        assert_eq!(store.stats().unwrap().total_chunks, 0);
    }

    #[tokio::test]
    async fn empty_file_yields_record_but_no_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "empty.md", "");

        let store = IndexStore::in_memory(64).unwrap();
        let indexer = Indexer::new(&store, local_provider(), &test_config());

        let outcome = indexer.index_file(&path, false).await.unwrap();
        assert!(!outcome.skipped);
        assert_eq!(outcome.chunks_written, 0);
        assert!(store.file_hash(&path.to_string_lossy()).unwrap().is_some());
    }

    #[tokio::test]
    async fn directory_walk_honors_patterns() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.md", "first document\n");
        write_file(dir.path(), "b.txt", "second document\n");
        write_file(dir.path(), "c.rs", "fn main() {}\n");

        let store = IndexStore::in_memory(64).unwrap();
        let indexer = Indexer::new(&store, local_provider(), &test_config());

        let mut seen = Vec::new();
        let summary = indexer
            .index_directory(dir.path(), &["*.md".into(), "*.txt".into()], false, |p| {
                seen.push(p.to_path_buf())
            })
            .await
            .unwrap();

        assert_eq!(summary.files_indexed, 2);
        assert_eq!(summary.files_skipped, 0);
        assert!(summary.errors.is_empty());
        assert_eq!(seen.len(), 2);
        assert!(!seen.iter().any(|p| p.extension().unwrap() == "rs"));
    }

    #[tokio::test]
    async fn second_walk_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.md", "first document\n");
        write_file(dir.path(), "b.md", "second document\n");

        let store = IndexStore::in_memory(64).unwrap();
        let indexer = Indexer::new(&store, local_provider(), &test_config());

        indexer
            .index_directory(dir.path(), &["*.md".into()], false, |_| {})
            .await
            .unwrap();
        let summary = indexer
            .index_directory(dir.path(), &["*.md".into()], false, |_| {})
            .await
            .unwrap();

        assert_eq!(summary.files_indexed, 0);
        assert_eq!(summary.files_skipped, 2);
        assert_eq!(summary.chunks_created, 0);
    }

    #[tokio::test]
    async fn one_bad_file_does_not_stop_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "good.md", "readable text\n");
        // Invalid UTF-8 makes read_to_string fail.
        std::fs::write(dir.path().join("bad.md"), [0xff, 0xfe, 0x00, 0x01]).unwrap();

        let store = IndexStore::in_memory(64).unwrap();
        let indexer = Indexer::new(&store, local_provider(), &test_config());

        let summary = indexer
            .index_directory(dir.path(), &["*.md".into()], false, |_| {})
            .await
            .unwrap();

        assert_eq!(summary.files_indexed, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].path.contains("bad.md"));
    }

    #[tokio::test]
    async fn invalid_pattern_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::in_memory(64).unwrap();
        let indexer = Indexer::new(&store, local_provider(), &test_config());

        let result = indexer
            .index_directory(dir.path(), &["[".into()], false, |_| {})
            .await;
        assert!(matches!(result, Err(RecallError::Config(_))));
    }
}
