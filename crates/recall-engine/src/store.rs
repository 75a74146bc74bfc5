//! SQLite persistence for files, chunks, keyword postings, and vectors.
//!
//! Chunks live in SQLite with an FTS5 index kept in lockstep by triggers and
//! embeddings stored as little-endian f32 BLOBs. Vector search goes through
//! a backend chosen once at open time: a native `vec0` similarity index when
//! the runtime SQLite provides one, or a brute-force cosine scan otherwise.
//! Callers observe identical results either way; only latency differs.

use std::collections::HashMap;
use std::path::Path;

use recall_core::{FileRecord, RecallError};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::chunker::Chunk;

/// Versioned schema migrations, applied in order exactly once each.
///
/// Never edit an existing entry; append a new one.
const MIGRATIONS: &[&str] = &[
    // 1: initial schema
    "
    CREATE TABLE meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE files (
        path TEXT PRIMARY KEY,
        content_hash TEXT NOT NULL,
        mtime INTEGER NOT NULL,
        size INTEGER NOT NULL,
        indexed_at TEXT NOT NULL,
        deleted INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        text TEXT NOT NULL,
        hash TEXT NOT NULL,
        embedding BLOB,
        UNIQUE(path, hash)
    );

    CREATE INDEX idx_chunks_path ON chunks(path);

    CREATE VIRTUAL TABLE chunks_fts USING fts5(
        text,
        content='chunks', content_rowid='id'
    );

    CREATE TRIGGER chunks_ai AFTER INSERT ON chunks BEGIN
        INSERT INTO chunks_fts(rowid, text) VALUES (new.id, new.text);
    END;

    CREATE TRIGGER chunks_ad AFTER DELETE ON chunks BEGIN
        INSERT INTO chunks_fts(chunks_fts, rowid, text)
        VALUES ('delete', old.id, old.text);
    END;

    CREATE TRIGGER chunks_au AFTER UPDATE ON chunks BEGIN
        INSERT INTO chunks_fts(chunks_fts, rowid, text)
        VALUES ('delete', old.id, old.text);
        INSERT INTO chunks_fts(rowid, text) VALUES (new.id, new.text);
    END;
    ",
];

/// How vector similarity queries are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VectorBackend {
    /// A `vec0` virtual table with a cosine distance metric.
    Native,
    /// Exhaustive scan over the stored embedding BLOBs.
    Scan,
}

/// A keyword-path candidate.
///
/// `raw_score` is sign-normalized so that higher always means more relevant,
/// regardless of the convention of the underlying ranking function.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    /// Identifier of the matched chunk.
    pub chunk_id: i64,
    /// Sign-normalized BM25 relevance, higher is better.
    pub raw_score: f64,
}

/// A vector-path candidate.
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// Identifier of the matched chunk.
    pub chunk_id: i64,
    /// Cosine distance in `[0, 2]`, 0 meaning identical.
    pub distance: f64,
}

/// A chunk row without its embedding, for result hydration.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    /// Row id, stable until the owning file is re-chunked.
    pub id: i64,
    /// Owning file path.
    pub path: String,
    /// First line (1-based, inclusive).
    pub start_line: u32,
    /// Last line (1-based, inclusive).
    pub end_line: u32,
    /// The chunk text.
    pub text: String,
}

/// Index statistics.
///
/// # Examples
///
/// ```
/// use recall_engine::store::IndexStore;
///
/// let store = IndexStore::in_memory(4).unwrap();
/// let stats = store.stats().unwrap();
/// assert_eq!(stats.total_chunks, 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Files currently tracked (including deletion markers).
    pub total_files: usize,
    /// Files marked deleted.
    pub deleted_files: usize,
    /// Chunks in the index.
    pub total_chunks: usize,
    /// Database size in bytes.
    pub index_size_bytes: u64,
}

/// Durable storage for the file registry, chunk registry, keyword postings,
/// and vector postings.
///
/// Single-writer, any-reader: only the indexer mutates; searches are
/// read-only and see each `replace_chunks` atomically.
///
/// # Examples
///
/// ```
/// use recall_engine::store::IndexStore;
///
/// let store = IndexStore::in_memory(384).unwrap();
/// assert!(store.file_hash("nope.md").unwrap().is_none());
/// ```
pub struct IndexStore {
    conn: Connection,
    vector: VectorBackend,
    dimensions: usize,
}

impl IndexStore {
    /// Open or create an index database at the given path.
    ///
    /// Applies pending schema migrations, records the embedding dimensions,
    /// and probes for a native vector-search facility, silently falling back
    /// to the scan backend when none is available. The probe is capability
    /// negotiation, not a failure, and is never surfaced to callers.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Database`] if the database cannot be opened,
    /// a migration fails, or `dimensions` conflicts with an existing index.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use recall_engine::store::IndexStore;
    ///
    /// let store = IndexStore::open(Path::new(".recall/index.db"), 384).unwrap();
    /// ```
    pub fn open(path: &Path, dimensions: usize) -> Result<Self, RecallError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RecallError::Database(format!("failed to create index directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| RecallError::Database(format!("failed to open database: {e}")))?;
        Self::init(conn, dimensions)
    }

    /// Create an in-memory index (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Database`] if schema creation fails.
    pub fn in_memory(dimensions: usize) -> Result<Self, RecallError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            RecallError::Database(format!("failed to create in-memory database: {e}"))
        })?;
        Self::init(conn, dimensions)
    }

    fn init(conn: Connection, dimensions: usize) -> Result<Self, RecallError> {
        migrate(&conn)?;
        let vector = probe_vector_backend(&conn, dimensions);
        let store = Self {
            conn,
            vector,
            dimensions,
        };
        store.set_dimensions(dimensions)?;
        Ok(store)
    }

    /// Embedding dimensions this store was opened with.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Name of the active vector backend (`"native"` or `"scan"`).
    pub fn vector_backend(&self) -> &'static str {
        match self.vector {
            VectorBackend::Native => "native",
            VectorBackend::Scan => "scan",
        }
    }

    /// Record the embedding dimensions in the meta table.
    ///
    /// A no-op when dimensions are already stored and match.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Database`] if dimensions conflict with an
    /// existing index.
    pub fn set_dimensions(&self, dimensions: usize) -> Result<(), RecallError> {
        if let Some(stored) = self.get_dimensions()? {
            if stored != dimensions {
                return Err(RecallError::Database(format!(
                    "index was built with {stored}-dimensional embeddings but the provider \
                     produces {dimensions}; run a full re-index to rebuild"
                )));
            }
            return Ok(());
        }
        self.set_meta("embedding_dimensions", &dimensions.to_string())
    }

    /// Get the embedding dimensions stored in the meta table, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Database`] on query failure.
    pub fn get_dimensions(&self) -> Result<Option<usize>, RecallError> {
        match self.get_meta("embedding_dimensions")? {
            Some(v) => {
                let dims: usize = v.parse().map_err(|_| {
                    RecallError::Database(format!("corrupted dimension metadata: '{v}'"))
                })?;
                Ok(Some(dims))
            }
            None => Ok(None),
        }
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>, RecallError> {
        let result = self.conn.query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(RecallError::Database(format!(
                "failed to get meta '{key}': {e}"
            ))),
        }
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<(), RecallError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| RecallError::Database(format!("failed to set meta '{key}': {e}")))?;
        Ok(())
    }

    /// Insert or refresh a file registry record.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Database`] on write failure.
    pub fn upsert_file(&self, record: &FileRecord) -> Result<(), RecallError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO files (path, content_hash, mtime, size, indexed_at, deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.path,
                    record.content_hash,
                    record.modified_time,
                    record.size_bytes as i64,
                    record.indexed_at,
                    record.deleted as i64,
                ],
            )
            .map_err(|e| RecallError::Database(format!("failed to upsert file: {e}")))?;
        Ok(())
    }

    /// Mark a file's registry record deleted and drop its chunks.
    ///
    /// The registry row is kept as a deletion marker for diagnostics; the
    /// chunks (and their keyword/vector postings) are removed so vanished
    /// files never surface in search results. A no-op for unknown paths.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Database`] on write failure.
    pub fn mark_file_deleted(&self, path: &str) -> Result<(), RecallError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| RecallError::Database(format!("failed to begin transaction: {e}")))?;

        if self.vector == VectorBackend::Native {
            tx.execute(
                "DELETE FROM chunk_vectors WHERE chunk_id IN
                     (SELECT id FROM chunks WHERE path = ?1)",
                params![path],
            )
            .map_err(|e| RecallError::Database(format!("failed to delete vectors: {e}")))?;
        }
        tx.execute("DELETE FROM chunks WHERE path = ?1", params![path])
            .map_err(|e| RecallError::Database(format!("failed to delete chunks: {e}")))?;
        tx.execute(
            "UPDATE files SET deleted = 1 WHERE path = ?1",
            params![path],
        )
        .map_err(|e| RecallError::Database(format!("failed to mark file deleted: {e}")))?;

        tx.commit()
            .map_err(|e| RecallError::Database(format!("failed to commit: {e}")))?;
        Ok(())
    }

    /// Get the stored content hash for a live (non-deleted) file.
    ///
    /// Returns `None` for unknown paths and for deletion markers, so a file
    /// that reappears after deletion is always re-indexed.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Database`] on query failure.
    pub fn file_hash(&self, path: &str) -> Result<Option<String>, RecallError> {
        let result = self.conn.query_row(
            "SELECT content_hash FROM files WHERE path = ?1 AND deleted = 0",
            params![path],
            |row| row.get(0),
        );
        match result {
            Ok(hash) => Ok(Some(hash)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(RecallError::Database(format!(
                "failed to get file hash: {e}"
            ))),
        }
    }

    /// Get the `indexed_at` timestamp recorded for a path, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Database`] on query failure.
    pub fn file_indexed_at(&self, path: &str) -> Result<Option<String>, RecallError> {
        let result = self.conn.query_row(
            "SELECT indexed_at FROM files WHERE path = ?1",
            params![path],
            |row| row.get(0),
        );
        match result {
            Ok(ts) => Ok(Some(ts)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(RecallError::Database(format!(
                "failed to get indexed_at: {e}"
            ))),
        }
    }

    /// Whether a path is currently marked deleted.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Database`] on query failure.
    pub fn file_deleted(&self, path: &str) -> Result<bool, RecallError> {
        let result = self.conn.query_row(
            "SELECT deleted FROM files WHERE path = ?1",
            params![path],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(flag) => Ok(flag != 0),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(RecallError::Database(format!(
                "failed to get deleted flag: {e}"
            ))),
        }
    }

    /// Atomically replace all chunks for `path` with the given set.
    ///
    /// All-or-nothing: a failure mid-way rolls back, so stale and new chunks
    /// never coexist. Keyword postings follow via triggers and vector
    /// postings are rewritten in the same transaction, so the very next
    /// search sees the new chunk set. Chunks whose `(path, hash)` pair
    /// repeats within the set are stored once.
    ///
    /// Returns the number of chunk rows written.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Database`] on write failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use recall_engine::chunker::chunk_text;
    /// use recall_engine::store::IndexStore;
    ///
    /// let store = IndexStore::in_memory(3).unwrap();
    /// let chunks = chunk_text("hello world", 400, 80);
    /// let pairs: Vec<_> = chunks
    ///     .into_iter()
    ///     .map(|c| (c, vec![1.0f32, 0.0, 0.0]))
    ///     .collect();
    /// assert_eq!(store.replace_chunks("a.md", &pairs).unwrap(), 1);
    /// ```
    pub fn replace_chunks(
        &self,
        path: &str,
        chunks: &[(Chunk, Vec<f32>)],
    ) -> Result<usize, RecallError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| RecallError::Database(format!("failed to begin transaction: {e}")))?;

        if self.vector == VectorBackend::Native {
            tx.execute(
                "DELETE FROM chunk_vectors WHERE chunk_id IN
                     (SELECT id FROM chunks WHERE path = ?1)",
                params![path],
            )
            .map_err(|e| RecallError::Database(format!("failed to delete vectors: {e}")))?;
        }
        tx.execute("DELETE FROM chunks WHERE path = ?1", params![path])
            .map_err(|e| RecallError::Database(format!("failed to delete chunks: {e}")))?;

        let mut written = 0usize;
        for (chunk, embedding) in chunks {
            let changed = tx
                .execute(
                    "INSERT OR IGNORE INTO chunks
                         (path, start_line, end_line, text, hash, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        path,
                        chunk.start_line,
                        chunk.end_line,
                        chunk.text,
                        chunk.hash,
                        floats_to_bytes(embedding),
                    ],
                )
                .map_err(|e| RecallError::Database(format!("failed to insert chunk: {e}")))?;

            if changed == 1 {
                written += 1;
                if self.vector == VectorBackend::Native {
                    let chunk_id = tx.last_insert_rowid();
                    tx.execute(
                        "INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?1, ?2)",
                        params![chunk_id, floats_to_bytes(embedding)],
                    )
                    .map_err(|e| {
                        RecallError::Database(format!("failed to insert vector: {e}"))
                    })?;
                }
            }
        }

        tx.commit()
            .map_err(|e| RecallError::Database(format!("failed to commit: {e}")))?;
        Ok(written)
    }

    /// Full-text keyword search, best match first.
    ///
    /// The underlying BM25 rank reports better matches as more negative
    /// numbers; scores returned here are sign-normalized so higher is
    /// always better.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Database`] on query failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use recall_engine::store::IndexStore;
    ///
    /// let store = IndexStore::in_memory(4).unwrap();
    /// assert!(store.keyword_search("anything", 5).unwrap().is_empty());
    /// ```
    pub fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<KeywordHit>, RecallError> {
        let safe_query = sanitize_fts_query(query);
        if safe_query.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT rowid, rank FROM chunks_fts
                 WHERE chunks_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .map_err(|e| RecallError::Database(format!("failed to prepare FTS query: {e}")))?;

        let rows = stmt
            .query_map(params![safe_query, limit as i64], |row| {
                let chunk_id: i64 = row.get(0)?;
                let rank: f64 = row.get(1)?;
                Ok(KeywordHit {
                    chunk_id,
                    raw_score: (-rank).max(0.0),
                })
            })
            .map_err(|e| RecallError::Database(format!("FTS query failed: {e}")))?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row.map_err(|e| RecallError::Database(format!("failed to read FTS row: {e}")))?);
        }
        Ok(hits)
    }

    /// Vector similarity search, ascending cosine distance.
    ///
    /// Uses the native similarity index when one was detected at open time,
    /// otherwise an exhaustive scan with the same distance formula. Result
    /// shape and ordering are identical either way.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Database`] on query failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use recall_engine::store::IndexStore;
    ///
    /// let store = IndexStore::in_memory(2).unwrap();
    /// assert!(store.vector_search(&[1.0, 0.0], 5).unwrap().is_empty());
    /// ```
    pub fn vector_search(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>, RecallError> {
        match self.vector {
            VectorBackend::Native => self.vector_search_native(query_vector, limit),
            VectorBackend::Scan => self.vector_search_scan(query_vector, limit),
        }
    }

    fn vector_search_native(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>, RecallError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT chunk_id, distance FROM chunk_vectors
                 WHERE embedding MATCH ?1 AND k = ?2
                 ORDER BY distance",
            )
            .map_err(|e| RecallError::Database(format!("failed to prepare vector query: {e}")))?;

        let rows = stmt
            .query_map(
                params![floats_to_bytes(query_vector), limit as i64],
                |row| {
                    Ok(VectorHit {
                        chunk_id: row.get(0)?,
                        distance: row.get(1)?,
                    })
                },
            )
            .map_err(|e| RecallError::Database(format!("vector query failed: {e}")))?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(
                row.map_err(|e| RecallError::Database(format!("failed to read vector row: {e}")))?,
            );
        }
        Ok(hits)
    }

    fn vector_search_scan(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>, RecallError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, embedding FROM chunks WHERE embedding IS NOT NULL")
            .map_err(|e| RecallError::Database(format!("failed to prepare scan: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                let chunk_id: i64 = row.get(0)?;
                let bytes: Vec<u8> = row.get(1)?;
                Ok((chunk_id, bytes))
            })
            .map_err(|e| RecallError::Database(format!("scan query failed: {e}")))?;

        let mut hits = Vec::new();
        for row in rows {
            let (chunk_id, bytes) =
                row.map_err(|e| RecallError::Database(format!("failed to read row: {e}")))?;
            let embedding = bytes_to_floats(&bytes);
            let distance = 1.0 - cosine_similarity(query_vector, &embedding);
            hits.push(VectorHit { chunk_id, distance });
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Fetch chunk rows for the given ids, keyed by id.
    ///
    /// Unknown ids are silently absent from the map.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Database`] on query failure.
    pub fn chunks_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, StoredChunk>, RecallError> {
        let mut out = HashMap::with_capacity(ids.len());
        let mut stmt = self
            .conn
            .prepare("SELECT id, path, start_line, end_line, text FROM chunks WHERE id = ?1")
            .map_err(|e| RecallError::Database(format!("failed to prepare query: {e}")))?;

        for &id in ids {
            let result = stmt.query_row(params![id], |row| {
                Ok(StoredChunk {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    start_line: row.get(2)?,
                    end_line: row.get(3)?,
                    text: row.get(4)?,
                })
            });
            match result {
                Ok(chunk) => {
                    out.insert(id, chunk);
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {}
                Err(e) => {
                    return Err(RecallError::Database(format!(
                        "failed to fetch chunk {id}: {e}"
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Get index statistics.
    ///
    /// # Errors
    ///
    /// Returns [`RecallError::Database`] on query failure.
    pub fn stats(&self) -> Result<IndexStats, RecallError> {
        let total_files: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
            .map_err(|e| RecallError::Database(format!("failed to count files: {e}")))?;
        let deleted_files: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files WHERE deleted = 1", [], |row| {
                row.get(0)
            })
            .map_err(|e| RecallError::Database(format!("failed to count deleted files: {e}")))?;
        let total_chunks: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(|e| RecallError::Database(format!("failed to count chunks: {e}")))?;

        let page_count: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);
        let page_size: i64 = self
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(4096);

        Ok(IndexStats {
            total_files: total_files as usize,
            deleted_files: deleted_files as usize,
            total_chunks: total_chunks as usize,
            index_size_bytes: (page_count * page_size) as u64,
        })
    }
}

/// Apply pending schema migrations, idempotent by construction.
fn migrate(conn: &Connection) -> Result<(), RecallError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )
    .map_err(|e| RecallError::Database(format!("failed to create migrations table: {e}")))?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| RecallError::Database(format!("failed to read schema version: {e}")))?;

    for (i, sql) in MIGRATIONS.iter().enumerate() {
        let version = i as i64 + 1;
        if version <= current {
            continue;
        }
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RecallError::Database(format!("failed to begin migration: {e}")))?;
        tx.execute_batch(sql)
            .map_err(|e| RecallError::Database(format!("migration {version} failed: {e}")))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| RecallError::Database(format!("failed to record migration: {e}")))?;
        tx.commit()
            .map_err(|e| RecallError::Database(format!("failed to commit migration: {e}")))?;
    }
    Ok(())
}

/// Probe for a native vector-search facility.
///
/// Tries to create a `vec0` virtual table; when the runtime SQLite lacks the
/// module this fails and the store uses the scan backend instead. The
/// outcome is a capability, not an error.
fn probe_vector_backend(conn: &Connection, dimensions: usize) -> VectorBackend {
    let create = format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS chunk_vectors USING vec0(
            chunk_id INTEGER PRIMARY KEY,
            embedding float[{dimensions}] distance_metric=cosine
        )"
    );
    match conn.execute_batch(&create) {
        Ok(()) => VectorBackend::Native,
        Err(_) => VectorBackend::Scan,
    }
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(floats.len() * 4);
    for f in floats {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    let mut floats = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let arr: [u8; 4] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        floats.push(f32::from_le_bytes(arr));
    }
    floats
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for i in 0..a.len() {
        let ai = a[i] as f64;
        let bi = b[i] as f64;
        dot += ai * bi;
        norm_a += ai * ai;
        norm_b += bi * bi;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}

fn sanitize_fts_query(query: &str) -> String {
    // Split on the same boundaries unicode61 tokenizes on, then quote each
    // token. Neutralizes FTS5 operators, and hyphenated terms like AES-256
    // match the aes/256 tokens the document was indexed under.
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk_text;

    fn pairs(text: &str, embedding: Vec<f32>) -> Vec<(Chunk, Vec<f32>)> {
        chunk_text(text, 400, 80)
            .into_iter()
            .map(|c| (c, embedding.clone()))
            .collect()
    }

    fn sample_file(path: &str, hash: &str) -> FileRecord {
        FileRecord {
            path: path.into(),
            content_hash: hash.into(),
            modified_time: 1_700_000_000,
            size_bytes: 10,
            indexed_at: "2026-08-23T00:00:00Z".into(),
            deleted: false,
        }
    }

    #[test]
    fn open_applies_migrations_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("index.db");
        {
            let store = IndexStore::open(&db, 3).unwrap();
            store
                .replace_chunks("a.md", &pairs("persistent text", vec![1.0, 0.0, 0.0]))
                .unwrap();
        }
        // Reopening must not re-run migration 1.
        let store = IndexStore::open(&db, 3).unwrap();
        assert_eq!(store.stats().unwrap().total_chunks, 1);
    }

    #[test]
    fn dimension_mismatch_is_rejected_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("index.db");
        IndexStore::open(&db, 384).unwrap();

        let result = IndexStore::open(&db, 768);
        assert!(result.is_err());
        let err = result.err().unwrap().to_string();
        assert!(err.contains("384"));
        assert!(err.contains("768"));
    }

    #[test]
    fn bundled_sqlite_falls_back_to_scan_backend() {
        let store = IndexStore::in_memory(4).unwrap();
        assert_eq!(store.vector_backend(), "scan");
    }

    #[test]
    fn replace_chunks_then_search_sees_new_set() {
        let store = IndexStore::in_memory(3).unwrap();
        store
            .replace_chunks("a.md", &pairs("rotate encryption keys weekly", vec![1.0, 0.0, 0.0]))
            .unwrap();

        let kw = store.keyword_search("encryption", 5).unwrap();
        assert_eq!(kw.len(), 1);
        assert!(kw[0].raw_score >= 0.0);

        let vec = store.vector_search(&[1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(vec.len(), 1);
        assert!(vec[0].distance < 1e-6);
    }

    #[test]
    fn replace_chunks_removes_previous_set() {
        let store = IndexStore::in_memory(3).unwrap();
        store
            .replace_chunks("a.md", &pairs("old stale content", vec![1.0, 0.0, 0.0]))
            .unwrap();
        store
            .replace_chunks("a.md", &pairs("fresh new content", vec![0.0, 1.0, 0.0]))
            .unwrap();

        assert!(store.keyword_search("stale", 5).unwrap().is_empty());
        assert_eq!(store.keyword_search("fresh", 5).unwrap().len(), 1);
        assert_eq!(store.stats().unwrap().total_chunks, 1);
    }

    #[test]
    fn duplicate_chunk_text_is_stored_once() {
        let store = IndexStore::in_memory(2).unwrap();
        let chunk = chunk_text("repeated paragraph", 400, 80).remove(0);
        let set = vec![
            (chunk.clone(), vec![1.0f32, 0.0]),
            (chunk.clone(), vec![1.0f32, 0.0]),
        ];
        let written = store.replace_chunks("a.md", &set).unwrap();
        assert_eq!(written, 1);
        assert_eq!(store.stats().unwrap().total_chunks, 1);
    }

    #[test]
    fn vector_scan_orders_by_ascending_distance() {
        let store = IndexStore::in_memory(3).unwrap();
        store
            .replace_chunks("a.md", &pairs("alpha document", vec![1.0, 0.0, 0.0]))
            .unwrap();
        store
            .replace_chunks("b.md", &pairs("beta document", vec![0.0, 1.0, 0.0]))
            .unwrap();

        let hits = store.vector_search(&[0.9, 0.1, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits[0].distance < 0.5);

        let chunks = store.chunks_by_ids(&[hits[0].chunk_id]).unwrap();
        assert_eq!(chunks[&hits[0].chunk_id].path, "a.md");
    }

    #[test]
    fn keyword_scores_are_sign_normalized() {
        let store = IndexStore::in_memory(2).unwrap();
        store
            .replace_chunks(
                "a.md",
                &pairs("unique sesquipedalian token appears here", vec![1.0, 0.0]),
            )
            .unwrap();

        let hits = store.keyword_search("sesquipedalian", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].raw_score > 0.0, "higher must mean more relevant");
    }

    #[test]
    fn upsert_and_hash_lookup() {
        let store = IndexStore::in_memory(2).unwrap();
        assert!(store.file_hash("a.md").unwrap().is_none());

        store.upsert_file(&sample_file("a.md", "h1")).unwrap();
        assert_eq!(store.file_hash("a.md").unwrap().as_deref(), Some("h1"));

        store.upsert_file(&sample_file("a.md", "h2")).unwrap();
        assert_eq!(store.file_hash("a.md").unwrap().as_deref(), Some("h2"));
    }

    #[test]
    fn mark_deleted_keeps_record_but_drops_chunks() {
        let store = IndexStore::in_memory(2).unwrap();
        store.upsert_file(&sample_file("a.md", "h1")).unwrap();
        store
            .replace_chunks("a.md", &pairs("soon to vanish", vec![1.0, 0.0]))
            .unwrap();

        store.mark_file_deleted("a.md").unwrap();

        assert!(store.file_deleted("a.md").unwrap());
        // Deletion markers hide the hash so a reappearing file re-indexes.
        assert!(store.file_hash("a.md").unwrap().is_none());
        assert!(store.keyword_search("vanish", 5).unwrap().is_empty());

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.deleted_files, 1);
        assert_eq!(stats.total_chunks, 0);
    }

    #[test]
    fn stats_count_files_and_chunks() {
        let store = IndexStore::in_memory(2).unwrap();
        store.upsert_file(&sample_file("a.md", "h1")).unwrap();
        store.upsert_file(&sample_file("b.md", "h2")).unwrap();
        store
            .replace_chunks("a.md", &pairs("first file", vec![1.0, 0.0]))
            .unwrap();
        store
            .replace_chunks("b.md", &pairs("second file", vec![0.0, 1.0]))
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.deleted_files, 0);
        assert_eq!(stats.total_chunks, 2);
    }

    #[test]
    fn sanitize_strips_fts_operators() {
        assert_eq!(sanitize_fts_query("hello world"), "\"hello\" OR \"world\"");
        assert_eq!(sanitize_fts_query("a:b*c"), "\"a\" OR \"b\" OR \"c\"");
        assert_eq!(sanitize_fts_query("AES-256"), "\"AES\" OR \"256\"");
        assert_eq!(sanitize_fts_query("\"(){}\""), "");
        assert!(store_accepts_hostile_query());
    }

    #[test]
    fn hyphenated_query_terms_get_keyword_credit() {
        let store = IndexStore::in_memory(2).unwrap();
        store
            .replace_chunks(
                "a.md",
                &pairs("backups are encrypted with AES-256 before upload", vec![1.0, 0.0]),
            )
            .unwrap();

        let hits = store.keyword_search("AES-256", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].raw_score > 0.0);
    }

    fn store_accepts_hostile_query() -> bool {
        let store = IndexStore::in_memory(2).unwrap();
        store.keyword_search("NEAR(\"x\" OR", 5).is_ok()
    }

    #[test]
    fn cosine_similarity_reference_values() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn floats_bytes_roundtrip() {
        let original = vec![1.0f32, -2.5, 0.0, 3.25];
        assert_eq!(bytes_to_floats(&floats_to_bytes(&original)), original);
    }
}
