//! The Recall retrieval core: chunking, persistent hybrid indexing, and
//! score-fused search.
//!
//! Documents are split into overlapping line-addressed chunks, embedded, and
//! stored in SQLite with an FTS5 keyword index kept in lockstep. Queries run
//! both a vector-similarity path and a BM25 keyword path, then fuse the
//! normalized scores into a single ranked result list.

pub mod chunker;
pub mod embedding;
pub mod hash;
pub mod indexer;
pub mod scorer;
pub mod search;
pub mod store;
