//! Core types, configuration, and error handling for Recall.
//!
//! This crate provides the shared foundation used by the other Recall crates:
//! - [`RecallError`] — unified error type using `thiserror`
//! - [`RecallConfig`] — configuration loaded from `.recall.toml`
//! - Shared types: [`FileRecord`], [`SearchResult`], [`IndexSummary`],
//!   [`IndexFileError`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{EmbeddingConfig, IndexConfig, RecallConfig, SearchConfig};
pub use error::RecallError;
pub use types::{FileRecord, IndexFileError, IndexSummary, OutputFormat, SearchResult};

/// A convenience `Result` type for Recall operations.
pub type Result<T> = std::result::Result<T, RecallError>;
