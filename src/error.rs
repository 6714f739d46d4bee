//! # Error Types
//!
//! Defines the structured error hierarchy for the backup engine using `thiserror`.
//! Each variant carries enough context for meaningful diagnostics without
//! exposing internal implementation details (SQL text, raw rusqlite errors)
//! to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type encompassing every failure mode in the backup engine.
#[derive(Error, Debug)]
pub enum SnapcasError {
    #[error("source directory does not exist: {0}")]
    SourceMissing(PathBuf),

    #[error("failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path already exists in snapshot {snapshot_id}: {relative_path}")]
    DuplicatePath {
        snapshot_id: i64,
        relative_path: String,
    },

    #[error("content blob already exists: {digest}")]
    DuplicateDigest { digest: String },

    #[error("file entry references a digest with no matching content blob: {digest}")]
    DanglingReference { digest: String },

    #[error("refusing to delete content blob still referenced by a file entry: {digest}")]
    ReferentialViolation { digest: String },

    #[error("content blob not found: {digest}")]
    BlobMissing { digest: String },

    #[error("snapshot not found: {0}")]
    SnapshotMissing(i64),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<rusqlite::Error> for SnapcasError {
    fn from(err: rusqlite::Error) -> Self {
        SnapcasError::TransactionFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SnapcasError>;
