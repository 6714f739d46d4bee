//! # Data Model
//!
//! The three entities persisted by the [`crate::store::Store`]: a
//! [`ContentBlob`] is the sole copy of a unique byte sequence, a [`Snapshot`]
//! is a timestamped header for one backup event, and a [`FileEntry`] links a
//! path within a snapshot to the blob holding its bytes.

use chrono::{DateTime, Utc};

/// The sole copy of a unique byte sequence, keyed by its SHA-256 digest.
#[derive(Debug, Clone)]
pub struct ContentBlob {
    /// Lowercase hex SHA-256 of `bytes`; exactly 64 hex characters.
    pub digest: String,
    pub bytes: Vec<u8>,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// A header identifying one backup event.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub source_root: String,
}

/// One file within one snapshot, associating a path with a content digest.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub id: i64,
    pub snapshot_id: i64,
    pub digest: String,
    pub relative_path: String,
    pub file_name: String,
}

/// A [`FileEntry`] paired with the size of the blob it references, enough
/// for accounting and restore without re-fetching the blob's bytes.
#[derive(Debug, Clone)]
pub struct FileEntryWithSize {
    pub entry: FileEntry,
    pub size: u64,
}

/// A [`Snapshot`] eagerly loaded with all of its file entries.
#[derive(Debug, Clone)]
pub struct SnapshotDetail {
    pub snapshot: Snapshot,
    pub entries: Vec<FileEntryWithSize>,
}

/// Normalizes a path's separators to forward slashes for persistence,
/// per the wire format in spec §6. A no-op on platforms that already use
/// `/`.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}
