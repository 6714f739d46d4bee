//! # Content Hashing
//!
//! Produces the SHA-256 digest used as the content-addressable key for a
//! [`crate::model::ContentBlob`]. Two files with identical bytes hash to the
//! same digest and are stored only once, which is the whole of snapcas's
//! deduplication story.

use crate::error::{Result, SnapcasError};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Size of the read buffer for streaming hash computation (64 KiB).
const BUF_SIZE: usize = 64 * 1024;

/// Produces a stable, lowercase-hex SHA-256 digest of a byte buffer or file.
///
/// Implemented as a trait (rather than free functions) so tests can swap in
/// a fake that records calls or forces collisions; `Sha256Computer` is the
/// only real implementation needed.
pub trait HashComputer {
    /// Hashes an in-memory buffer. Pure and deterministic; the empty slice
    /// hashes to the canonical empty-input SHA-256 digest.
    fn digest(&self, bytes: &[u8]) -> String;

    /// Hashes a file's contents via streaming reads, without loading the
    /// whole file into memory. Fails with [`SnapcasError::InvalidInput`] if
    /// handed an empty path.
    fn digest_file(&self, path: &Path) -> Result<String> {
        if path.as_os_str().is_empty() {
            return Err(SnapcasError::InvalidInput("empty file path".to_string()));
        }

        let mut file = File::open(path).map_err(|e| SnapcasError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; BUF_SIZE];

        loop {
            let bytes_read = file.read(&mut buf).map_err(|e| SnapcasError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buf[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// The production [`HashComputer`]: SHA-256 via the `sha2` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Computer;

impl HashComputer for Sha256Computer {
    fn digest(&self, bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }
}

/// Returns the first `n` characters of a digest, for display purposes only.
pub fn short_digest(digest: &str, n: usize) -> &str {
    &digest[..n.min(digest.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EMPTY_SHA256: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn digest_is_lowercase_hex_64() {
        let h = Sha256Computer.digest(b"hello world");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn empty_buffer_hashes_to_canonical_value() {
        assert_eq!(Sha256Computer.digest(b""), EMPTY_SHA256);
    }

    #[test]
    fn digest_deterministic() {
        let a = Sha256Computer.digest(b"test data");
        let b = Sha256Computer.digest(b"test data");
        assert_eq!(a, b);
    }

    #[test]
    fn digest_differs_on_different_input() {
        let a = Sha256Computer.digest(b"data A");
        let b = Sha256Computer.digest(b"data B");
        assert_ne!(a, b);
    }

    #[test]
    fn digest_file_matches_digest_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.txt");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"hello world").unwrap();
        drop(f);

        let from_file = Sha256Computer.digest_file(&path).unwrap();
        let from_bytes = Sha256Computer.digest(b"hello world");
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn digest_file_empty_path_is_invalid_input() {
        let result = Sha256Computer.digest_file(Path::new(""));
        assert!(matches!(result, Err(SnapcasError::InvalidInput(_))));
    }

    #[test]
    fn short_digest_truncates() {
        let digest = "abcdefghij";
        assert_eq!(short_digest(digest, 4), "abcd");
    }
}
