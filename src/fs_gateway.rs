//! # FileSystemGateway
//!
//! An abstraction over the host filesystem. Every operation is
//! non-recursive by design — recursion stays the
//! [`crate::engine::BackupEngine`]'s responsibility so it can interleave
//! hashing, deduplication, and transaction work, per spec §4.5.

use crate::error::{Result, SnapcasError};
use std::path::{Path, PathBuf};

pub trait FileSystemGateway {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;
    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()>;
    /// Idempotent: no error if the directory already exists.
    fn create_directory(&self, path: &Path) -> Result<()>;
    /// Non-recursive; directories are not included.
    fn list_files(&self, path: &Path) -> Result<Vec<PathBuf>>;
    /// Non-recursive.
    fn list_subdirectories(&self, path: &Path) -> Result<Vec<PathBuf>>;
    fn file_exists(&self, path: &Path) -> bool;
    fn directory_exists(&self, path: &Path) -> bool;
}

/// The production [`FileSystemGateway`], backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystemGateway;

impl FileSystemGateway for RealFileSystemGateway {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| SnapcasError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        std::fs::write(path, bytes).map_err(|e| SnapcasError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| SnapcasError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn list_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path).map_err(|e| SnapcasError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SnapcasError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    fn list_subdirectories(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path).map_err(|e| SnapcasError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SnapcasError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                dirs.push(entry.path());
            }
        }
        Ok(dirs)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn directory_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

#[cfg(test)]
pub mod fake {
    //! An in-memory [`FileSystemGateway`] for engine unit tests that must
    //! not touch disk.

    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeFileSystemGateway {
        files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
        directories: Mutex<BTreeSet<PathBuf>>,
    }

    impl FakeFileSystemGateway {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_file(self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
            let path = path.into();
            if let Some(parent) = path.parent() {
                self.directories.lock().unwrap().insert(parent.to_path_buf());
            }
            self.files.lock().unwrap().insert(path, bytes.into());
            self
        }

        pub fn with_directory(self, path: impl Into<PathBuf>) -> Self {
            self.directories.lock().unwrap().insert(path.into());
            self
        }

        /// Removes a file in place, for tests that simulate a source tree
        /// changing between two snapshots of the same gateway.
        pub fn remove_file(&self, path: impl AsRef<Path>) {
            self.files.lock().unwrap().remove(path.as_ref());
        }
    }

    impl FileSystemGateway for FakeFileSystemGateway {
        fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| SnapcasError::ReadFailed {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                })
        }

        fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), bytes.to_vec());
            Ok(())
        }

        fn create_directory(&self, path: &Path) -> Result<()> {
            self.directories.lock().unwrap().insert(path.to_path_buf());
            Ok(())
        }

        fn list_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
            let files = self.files.lock().unwrap();
            Ok(files
                .keys()
                .filter(|p| p.parent() == Some(path))
                .cloned()
                .collect())
        }

        fn list_subdirectories(&self, path: &Path) -> Result<Vec<PathBuf>> {
            let dirs = self.directories.lock().unwrap();
            Ok(dirs
                .iter()
                .filter(|p| p.parent() == Some(path))
                .cloned()
                .collect())
        }

        fn file_exists(&self, path: &Path) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }

        fn directory_exists(&self, path: &Path) -> bool {
            self.directories.lock().unwrap().contains(path)
        }
    }
}
