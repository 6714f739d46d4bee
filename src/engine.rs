//! # BackupEngine
//!
//! Drives the four pipelines described in spec §4.4 — `snapshot`,
//! `restore`, `prune`, `verify` — plus the storage-accounting `list`
//! operation, all sharing one [`HashComputer`], one
//! [`FileSystemGateway`], and one [`Store`]-scoped unit of work.
//!
//! `snapshot` and `prune` are the two operations with real transactional
//! stakes; both open exactly one [`crate::store::UnitOfWork`] and commit
//! or roll it back exactly once. `restore` and `verify` never mutate the
//! store.

use crate::catalog;
use crate::error::Result;
use crate::events::{EventSink, Stage};
use crate::fs_gateway::FileSystemGateway;
use crate::hasher::{HashComputer, Sha256Computer};
use crate::model::{normalize_separators, ContentBlob, FileEntry};
use crate::snapshot_index;
use crate::store::Store;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Per-snapshot storage accounting produced by [`BackupEngine::list`].
#[derive(Debug, Clone)]
pub struct SnapshotListing {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub source_root: String,
    /// Sum over the snapshot's file entries of their blob sizes.
    pub total_size: u64,
    /// Sum of sizes of blobs for which this snapshot is the owner — the
    /// surviving snapshot with the smallest id referencing that digest.
    pub distinct_size: u64,
}

/// Constructed from four collaborators — hasher, filesystem, store, event
/// sink — with no process-wide singleton, per spec §9's design notes.
pub struct BackupEngine<F: FileSystemGateway> {
    hasher: Sha256Computer,
    fs: F,
    store: Store,
    events: Arc<dyn EventSink>,
}

impl<F: FileSystemGateway> BackupEngine<F> {
    pub fn new(hasher: Sha256Computer, fs: F, store: Store, events: Arc<dyn EventSink>) -> Self {
        Self {
            hasher,
            fs,
            store,
            events,
        }
    }

    /// Walks `source_root`, hashing and deduplicating every file, and
    /// persists the result as a new snapshot in one transaction.
    pub fn snapshot(&mut self, source_root: &Path) -> Result<i64> {
        if !self.fs.directory_exists(source_root) {
            let err = crate::error::SnapcasError::SourceMissing(source_root.to_path_buf());
            self.events.on_failed("SourceMissing", &err.to_string());
            return Err(err);
        }

        let result = self.run_snapshot_transaction(source_root);
        match &result {
            Ok(id) => self.events.on_completed(&format!("snapshot {id} created")),
            Err(e) => self.events.on_failed("TransactionFailed", &e.to_string()),
        }
        result
    }

    fn run_snapshot_transaction(&mut self, source_root: &Path) -> Result<i64> {
        let fs = &self.fs;
        let hasher = &self.hasher;
        let events = self.events.as_ref();

        let mut uow = self.store.begin()?;
        let conn = uow.connection();

        let snapshot_id = snapshot_index::create(conn, &source_root.display().to_string(), Utc::now())?;

        let mut file_count = 0u64;
        let walk_result = walk_directory(fs, hasher, events, conn, snapshot_id, source_root, "", &mut file_count);

        match walk_result {
            Ok(()) => {
                uow.commit()?;
                Ok(snapshot_id)
            }
            Err(e) => {
                uow.rollback()?;
                Err(e)
            }
        }
    }

    /// Materializes every file in `snapshot_id` under `output_root`,
    /// overwriting existing files. Not transactional; one failed file logs
    /// a warning and does not abort the rest.
    pub fn restore(&self, snapshot_id: i64, output_root: &Path) -> Result<()> {
        let conn = self.store.connection();
        let detail = snapshot_index::get(conn, snapshot_id)?;

        if detail.entries.is_empty() {
            self.events.on_warning("NoFilesForSnapshot");
            self.events.on_completed("restore completed (no files)");
            return Ok(());
        }

        let total = detail.entries.len() as u64;
        let mut processed = 0u64;

        for fe in &detail.entries {
            let target = output_root.join(&fe.entry.relative_path);

            if let Some(parent) = target.parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = self.fs.create_directory(parent) {
                        self.events
                            .on_warning(&format!("could not create {}: {e}", parent.display()));
                        processed += 1;
                        continue;
                    }
                }
            }

            match catalog::get_bytes(conn, &fe.entry.digest)? {
                Some(bytes) => {
                    if let Err(e) = self.fs.write_file(&target, &bytes) {
                        self.events
                            .on_warning(&format!("could not write {}: {e}", target.display()));
                    }
                }
                None => {
                    self.events
                        .on_warning(&format!("missing blob for {}", fe.entry.relative_path));
                }
            }

            processed += 1;
            if processed % 50 == 0 {
                self.events.on_progress(Stage::Restore, processed, total);
            }
        }

        self.events
            .on_completed(&format!("restored {processed} files"));
        Ok(())
    }

    /// True iff a snapshot with this id currently exists. Callers that need
    /// to distinguish "pruned" from "nothing there to prune" (the CLI's
    /// `prune` subcommand) check this before calling [`Self::prune`], which
    /// itself stays a no-op on a missing id per spec §4.4.3.
    pub fn snapshot_exists(&self, snapshot_id: i64) -> Result<bool> {
        snapshot_index::exists(self.store.connection(), snapshot_id)
    }

    /// Deletes `snapshot_id` and reclaims any content blob left orphaned by
    /// that deletion, in one transaction. A no-op if the snapshot does not
    /// exist.
    pub fn prune(&mut self, snapshot_id: i64) -> Result<()> {
        let result = self.run_prune_transaction(snapshot_id);
        match &result {
            Ok(()) => self
                .events
                .on_completed(&format!("pruned snapshot {snapshot_id}")),
            Err(e) => self.events.on_failed("TransactionFailed", &e.to_string()),
        }
        result
    }

    fn run_prune_transaction(&mut self, snapshot_id: i64) -> Result<()> {
        let uow = self.store.begin()?;
        let conn = uow.connection();

        snapshot_index::delete(conn, snapshot_id)?;

        let orphans = catalog::orphans(conn)?;
        if !orphans.is_empty() {
            let digests: Vec<String> = orphans.into_iter().map(|b| b.digest).collect();
            catalog::delete_many(conn, &digests)?;
        }

        uow.commit()?;
        Ok(())
    }

    /// Rehashes every referenced blob across every snapshot and returns the
    /// file entries whose stored digest no longer matches. Read-only.
    pub fn verify(&self) -> Result<Vec<FileEntry>> {
        let conn = self.store.connection();
        let snapshots = snapshot_index::list_all(conn)?;

        let mut corrupt = Vec::new();
        for detail in snapshots {
            for fe in detail.entries {
                match self.entry_is_corrupt(conn, &fe.entry) {
                    Ok(true) => corrupt.push(fe.entry),
                    Ok(false) => {}
                    Err(e) => self
                        .events
                        .on_warning(&format!("skipping {}: {e}", fe.entry.relative_path)),
                }
            }
        }
        Ok(corrupt)
    }

    fn entry_is_corrupt(&self, conn: &Connection, fe: &FileEntry) -> Result<bool> {
        if fe.digest.is_empty() {
            return Ok(true);
        }

        let bytes = match catalog::get_bytes(conn, &fe.digest)? {
            Some(bytes) => bytes,
            None => return Ok(true),
        };

        let actual = self.hasher.digest(&bytes);
        Ok(!actual.eq_ignore_ascii_case(&fe.digest))
    }

    /// Computes per-snapshot total and distinct sizes, plus the
    /// cross-snapshot total footer.
    pub fn list(&self) -> Result<(Vec<SnapshotListing>, u64)> {
        let conn = self.store.connection();
        let snapshots = snapshot_index::list_all(conn)?;

        // Snapshots are in ascending-id order, so the first writer for a
        // digest is its owner (smallest surviving id referencing it).
        let mut owner: HashMap<String, i64> = HashMap::new();
        for detail in &snapshots {
            for fe in &detail.entries {
                owner.entry(fe.entry.digest.clone()).or_insert(detail.snapshot.id);
            }
        }

        let mut listings = Vec::with_capacity(snapshots.len());
        let mut grand_total = 0u64;

        for detail in &snapshots {
            let mut total_size = 0u64;
            let mut owned_digests: HashSet<&str> = HashSet::new();
            let mut size_by_digest: HashMap<&str, u64> = HashMap::new();

            for fe in &detail.entries {
                total_size += fe.size;
                size_by_digest.insert(&fe.entry.digest, fe.size);
                if owner.get(&fe.entry.digest) == Some(&detail.snapshot.id) {
                    owned_digests.insert(&fe.entry.digest);
                }
            }

            let distinct_size: u64 = owned_digests
                .iter()
                .filter_map(|d| size_by_digest.get(d))
                .sum();

            grand_total += total_size;
            listings.push(SnapshotListing {
                id: detail.snapshot.id,
                created_at: detail.snapshot.created_at,
                source_root: detail.snapshot.source_root.clone(),
                total_size,
                distinct_size,
            });
        }

        Ok((listings, grand_total))
    }
}

/// Depth-first walk of `dir`: files in this directory first, then each
/// child directory recursively. A file read failure propagates (aborts the
/// whole snapshot); a directory that cannot be enumerated is logged and
/// skipped.
#[allow(clippy::too_many_arguments)]
fn walk_directory<F: FileSystemGateway>(
    fs: &F,
    hasher: &Sha256Computer,
    events: &dyn EventSink,
    conn: &Connection,
    snapshot_id: i64,
    dir: &Path,
    rel_prefix: &str,
    file_count: &mut u64,
) -> Result<()> {
    match fs.list_files(dir) {
        Ok(files) => {
            for file_path in files {
                let bytes = fs.read_file(&file_path)?;
                let digest = hasher.digest(&bytes);

                if !catalog::exists(conn, &digest)? {
                    catalog::insert(
                        conn,
                        &ContentBlob {
                            digest: digest.clone(),
                            size: bytes.len() as u64,
                            bytes,
                            created_at: Utc::now(),
                        },
                    )?;
                }

                let file_name = file_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                let rel = normalize_separators(&join_relative(rel_prefix, &file_name));

                snapshot_index::add_entry(conn, snapshot_id, &digest, &rel, &file_name)?;

                *file_count += 1;
                if *file_count % 100 == 0 {
                    events.on_progress(Stage::Snapshot, *file_count, *file_count);
                }
            }
        }
        Err(e) => {
            events.on_warning(&format!("skipping directory {}: {e}", dir.display()));
            return Ok(());
        }
    }

    match fs.list_subdirectories(dir) {
        Ok(subdirs) => {
            for subdir in subdirs {
                let name = subdir
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default();
                let child_prefix = join_relative(rel_prefix, name);
                walk_directory(fs, hasher, events, conn, snapshot_id, &subdir, &child_prefix, file_count)?;
            }
        }
        Err(e) => {
            events.on_warning(&format!(
                "skipping subdirectories of {}: {e}",
                dir.display()
            ));
        }
    }

    Ok(())
}

fn join_relative(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEventSink;
    use crate::fs_gateway::fake::FakeFileSystemGateway;

    fn engine(fs: FakeFileSystemGateway) -> BackupEngine<FakeFileSystemGateway> {
        BackupEngine::new(
            Sha256Computer,
            fs,
            Store::open_in_memory().unwrap(),
            Arc::new(NullEventSink),
        )
    }

    #[test]
    fn snapshot_of_missing_source_fails() {
        let mut eng = engine(FakeFileSystemGateway::new());
        let err = eng.snapshot(Path::new("/nope")).unwrap_err();
        assert!(matches!(err, crate::error::SnapcasError::SourceMissing(_)));
    }

    #[test]
    fn snapshot_of_empty_directory_is_valid() {
        let fs = FakeFileSystemGateway::new().with_directory("/src");
        let mut eng = engine(fs);
        let id = eng.snapshot(Path::new("/src")).unwrap();
        let (listings, total) = eng.list().unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].id, id);
        assert_eq!(listings[0].total_size, 0);
        assert_eq!(listings[0].distinct_size, 0);
        assert_eq!(total, 0);
    }

    #[test]
    fn basic_round_trip() {
        let fs = FakeFileSystemGateway::new()
            .with_file("/src/a.txt", b"hello".to_vec())
            .with_file("/src/sub/b.bin", vec![0x00, 0x01])
            .with_directory("/src/sub");
        let mut eng = engine(fs);
        let id = eng.snapshot(Path::new("/src")).unwrap();

        let (listings, _) = eng.list().unwrap();
        assert_eq!(listings[0].total_size, 7);
        assert_eq!(listings[0].distinct_size, 7);

        eng.restore(id, Path::new("/out")).unwrap();

        assert_eq!(eng.fs.read_file(Path::new("/out/a.txt")).unwrap(), b"hello");
        assert_eq!(
            eng.fs.read_file(Path::new("/out/sub/b.bin")).unwrap(),
            vec![0x00, 0x01]
        );
    }

    #[test]
    fn dedup_across_two_identical_files() {
        let fs = FakeFileSystemGateway::new()
            .with_file("/src/x.txt", b"dup".to_vec())
            .with_file("/src/y.txt", b"dup".to_vec());
        let mut eng = engine(fs);
        eng.snapshot(Path::new("/src")).unwrap();

        let (listings, _) = eng.list().unwrap();
        assert_eq!(listings[0].total_size, 6);
        assert_eq!(listings[0].distinct_size, 3);
    }

    #[test]
    fn snapshot_idempotence() {
        let fs = FakeFileSystemGateway::new()
            .with_file("/src/a.txt", b"hello".to_vec())
            .with_file("/src/sub/b.bin", vec![0x00, 0x01])
            .with_directory("/src/sub");
        let mut eng = engine(fs);

        let first = eng.snapshot(Path::new("/src")).unwrap();
        let blob_count_after_first: i64 = eng
            .store
            .connection()
            .query_row("SELECT count(*) FROM content_blobs", [], |row| row.get(0))
            .unwrap();

        let second = eng.snapshot(Path::new("/src")).unwrap();
        let blob_count_after_second: i64 = eng
            .store
            .connection()
            .query_row("SELECT count(*) FROM content_blobs", [], |row| row.get(0))
            .unwrap();

        assert_eq!(blob_count_after_second, blob_count_after_first);

        let detail_first = snapshot_index::get(eng.store.connection(), first).unwrap();
        let detail_second = snapshot_index::get(eng.store.connection(), second).unwrap();

        let mut pairs_first: Vec<(String, String)> = detail_first
            .entries
            .iter()
            .map(|e| (e.entry.relative_path.clone(), e.entry.digest.clone()))
            .collect();
        let mut pairs_second: Vec<(String, String)> = detail_second
            .entries
            .iter()
            .map(|e| (e.entry.relative_path.clone(), e.entry.digest.clone()))
            .collect();
        pairs_first.sort();
        pairs_second.sort();

        assert_eq!(pairs_first, pairs_second);
    }

    #[test]
    fn restore_of_empty_snapshot_is_noop() {
        let fs = FakeFileSystemGateway::new().with_directory("/src");
        let mut eng = engine(fs);
        let id = eng.snapshot(Path::new("/src")).unwrap();
        eng.restore(id, Path::new("/out")).unwrap();
    }

    #[test]
    fn prune_of_nonexistent_snapshot_is_noop() {
        let mut eng = engine(FakeFileSystemGateway::new());
        eng.prune(999).unwrap();
    }

    #[test]
    fn prune_preserves_shared_content() {
        let fs = FakeFileSystemGateway::new()
            .with_file("/src/shared.txt", b"S".to_vec())
            .with_file("/src/only1.txt", b"1".to_vec());
        let mut eng = engine(fs);
        let first = eng.snapshot(Path::new("/src")).unwrap();

        // mutate the tree in place: drop only1.txt, add only2.txt, keep shared.txt.
        eng.fs.remove_file("/src/only1.txt");
        eng.fs.write_file(Path::new("/src/only2.txt"), b"2").unwrap();
        let second = eng.snapshot(Path::new("/src")).unwrap();

        eng.prune(first).unwrap();

        let (listings, _) = eng.list().unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].id, second);
        assert_eq!(listings[0].total_size, 2); // shared.txt (1 byte) + only2.txt (1 byte)
        assert_eq!(listings[0].distinct_size, 2);

        let shared_digest = Sha256Computer.digest(b"S");
        assert!(catalog::exists(eng.store.connection(), &shared_digest).unwrap());

        let only1_digest = Sha256Computer.digest(b"1");
        assert!(!catalog::exists(eng.store.connection(), &only1_digest).unwrap());
    }

    #[test]
    fn verify_detects_corruption() {
        let fs = FakeFileSystemGateway::new().with_file("/src/f.txt", b"data".to_vec());
        let mut eng = engine(fs);
        eng.snapshot(Path::new("/src")).unwrap();

        let digest = Sha256Computer.digest(b"data");
        {
            let conn = eng.store.connection();
            conn.execute(
                "UPDATE content_blobs SET bytes = ?1 WHERE digest = ?2",
                rusqlite::params![b"xxxx".to_vec(), digest],
            )
            .unwrap();
        }

        let corrupt = eng.verify().unwrap();
        assert_eq!(corrupt.len(), 1);
        assert_eq!(corrupt[0].relative_path, "f.txt");
    }

    #[test]
    fn verify_is_pure() {
        let fs = FakeFileSystemGateway::new().with_file("/src/f.txt", b"data".to_vec());
        let mut eng = engine(fs);
        eng.snapshot(Path::new("/src")).unwrap();

        let first = eng.verify().unwrap();
        let second = eng.verify().unwrap();
        assert_eq!(first.len(), second.len());
        assert!(first.is_empty());
    }
}
