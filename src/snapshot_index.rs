//! # SnapshotIndex
//!
//! Create/read/delete [`Snapshot`] headers and their [`FileEntry`] rows.
//! Like [`crate::catalog`], every function takes a plain `&Connection` so
//! it works against either a read-only connection or an in-flight
//! transaction.

use crate::error::{Result, SnapcasError};
use crate::model::{FileEntry, FileEntryWithSize, Snapshot, SnapshotDetail};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

/// Assigns a fresh id and inserts the snapshot header.
pub fn create(conn: &Connection, source_root: &str, created_at: DateTime<Utc>) -> Result<i64> {
    conn.execute(
        "INSERT INTO snapshots (created_at, source_root) VALUES (?1, ?2)",
        rusqlite::params![created_at.to_rfc3339(), source_root],
    )?;
    Ok(conn.last_insert_rowid())
}

/// True iff a snapshot with this id exists.
pub fn exists(conn: &Connection, id: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM snapshots WHERE id = ?1",
        [id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Eagerly loads a snapshot and all of its file entries (with blob sizes).
/// Returns [`SnapcasError::SnapshotMissing`] if the id is unknown.
pub fn get(conn: &Connection, id: i64) -> Result<SnapshotDetail> {
    let snapshot = conn
        .query_row(
            "SELECT id, created_at, source_root FROM snapshots WHERE id = ?1",
            [id],
            |row| {
                let created_at: String = row.get(1)?;
                Ok(Snapshot {
                    id: row.get(0)?,
                    created_at: parse_timestamp(&created_at),
                    source_root: row.get(2)?,
                })
            },
        )
        .map_err(|_| SnapcasError::SnapshotMissing(id))?;

    let entries = load_entries(conn, id)?;

    Ok(SnapshotDetail { snapshot, entries })
}

/// All snapshots, ordered by ascending id, each eagerly loaded with its
/// file entries.
pub fn list_all(conn: &Connection) -> Result<Vec<SnapshotDetail>> {
    let mut stmt = conn.prepare("SELECT id, created_at, source_root FROM snapshots ORDER BY id")?;
    let snapshots: Vec<Snapshot> = stmt
        .query_map([], |row| {
            let created_at: String = row.get(1)?;
            Ok(Snapshot {
                id: row.get(0)?,
                created_at: parse_timestamp(&created_at),
                source_root: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        let entries = load_entries(conn, snapshot.id)?;
        out.push(SnapshotDetail { snapshot, entries });
    }
    Ok(out)
}

/// Deletes a snapshot and cascades to its file entries. No-op if absent.
pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM snapshots WHERE id = ?1", [id])?;
    Ok(())
}

/// Adds a file entry to a snapshot. Fails with
/// [`SnapcasError::DuplicatePath`] on a `(snapshot_id, relative_path)`
/// collision, or [`SnapcasError::DanglingReference`] if `digest` has no
/// matching content blob.
pub fn add_entry(
    conn: &Connection,
    snapshot_id: i64,
    digest: &str,
    relative_path: &str,
    file_name: &str,
) -> Result<i64> {
    let blob_exists: i64 = conn.query_row(
        "SELECT count(*) FROM content_blobs WHERE digest = ?1",
        [digest],
        |row| row.get(0),
    )?;
    if blob_exists == 0 {
        return Err(SnapcasError::DanglingReference {
            digest: digest.to_string(),
        });
    }

    let result = conn.execute(
        "INSERT INTO file_entries (snapshot_id, digest, relative_path, file_name) \
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![snapshot_id, digest, relative_path, file_name],
    );

    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(SnapcasError::DuplicatePath {
                snapshot_id,
                relative_path: relative_path.to_string(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

fn load_entries(conn: &Connection, snapshot_id: i64) -> Result<Vec<FileEntryWithSize>> {
    let mut stmt = conn.prepare(
        "SELECT fe.id, fe.snapshot_id, fe.digest, fe.relative_path, fe.file_name, cb.size
         FROM file_entries fe
         JOIN content_blobs cb ON cb.digest = fe.digest
         WHERE fe.snapshot_id = ?1
         ORDER BY fe.id",
    )?;

    let rows = stmt.query_map([snapshot_id], |row| {
        Ok(FileEntryWithSize {
            entry: FileEntry {
                id: row.get(0)?,
                snapshot_id: row.get(1)?,
                digest: row.get(2)?,
                relative_path: row.get(3)?,
                file_name: row.get(4)?,
            },
            size: row.get::<_, i64>(5)? as u64,
        })
    })?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::model::ContentBlob;
    use crate::store::Store;

    fn insert_blob(conn: &Connection, digest: &str) {
        catalog::insert(
            conn,
            &ContentBlob {
                digest: digest.to_string(),
                bytes: b"x".to_vec(),
                size: 1,
                created_at: Utc::now(),
            },
        )
        .unwrap();
    }

    #[test]
    fn create_and_get_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        let id = create(conn, "/src", Utc::now()).unwrap();
        assert!(id > 0);
        let detail = get(conn, id).unwrap();
        assert_eq!(detail.snapshot.source_root, "/src");
        assert!(detail.entries.is_empty());
    }

    #[test]
    fn get_missing_is_snapshot_missing() {
        let store = Store::open_in_memory().unwrap();
        let err = get(store.connection(), 999).unwrap_err();
        assert!(matches!(err, SnapcasError::SnapshotMissing(999)));
    }

    #[test]
    fn add_entry_requires_existing_blob() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        let id = create(conn, "/src", Utc::now()).unwrap();
        let err = add_entry(conn, id, "missing-digest", "a.txt", "a.txt").unwrap_err();
        assert!(matches!(err, SnapcasError::DanglingReference { .. }));
    }

    #[test]
    fn duplicate_path_within_snapshot_fails() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        insert_blob(conn, &"a".repeat(64));
        let id = create(conn, "/src", Utc::now()).unwrap();
        add_entry(conn, id, &"a".repeat(64), "a.txt", "a.txt").unwrap();
        let err = add_entry(conn, id, &"a".repeat(64), "a.txt", "a.txt").unwrap_err();
        assert!(matches!(err, SnapcasError::DuplicatePath { .. }));
    }

    #[test]
    fn delete_cascades_to_entries() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        insert_blob(conn, &"b".repeat(64));
        let id = create(conn, "/src", Utc::now()).unwrap();
        add_entry(conn, id, &"b".repeat(64), "a.txt", "a.txt").unwrap();

        delete(conn, id).unwrap();
        assert!(!exists(conn, id).unwrap());

        let count: i64 = conn
            .query_row("SELECT count(*) FROM file_entries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn delete_nonexistent_is_noop() {
        let store = Store::open_in_memory().unwrap();
        delete(store.connection(), 999).unwrap();
    }

    #[test]
    fn list_all_orders_by_ascending_id() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.connection();
        let first = create(conn, "/a", Utc::now()).unwrap();
        let second = create(conn, "/b", Utc::now()).unwrap();
        let all = list_all(conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].snapshot.id, first);
        assert_eq!(all[1].snapshot.id, second);
    }
}
