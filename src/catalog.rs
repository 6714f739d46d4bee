//! # ContentCatalog
//!
//! Operations on [`ContentBlob`] rows: existence checks, insert-if-absent,
//! orphan enumeration, and bulk deletion. Every function takes a plain
//! `&Connection` so callers can pass either a [`crate::store::Store`]'s
//! connection (read-only paths) or a [`crate::store::UnitOfWork`]'s
//! transaction (mutating paths) — `rusqlite::Transaction` derefs to
//! `Connection`.

use crate::error::{Result, SnapcasError};
use crate::model::ContentBlob;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

/// True iff a blob with this digest is present.
pub fn exists(conn: &Connection, digest: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM content_blobs WHERE digest = ?1",
        [digest],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Inserts a new blob. Fails with [`SnapcasError::DuplicateDigest`] if a
/// blob with the same digest already exists.
pub fn insert(conn: &Connection, blob: &ContentBlob) -> Result<()> {
    let result = conn.execute(
        "INSERT INTO content_blobs (digest, bytes, size, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            blob.digest,
            blob.bytes,
            blob.size as i64,
            blob.created_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(SnapcasError::DuplicateDigest {
                digest: blob.digest.clone(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// All blobs with zero referencing file entries, in implementation-defined
/// order (ascending digest, for determinism in tests).
pub fn orphans(conn: &Connection) -> Result<Vec<ContentBlob>> {
    let mut stmt = conn.prepare(
        "SELECT cb.digest, cb.bytes, cb.size, cb.created_at
         FROM content_blobs cb
         LEFT JOIN file_entries fe ON fe.digest = cb.digest
         WHERE fe.id IS NULL
         ORDER BY cb.digest",
    )?;

    let rows = stmt.query_map([], |row| {
        let created_at: String = row.get(3)?;
        Ok(ContentBlob {
            digest: row.get(0)?,
            bytes: row.get(1)?,
            size: row.get::<_, i64>(2)? as u64,
            created_at: parse_timestamp(&created_at),
        })
    })?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

/// Deletes each of `digests`. Fails atomically with
/// [`SnapcasError::BlobMissing`] if any digest has no matching blob, or
/// with [`SnapcasError::ReferentialViolation`] if any blob still has a
/// referencing file entry. Neither check's failure deletes anything.
pub fn delete_many(conn: &Connection, digests: &[String]) -> Result<()> {
    for digest in digests {
        if !exists(conn, digest)? {
            return Err(SnapcasError::BlobMissing {
                digest: digest.clone(),
            });
        }
    }

    for digest in digests {
        let ref_count: i64 = conn.query_row(
            "SELECT count(*) FROM file_entries WHERE digest = ?1",
            [digest],
            |row| row.get(0),
        )?;
        if ref_count > 0 {
            return Err(SnapcasError::ReferentialViolation {
                digest: digest.clone(),
            });
        }
    }

    for digest in digests {
        conn.execute("DELETE FROM content_blobs WHERE digest = ?1", [digest])?;
    }

    Ok(())
}

/// Looks up a single blob's bytes by digest, for restore.
pub fn get_bytes(conn: &Connection, digest: &str) -> Result<Option<Vec<u8>>> {
    conn.query_row(
        "SELECT bytes FROM content_blobs WHERE digest = ?1",
        [digest],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
