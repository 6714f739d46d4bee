//! # Store and Unit of Work
//!
//! Owns the transactional substrate: a single SQLite connection (via
//! `rusqlite`, bundled — no external database process) holding the three
//! tables of the data model. `begin` opens a [`UnitOfWork`]; every mutating
//! engine operation (`snapshot`, `prune`) commits or rolls it back exactly
//! once. `restore` and `verify` read through the plain connection and never
//! open a transaction.

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;

/// Owns the SQLite connection backing the three entity tables.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (creating if absent) the database file at `path` and ensures
    /// the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database. Used by tests so engine logic
    /// can be exercised without touching disk.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Store { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS content_blobs (
                digest     TEXT PRIMARY KEY CHECK (length(digest) = 64),
                bytes      BLOB NOT NULL,
                size       INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS snapshots (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at  TEXT NOT NULL,
                source_root TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS file_entries (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                snapshot_id   INTEGER NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
                digest        TEXT NOT NULL REFERENCES content_blobs(digest),
                relative_path TEXT NOT NULL,
                file_name     TEXT NOT NULL,
                UNIQUE(snapshot_id, relative_path)
            );

            CREATE INDEX IF NOT EXISTS idx_file_entries_digest ON file_entries(digest);
            ",
        )?;
        Ok(())
    }

    /// Borrows the underlying connection for read-only operations that do
    /// not require transactional framing (`list`, `verify`).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Opens a new unit of work. Rust's borrow checker prevents a second
    /// `begin` while one is alive: `UnitOfWork` exclusively borrows `Store`.
    pub fn begin(&mut self) -> Result<UnitOfWork<'_>> {
        let tx = self.conn.transaction()?;
        Ok(UnitOfWork { tx })
    }
}

/// A scoped transaction over the [`Store`]. Consumed by `commit` or
/// `rollback`; dropping it without either rolls back (rusqlite's default).
pub struct UnitOfWork<'conn> {
    tx: rusqlite::Transaction<'conn>,
}

impl<'conn> UnitOfWork<'conn> {
    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }

    /// Borrows the connection inside this transaction for catalog/index
    /// operations, which take a plain `&Connection`.
    pub fn connection(&self) -> &Connection {
        &self.tx
    }
}
