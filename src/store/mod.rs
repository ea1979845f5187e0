//! Owns the single SQLite connection and the transaction scopes every
//! engine in this crate composes through.

mod schema;

use std::cell::RefCell;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Transaction};

use crate::error::Error;

/// Current UTC timestamp, ISO-8601 with second precision, used for every
/// `created_at`/`updated_at` column this crate writes.
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A typed handle to a single-file (or in-memory) SQLite database.
///
/// The connection lives behind a `RefCell` because opening a transaction
/// requires a mutable borrow of `rusqlite::Connection` while the rest of
/// this crate's API is `&self` — the single-threaded cooperative model in
/// play here (see SPEC_FULL.md §5) makes that safe.
pub struct Store {
    conn: RefCell<Connection>,
}

impl Store {
    /// Open (creating parent directories as needed) and initialize a
    /// file-backed store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Store(format!("failed to create {parent:?}: {e}")))?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;
        if !store.is_initialized()? {
            store.initialize(false)?;
        }
        Ok(store)
    }

    /// Open an in-memory store. Useful for tests and short-lived embedding.
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self::from_connection(conn)?;
        store.initialize(false)?;
        Ok(store)
    }

    fn from_connection(conn: Connection) -> Result<Self, Error> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: RefCell::new(conn),
        })
    }

    fn is_initialized(&self) -> Result<bool, Error> {
        let conn = self.conn.borrow();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            [],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Apply the schema script. Idempotent under `force`: without it,
    /// initializing an already-initialized store fails; with it, existing
    /// tables are dropped (foreign keys temporarily disabled) and the
    /// schema is reapplied from scratch, losing all data.
    pub fn initialize(&self, force: bool) -> Result<(), Error> {
        let already = self.is_initialized()?;
        if already && !force {
            return Err(Error::Store(
                "store is already initialized; pass force=true to reinitialize".into(),
            ));
        }

        let mut conn = self.conn.borrow_mut();

        if already && force {
            log::warn!("force-reinitializing store: all existing data will be dropped");
            let tables: Vec<String> = {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
                )?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
            let tx = conn.transaction()?;
            for table in &tables {
                tx.execute(&format!("DROP TABLE IF EXISTS \"{table}\""), [])?;
            }
            tx.commit()?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(schema::SCHEMA_SQL)?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [schema::CURRENT_VERSION],
        )?;
        tx.commit()?;
        log::debug!("store initialized at schema version {}", schema::CURRENT_VERSION);
        Ok(())
    }

    /// Current schema version, or `None` if never initialized.
    pub fn schema_version(&self) -> Result<Option<u32>, Error> {
        if !self.is_initialized()? {
            return Ok(None);
        }
        let conn = self.conn.borrow();
        let version: u32 =
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
                row.get(0)
            })?;
        Ok(Some(version))
    }

    /// Names of all non-sqlite-internal tables, for introspection.
    pub fn table_list(&self) -> Result<Vec<String>, Error> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Whether `PRAGMA foreign_keys` is active on this connection.
    pub fn foreign_keys_enabled(&self) -> Result<bool, Error> {
        let conn = self.conn.borrow();
        let enabled: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        Ok(enabled != 0)
    }

    /// Run the integrity auditor against the current state. Read-only, so
    /// unlike `transaction`/`dry_run` it doesn't need a transaction at all.
    pub fn doctor(&self) -> Result<crate::doctor::Report, Error> {
        let conn = self.conn.borrow();
        crate::doctor::check_all(&conn)
    }

    /// Run `f` in a new transaction that commits on `Ok` and rolls back
    /// (by dropping unfinished) on `Err`.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Run `f` in a transaction that is *always* rolled back, regardless of
    /// whether `f` returns `Ok` or `Err`. Used for every `dry_run` code path.
    pub fn dry_run<T>(
        &self,
        f: impl FnOnce(&Transaction) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        let result = f(&tx);
        // tx is dropped here without commit() regardless of outcome: rollback.
        result
    }
}
