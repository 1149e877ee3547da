//! Database connection management

use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;

use crate::config::DatabaseSettings;
use crate::error::Result;

use super::migrations;
use super::unit_of_work::UnitOfWork;

/// Database wrapper for a `SQLite` connection
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>, settings: &DatabaseSettings) -> Result<Self> {
        let conn = Connection::open(path)?;
        let database = Self { conn };
        database.configure(settings, true)?;
        database.migrate()?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let database = Self { conn };
        database.configure(&DatabaseSettings::default(), false)?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure `SQLite` for concurrent writers
    fn configure(&self, settings: &DatabaseSettings, file_backed: bool) -> Result<()> {
        if file_backed {
            self.conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )?;
        }
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.busy_timeout(settings.busy_timeout())?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
    }

    /// Begin a write unit of work.
    ///
    /// The transaction takes the write lock up front (`BEGIN IMMEDIATE`) so
    /// concurrent writers on other connections wait on `busy_timeout` instead
    /// of failing halfway through.
    pub fn begin(&mut self) -> Result<UnitOfWork<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(UnitOfWork::new(tx))
    }

    /// Begin a read-only unit of work (deferred, rolled back on drop).
    pub fn read(&mut self) -> Result<UnitOfWork<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)?;
        Ok(UnitOfWork::new(tx))
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        let enabled: i64 = db
            .connection()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_open_file_uses_wal() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("routesale.db"), &DatabaseSettings::default())
            .unwrap();
        let mode: String = db
            .connection()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");
    }

    #[test]
    fn test_dropped_unit_of_work_rolls_back() {
        let mut db = Database::open_in_memory().unwrap();
        {
            let uow = db.begin().unwrap();
            uow.connection()
                .execute(
                    "INSERT INTO client_state (key, value) VALUES ('k', 'v')",
                    [],
                )
                .unwrap();
        }
        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM client_state", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
