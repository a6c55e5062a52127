//! Connection provider and transaction handling.
//!
//! The store never opens connections itself. It borrows one from a
//! [`ConnectionProvider`] for each logical operation, so callers decide how
//! connections are shared and tests can hand each case its own in-memory
//! database.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cookbook_store_db::Settings;
use rusqlite::{Connection, DropBehavior, Transaction, TransactionBehavior};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// Path that selects an in-memory database in [`Database::from_settings`].
pub const IN_MEMORY: &str = ":memory:";

/// Default time a connection waits on a locked database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Lends a SQLite connection for the duration of one operation.
pub trait ConnectionProvider {
    fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>;
}

/// A single SQLite connection, opened at start-up and closed explicitly.
///
/// Concurrent callers sharing one `Database` are serialized on its
/// connection; independent `Database` handles on the same file contend
/// through SQLite's own locking, bounded by the busy timeout.
///
/// # Examples
///
/// ```
/// use cookbook_store_sqlite::{ConnectionProvider, Database};
///
/// let db = Database::open_in_memory().unwrap();
/// let fk: i64 = db
///     .with_connection(|conn| Ok(conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0))?))
///     .unwrap();
/// assert_eq!(fk, 1);
/// db.close().unwrap();
/// ```
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Opens (creating if needed) a database file.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(StoreError::backend("open database"))?;
        configure(&conn, busy_timeout)?;
        debug!(path = %path.display(), "opened database");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::backend("open database"))?;
        configure(&conn, DEFAULT_BUSY_TIMEOUT)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Opens the database named by resolved settings.
    ///
    /// A `database` of `:memory:` opens an in-memory database.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        if settings.database.as_os_str() == IN_MEMORY {
            return Self::open_in_memory();
        }
        Self::open(
            &settings.database,
            Duration::from_millis(settings.busy_timeout_ms),
        )
    }

    /// Path of the database file, or `None` for an in-memory database.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Closes the connection, reporting any error SQLite returns.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        conn.close()
            .map_err(|(_, err)| StoreError::backend("close database")(err))
    }
}

fn configure(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)
        .map_err(StoreError::backend("set busy timeout"))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(StoreError::backend("enable foreign keys"))?;
    Ok(())
}

impl ConnectionProvider for Database {
    fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        // A panic while holding the lock leaves no transaction open: the
        // guard's transaction was dropped (and rolled back) during unwinding.
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut conn)
    }
}

impl<P: ConnectionProvider> ConnectionProvider for &P {
    fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        (**self).with_connection(f)
    }
}

impl<P: ConnectionProvider> ConnectionProvider for Arc<P> {
    fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        (**self).with_connection(f)
    }
}

/// Runs `f` inside an `IMMEDIATE` transaction.
///
/// Commits if `f` succeeds. Otherwise rolls back and returns `f`'s error,
/// folded into [`StoreError::RollbackFailed`] if the rollback also fails.
/// A failed `COMMIT` that leaves the transaction open is rolled back the
/// same way.
pub(crate) fn in_transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let mut tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(StoreError::backend("begin transaction"))?;

    let value = match f(&tx) {
        Ok(value) => value,
        Err(cause) => return Err(fold_rollback(cause, tx.rollback())),
    };

    // Dropping a transaction whose commit failed would roll back silently.
    tx.set_drop_behavior(DropBehavior::Ignore);
    match tx.commit() {
        Ok(()) => Ok(value),
        Err(err) => {
            let cause = StoreError::backend("commit transaction")(err);
            let rollback = if conn.is_autocommit() {
                Ok(())
            } else {
                conn.execute_batch("ROLLBACK")
            };
            Err(fold_rollback(cause, rollback))
        }
    }
}

/// Combines an operation error with the outcome of rolling back.
pub(crate) fn fold_rollback(cause: StoreError, rollback: rusqlite::Result<()>) -> StoreError {
    match rollback {
        Ok(()) => {
            warn!(error = %cause, "transaction rolled back");
            cause
        }
        Err(rollback) => {
            warn!(error = %cause, rollback_error = %rollback, "transaction rollback failed");
            StoreError::RollbackFailed {
                cause: Box::new(cause),
                rollback,
            }
        }
    }
}
