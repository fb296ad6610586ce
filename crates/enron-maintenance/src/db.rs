use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use enron_core::DatabaseConfig;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use crate::error::{MaintenanceError, Result};

/// Single owner of the connection to the archive database.
///
/// Construction only records the location; the connection is opened on the
/// first [`Database::with_conn`] call. Clones share one connection and every
/// access goes through the same mutex, so statements issued by this process
/// never overlap (VACUUM included).
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    busy_timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                busy_timeout,
                conn: Mutex::new(None),
            }),
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(&config.path, config.busy_timeout())
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Whether a connection is currently held open.
    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Run `f` with exclusive access to the connection, opening it if needed.
    ///
    /// The lock is released when `f` returns, errors, or panics. A failed open
    /// leaves the handle empty so the next call tries again.
    pub fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut guard = self.lock();
        let conn = match guard.take() {
            Some(conn) => conn,
            None => self.open()?,
        };
        f(guard.insert(conn))
    }

    /// Release the connection, surfacing any error SQLite reports on close.
    ///
    /// Closing an unopened handle is a no-op; a later `with_conn` reopens.
    pub fn close(&self) -> Result<()> {
        let taken = self.lock().take();
        if let Some(conn) = taken {
            conn.close().map_err(|(_, e)| MaintenanceError::Close(e))?;
            debug!(path = %self.inner.path.display(), "database closed");
        }
        Ok(())
    }

    fn open(&self) -> Result<Connection> {
        let path = &self.inner.path;
        // No SQLITE_OPEN_CREATE: the archive must already exist.
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|source| {
            MaintenanceError::Open {
                path: path.clone(),
                source,
            }
        })?;
        conn.busy_timeout(self.inner.busy_timeout)?;
        info!(path = %path.display(), "opened SQLite database");
        Ok(conn)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        // A panic inside `with_conn` poisons the mutex but leaves the
        // connection itself usable.
        self.inner
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.inner.path)
            .field("busy_timeout", &self.inner.busy_timeout)
            .finish_non_exhaustive()
    }
}
