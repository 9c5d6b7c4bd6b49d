//! Local SQLite file holding the persisted session.
//!
//! Nothing from the remote service is cached here. The only table is the
//! `kv_state` area read and written by [`crate::session::SessionStore`].

pub mod queries;
pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::errors::DatabaseError;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the session file at `path` and migrate it. Missing parent
    /// directories are created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        info!(path = %path.display(), "session database opened");
        Self::migrated(conn)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::migrated(Connection::open_in_memory()?)
    }

    fn migrated(conn: Connection) -> Result<Self, DatabaseError> {
        schema::run_migrations(&conn)?;
        debug!("session schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// A panic while holding the lock leaves the connection usable, so a
    /// poisoned lock is taken over.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("session database lock was poisoned");
            poisoned.into_inner()
        })
    }
}
