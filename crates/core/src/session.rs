//! Durable, restartable record of the last selection.
//!
//! [`SessionStore`] keeps a single [`SessionRecord`] as JSON text under one
//! well-known key of the `kv_state` table. Only opaque identifiers are
//! stored; rehydration re-fetches every entity before it is trusted (see
//! [`crate::navigation::NavigationController::restore`]).
//!
//! Persistence never fails the caller: save errors are logged and swallowed,
//! and unreadable data loads as "no prior session".

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::db::Database;
use crate::errors::{DatabaseError, SessionError};
use crate::models::SessionRecord;

/// Persists the selection triple in the client's key-value area.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Database>,
    key: String,
}

impl SessionStore {
    /// Wrap an already-initialized database.
    pub fn new(db: Arc<Database>, key: impl Into<String>) -> Self {
        Self {
            db,
            key: key.into(),
        }
    }

    /// Open the session file named by `config`.
    pub fn open(config: &SessionConfig) -> Result<Self, DatabaseError> {
        let db = Database::open(config.database_path())?;
        Ok(Self::new(Arc::new(db), config.state_key.clone()))
    }

    /// An in-memory store, for tests and ephemeral sessions.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let db = Database::open_in_memory()?;
        Ok(Self::new(Arc::new(db), "appState"))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Persist `record`. Failures are logged and swallowed.
    pub fn save(&self, record: &SessionRecord) {
        if let Err(e) = self.try_save(record) {
            warn!(key = %self.key, error = %e, "failed to persist session, continuing");
        }
    }

    /// Persist `record`, reporting failures to the caller.
    pub fn try_save(&self, record: &SessionRecord) -> Result<(), SessionError> {
        let text = serde_json::to_string(record).map_err(SessionError::Encode)?;
        self.db.set_state(&self.key, &text)?;
        debug!(
            identity_id = ?record.identity_id,
            repository_id = ?record.repository_id,
            branch_id = ?record.branch_id,
            "session saved"
        );
        Ok(())
    }

    /// Return the last saved record, or `None` when nothing was saved or the
    /// stored text is malformed.
    pub fn load(&self) -> Option<SessionRecord> {
        let text = match self.db.get_state(&self.key) {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to read session, starting fresh");
                return None;
            }
        };

        match decode(&text) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key = %self.key, error = %e, "ignoring malformed session record");
                None
            }
        }
    }

    /// Forget the persisted record. Failures are logged and swallowed.
    pub fn clear(&self) {
        if let Err(e) = self.db.delete_state(&self.key) {
            warn!(key = %self.key, error = %e, "failed to clear session");
        }
    }
}

/// Decode a stored record. A record with a gap in the hierarchy (a branch
/// without a repository, a repository without an identity) is malformed.
fn decode(text: &str) -> Result<SessionRecord, SessionError> {
    let record: SessionRecord = serde_json::from_str(text).map_err(SessionError::Malformed)?;
    let gap = (record.repository_id.is_some() && record.identity_id.is_none())
        || (record.branch_id.is_some() && record.repository_id.is_none());
    if gap {
        let err = <serde_json::Error as serde::de::Error>::custom("selection hierarchy has a gap");
        return Err(SessionError::Malformed(err));
    }
    Ok(record)
}
