//! Error types for the branchview core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type. A merge conflict is deliberately absent here: it is a normal
//! outcome of [`crate::merge::MergeWorkflowCoordinator`], not a failure.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl CoreError {
    /// True when the error came from the remote service or the transport to
    /// it, as opposed to a local rejection.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Gateway(_))
    }
}

// ---------------------------------------------------------------------------
// Gateway errors
// ---------------------------------------------------------------------------

/// Errors from the remote version-control service.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP-level transport error (connection refused, TLS, etc.).
    #[error("service unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status code.
    #[error("service error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("malformed service response for {operation}: {detail}")]
    Decode { operation: String, detail: String },

    /// The service accepted the request but reported `success: false`.
    #[error("service rejected {operation}: {message}")]
    Rejected { operation: String, message: String },
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Domain rejections detected locally, before any remote call is issued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field was empty after trimming.
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    /// Source and target of a merge are the same branch.
    #[error("cannot merge branch {0} into itself")]
    SameBranch(i64),

    /// The operation needs a selection level that is currently empty.
    #[error("select a {0} first")]
    MissingSelection(&'static str),

    /// The entity belongs to a different parent than the current selection.
    #[error("{kind} {id} does not belong to the selected {parent}")]
    ForeignEntity {
        kind: &'static str,
        id: i64,
        parent: &'static str,
    },

    /// The requested identity is not in the loaded identity list.
    #[error("unknown identity {0}")]
    UnknownIdentity(i64),

    /// `resolve_conflict` was called with no conflicted workflow pending.
    #[error("no merge conflict is awaiting resolution")]
    NoPendingConflict,
}

// ---------------------------------------------------------------------------
// Merge workflow errors
// ---------------------------------------------------------------------------

/// Errors specific to the merge workflow state machine.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A newer merge attempt replaced this workflow while its call was in
    /// flight; the late result was discarded.
    #[error("merge workflow {0} was superseded by a newer attempt")]
    Superseded(uuid::Uuid),
}

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

/// Errors encoding or decoding the persisted selection.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session record could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("session record is malformed: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("session storage error: {0}")]
    Storage(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite key-value store.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// Generic I/O error (e.g. creating the data directory).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
