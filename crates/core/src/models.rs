//! Domain model types shared by the gateway, navigation and merge layers.
//!
//! Every entity here is a read-only copy of state owned by the remote
//! service. Copies are refetched on navigation, never patched in place.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub type IdentityId = i64;
pub type RepositoryId = i64;
pub type BranchId = i64;
pub type CommitId = i64;

/// The service stores "no commit" as `0` as well as `null`.
fn optional_commit_id<'de, D>(deserializer: D) -> Result<Option<CommitId>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = Option::<CommitId>::deserialize(deserializer)?;
    Ok(id.filter(|id| *id > 0))
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A user account in the version-control service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    #[serde(rename = "username", alias = "display_name")]
    pub display_name: String,
}

/// A repository, owned by exactly one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub name: String,
    pub owner_id: IdentityId,
}

/// A branch of a repository. `head_commit_id` is `None` for an empty branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub repository_id: RepositoryId,
    #[serde(default, deserialize_with = "optional_commit_id")]
    pub head_commit_id: Option<CommitId>,
}

impl Branch {
    pub fn is_empty(&self) -> bool {
        self.head_commit_id.is_none()
    }
}

/// An immutable commit. A second parent marks a merge commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub message: String,
    pub author_id: IdentityId,
    #[serde(default, deserialize_with = "optional_commit_id")]
    pub parent_commit_id: Option<CommitId>,
    #[serde(default, deserialize_with = "optional_commit_id")]
    pub parent_commit_id_2: Option<CommitId>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Commit {
    pub fn is_merge(&self) -> bool {
        self.parent_commit_id_2.is_some()
    }

    /// Parse `created_at`, which the service emits either as RFC 3339 or as
    /// SQLite's `YYYY-MM-DD HH:MM:SS` (UTC).
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// One file snapshot of a branch head. The service tracks a single file, so
/// the first snapshot's `text` is the branch content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    #[serde(default)]
    pub file_id: Option<i64>,
    #[serde(default)]
    pub commit_id: Option<CommitId>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Result of `createCommit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub success: bool,
    pub commit: Option<Commit>,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Which branch-dependent view is currently shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveView {
    #[default]
    File,
    History,
    Graph,
}

impl std::fmt::Display for ActiveView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::History => write!(f, "history"),
            Self::Graph => write!(f, "graph"),
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted session
// ---------------------------------------------------------------------------

/// The persisted selection: opaque identifiers only, never entity payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default)]
    pub identity_id: Option<IdentityId>,
    #[serde(default)]
    pub repository_id: Option<RepositoryId>,
    #[serde(default)]
    pub branch_id: Option<BranchId>,
}

impl SessionRecord {
    pub fn is_empty(&self) -> bool {
        self.identity_id.is_none() && self.repository_id.is_none() && self.branch_id.is_none()
    }
}
