//! The single channel to the remote version-control service.
//!
//! [`RemoteGateway`] is the seam every other component talks through;
//! [`HttpGateway`] is the production implementation over the service's JSON
//! API. Tests substitute a scripted fake.

pub mod http;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

use crate::errors::GatewayError;
use crate::graph::RawGraph;
use crate::models::{
    Branch, BranchId, Commit, CommitId, CommitReceipt, FileSnapshot, Identity, IdentityId,
    Repository, RepositoryId,
};

pub use http::HttpGateway;

/// Parameters of `createCommit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub branch_id: BranchId,
    pub message: String,
    pub author_id: IdentityId,
    pub content: String,
}

/// Outcome of a non-destructive merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResponse {
    /// The service committed the merge.
    Merged { message: Option<String> },
    /// The branches diverge; nothing was committed. `source_text` is the
    /// source branch content (`text_1`), `target_text` the target's (`text_2`).
    Conflict {
        source_text: String,
        target_text: String,
    },
}

/// Read and write operations on the service, one per entity type.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn list_identities(&self) -> Result<Vec<Identity>, GatewayError>;

    async fn create_identity(&self, display_name: &str) -> Result<Identity, GatewayError>;

    async fn list_repositories(
        &self,
        owner_id: Option<IdentityId>,
    ) -> Result<Vec<Repository>, GatewayError>;

    async fn create_repository(
        &self,
        name: &str,
        owner_id: IdentityId,
    ) -> Result<Repository, GatewayError>;

    async fn list_branches(&self, repository_id: RepositoryId) -> Result<Vec<Branch>, GatewayError>;

    async fn create_branch(
        &self,
        name: &str,
        repository_id: RepositoryId,
    ) -> Result<Branch, GatewayError>;

    async fn reset_branch(
        &self,
        branch_id: BranchId,
        commit_id: CommitId,
    ) -> Result<Branch, GatewayError>;

    async fn list_commits(&self, repository_id: RepositoryId) -> Result<Vec<Commit>, GatewayError>;

    async fn get_file(&self, branch_id: BranchId) -> Result<Vec<FileSnapshot>, GatewayError>;

    async fn create_commit(&self, commit: &NewCommit) -> Result<CommitReceipt, GatewayError>;

    /// Try to merge `source` into `target` without forcing anything.
    async fn attempt_merge(
        &self,
        source: BranchId,
        target: BranchId,
    ) -> Result<MergeResponse, GatewayError>;

    /// Merge `source` into `target`, replacing the target content with
    /// `text` in one remote operation. Returns the service's message.
    async fn force_merge(
        &self,
        source: BranchId,
        target: BranchId,
        text: &str,
    ) -> Result<Option<String>, GatewayError>;

    async fn get_graph(&self, repository_id: RepositoryId) -> Result<RawGraph, GatewayError>;
}
