//! JSON-over-HTTP client for the version-control service.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{MergeResponse, NewCommit, RemoteGateway};
use crate::config::ServiceConfig;
use crate::errors::GatewayError;
use crate::graph::RawGraph;
use crate::models::{
    Branch, BranchId, Commit, CommitId, CommitReceipt, FileSnapshot, Identity, IdentityId,
    Repository, RepositoryId,
};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct UsersEnvelope {
    #[serde(default)]
    users: Vec<Identity>,
}

#[derive(Deserialize)]
struct RepositoriesEnvelope {
    #[serde(default)]
    repositories: Vec<Repository>,
}

#[derive(Deserialize)]
struct BranchesEnvelope {
    #[serde(default)]
    branches: Vec<Branch>,
}

#[derive(Deserialize)]
struct CommitsEnvelope {
    #[serde(default)]
    commits: Vec<Commit>,
}

#[derive(Deserialize)]
struct FilesEnvelope {
    #[serde(default)]
    files: Vec<FileSnapshot>,
}

#[derive(Deserialize)]
struct CommitWire {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    commit: Option<Commit>,
}

#[derive(Deserialize)]
struct MergeWire {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    text_1: Option<String>,
    #[serde(default)]
    text_2: Option<String>,
}

#[derive(Serialize)]
struct MergeRequest<'a> {
    branch_id_1: BranchId,
    branch_id_2: BranchId,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Asynchronous client for the service's REST API.
#[derive(Clone)]
pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Result<Self, GatewayError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()?;
        info!(base_url = %base_url, "created HttpGateway");
        Ok(Self { http, base_url })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, GatewayError> {
        Self::new(config.base_url.clone(), &config.user_agent)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let resp = self.http.get(self.url(path)).query(query).send().await?;
        let body = read_body(resp).await?;
        decode(operation, &body)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        payload: &B,
    ) -> Result<T, GatewayError> {
        let resp = self.http.post(self.url(path)).json(payload).send().await?;
        let body = read_body(resp).await?;
        decode(operation, &body)
    }
}

/// Fail on non-2xx and return the body text otherwise.
async fn read_body(resp: reqwest::Response) -> Result<String, GatewayError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        warn!(status = status.as_u16(), "service returned an error status");
        return Err(GatewayError::Api {
            status: status.as_u16(),
            body: if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                body
            },
        });
    }
    Ok(body)
}

fn decode<T: DeserializeOwned>(operation: &str, body: &str) -> Result<T, GatewayError> {
    serde_json::from_str(body).map_err(|e| GatewayError::Decode {
        operation: operation.to_string(),
        detail: e.to_string(),
    })
}

/// `Some(Rejected)` when the body is an explicit `{"success": false}`.
fn rejection(operation: &str, value: &Value) -> Option<GatewayError> {
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no reason given")
            .to_string();
        return Some(GatewayError::Rejected {
            operation: operation.to_string(),
            message,
        });
    }
    None
}

/// Interpret the answer to a create call. The service either echoes the new
/// entity (`Some`) or only acknowledges with `{"success": true}` (`None`).
fn creation_ack<T: DeserializeOwned>(
    operation: &str,
    value: Value,
) -> Result<Option<T>, GatewayError> {
    if let Some(err) = rejection(operation, &value) {
        return Err(err);
    }
    if value.get("id").is_some() {
        return serde_json::from_value(value)
            .map(Some)
            .map_err(|e| GatewayError::Decode {
                operation: operation.to_string(),
                detail: e.to_string(),
            });
    }
    if value.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(None);
    }
    Err(GatewayError::Decode {
        operation: operation.to_string(),
        detail: "expected the created entity or a success flag".into(),
    })
}

/// After a bare acknowledgement, the newest entity with the requested name
/// is the one just created.
fn newest_named<T>(
    operation: &str,
    items: Vec<T>,
    id: impl Fn(&T) -> i64,
    matches: impl Fn(&T) -> bool,
) -> Result<T, GatewayError> {
    items
        .into_iter()
        .filter(|item| matches(item))
        .max_by_key(|item| id(item))
        .ok_or_else(|| GatewayError::Decode {
            operation: operation.to_string(),
            detail: "created entity not found when re-listing".into(),
        })
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    #[instrument(skip(self))]
    async fn list_identities(&self) -> Result<Vec<Identity>, GatewayError> {
        let env: UsersEnvelope = self.get_json("list identities", "/user", &[]).await?;
        debug!(count = env.users.len(), "fetched identities");
        Ok(env.users)
    }

    #[instrument(skip(self))]
    async fn create_identity(&self, display_name: &str) -> Result<Identity, GatewayError> {
        const OP: &str = "create identity";
        let payload = serde_json::json!({ "username": display_name });
        let value: Value = self.post_json(OP, "/user", &payload).await?;
        let identity = match creation_ack(OP, value)? {
            Some(identity) => identity,
            None => newest_named(
                OP,
                self.list_identities().await?,
                |i: &Identity| i.id,
                |i| i.display_name == display_name,
            )?,
        };
        info!(identity_id = identity.id, "created identity");
        Ok(identity)
    }

    #[instrument(skip(self))]
    async fn list_repositories(
        &self,
        owner_id: Option<IdentityId>,
    ) -> Result<Vec<Repository>, GatewayError> {
        let query: Vec<(&str, String)> = owner_id
            .map(|id| vec![("owner_id", id.to_string())])
            .unwrap_or_default();
        let env: RepositoriesEnvelope = self
            .get_json("list repositories", "/repository", &query)
            .await?;
        debug!(count = env.repositories.len(), "fetched repositories");
        Ok(env.repositories)
    }

    #[instrument(skip(self))]
    async fn create_repository(
        &self,
        name: &str,
        owner_id: IdentityId,
    ) -> Result<Repository, GatewayError> {
        const OP: &str = "create repository";
        let payload = serde_json::json!({ "name": name, "owner_id": owner_id });
        let value: Value = self.post_json(OP, "/repository", &payload).await?;
        let repository = match creation_ack(OP, value)? {
            Some(repository) => repository,
            None => newest_named(
                OP,
                self.list_repositories(Some(owner_id)).await?,
                |r: &Repository| r.id,
                |r| r.name == name,
            )?,
        };
        info!(repository_id = repository.id, "created repository");
        Ok(repository)
    }

    #[instrument(skip(self))]
    async fn list_branches(
        &self,
        repository_id: RepositoryId,
    ) -> Result<Vec<Branch>, GatewayError> {
        let env: BranchesEnvelope = self
            .get_json(
                "list branches",
                "/branch",
                &[("repository_id", repository_id.to_string())],
            )
            .await?;
        debug!(count = env.branches.len(), "fetched branches");
        Ok(env.branches)
    }

    #[instrument(skip(self))]
    async fn create_branch(
        &self,
        name: &str,
        repository_id: RepositoryId,
    ) -> Result<Branch, GatewayError> {
        const OP: &str = "create branch";
        let payload = serde_json::json!({ "name": name, "repository_id": repository_id });
        let value: Value = self.post_json(OP, "/branch", &payload).await?;
        let branch = match creation_ack(OP, value)? {
            Some(branch) => branch,
            None => newest_named(
                OP,
                self.list_branches(repository_id).await?,
                |b: &Branch| b.id,
                |b| b.name == name,
            )?,
        };
        info!(branch_id = branch.id, "created branch");
        Ok(branch)
    }

    #[instrument(skip(self))]
    async fn reset_branch(
        &self,
        branch_id: BranchId,
        commit_id: CommitId,
    ) -> Result<Branch, GatewayError> {
        const OP: &str = "reset branch";
        let payload = serde_json::json!({ "branch_id": branch_id, "commit_id": commit_id });
        let value: Value = self.post_json(OP, "/branch/reset", &payload).await?;
        if let Some(err) = rejection(OP, &value) {
            return Err(err);
        }
        let branch_value = match value.get("branch") {
            Some(inner) => inner.clone(),
            None => value,
        };
        let branch: Branch =
            serde_json::from_value(branch_value).map_err(|e| GatewayError::Decode {
                operation: OP.to_string(),
                detail: e.to_string(),
            })?;
        info!(branch_id, head = ?branch.head_commit_id, "reset branch");
        Ok(branch)
    }

    #[instrument(skip(self))]
    async fn list_commits(&self, repository_id: RepositoryId) -> Result<Vec<Commit>, GatewayError> {
        let env: CommitsEnvelope = self
            .get_json(
                "list commits",
                "/commit",
                &[("repository_id", repository_id.to_string())],
            )
            .await?;
        debug!(count = env.commits.len(), "fetched commits");
        Ok(env.commits)
    }

    #[instrument(skip(self))]
    async fn get_file(&self, branch_id: BranchId) -> Result<Vec<FileSnapshot>, GatewayError> {
        let env: FilesEnvelope = self
            .get_json("get file", "/file", &[("branch_id", branch_id.to_string())])
            .await?;
        Ok(env.files)
    }

    #[instrument(skip(self, commit), fields(branch_id = commit.branch_id))]
    async fn create_commit(&self, commit: &NewCommit) -> Result<CommitReceipt, GatewayError> {
        let payload = serde_json::json!({
            "branch_id": commit.branch_id,
            "message": commit.message,
            "author_id": commit.author_id,
            "content": commit.content,
        });
        let wire: CommitWire = self.post_json("create commit", "/commit", &payload).await?;
        info!(success = wire.success, "commit request answered");
        Ok(CommitReceipt {
            success: wire.success,
            commit: wire.commit,
        })
    }

    #[instrument(skip(self))]
    async fn attempt_merge(
        &self,
        source: BranchId,
        target: BranchId,
    ) -> Result<MergeResponse, GatewayError> {
        let payload = MergeRequest {
            branch_id_1: source,
            branch_id_2: target,
            text: None,
        };
        let wire: MergeWire = self.post_json("merge", "/merge", &payload).await?;
        if wire.success {
            info!("service merged branches");
            return Ok(MergeResponse::Merged {
                message: wire.message,
            });
        }
        info!("service reported a merge conflict");
        Ok(MergeResponse::Conflict {
            source_text: wire.text_1.unwrap_or_default(),
            target_text: wire.text_2.unwrap_or_default(),
        })
    }

    #[instrument(skip(self, text))]
    async fn force_merge(
        &self,
        source: BranchId,
        target: BranchId,
        text: &str,
    ) -> Result<Option<String>, GatewayError> {
        const OP: &str = "force-merge";
        let payload = MergeRequest {
            branch_id_1: source,
            branch_id_2: target,
            text: Some(text),
        };
        let value: Value = self.post_json(OP, "/force-merge", &payload).await?;
        if let Some(err) = rejection(OP, &value) {
            return Err(err);
        }
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        info!("forced merge applied");
        Ok(message)
    }

    #[instrument(skip(self))]
    async fn get_graph(&self, repository_id: RepositoryId) -> Result<RawGraph, GatewayError> {
        self.get_json(
            "get graph",
            "/graph",
            &[("repository_id", repository_id.to_string())],
        )
        .await
    }
}
