//! Scripted in-memory gateway for unit tests.
//!
//! Records every call, answers from seeded fixtures, can fail a named
//! operation, and can hold one matching call back behind a [`Notify`] gate
//! so a test controls the order in which responses arrive.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{MergeResponse, NewCommit, RemoteGateway};
use crate::errors::GatewayError;
use crate::graph::RawGraph;
use crate::models::{
    Branch, BranchId, Commit, CommitId, CommitReceipt, FileSnapshot, Identity, IdentityId,
    Repository, RepositoryId,
};

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    ListIdentities,
    CreateIdentity(String),
    ListRepositories(Option<IdentityId>),
    CreateRepository(String, IdentityId),
    ListBranches(RepositoryId),
    CreateBranch(String, RepositoryId),
    ResetBranch(BranchId, CommitId),
    ListCommits(RepositoryId),
    GetFile(BranchId),
    CreateCommit(NewCommit),
    AttemptMerge(BranchId, BranchId),
    ForceMerge(BranchId, BranchId, String),
    GetGraph(RepositoryId),
}

impl Call {
    fn op(&self) -> &'static str {
        match self {
            Self::ListIdentities => "list_identities",
            Self::CreateIdentity(_) => "create_identity",
            Self::ListRepositories(_) => "list_repositories",
            Self::CreateRepository(..) => "create_repository",
            Self::ListBranches(_) => "list_branches",
            Self::CreateBranch(..) => "create_branch",
            Self::ResetBranch(..) => "reset_branch",
            Self::ListCommits(_) => "list_commits",
            Self::GetFile(_) => "get_file",
            Self::CreateCommit(_) => "create_commit",
            Self::AttemptMerge(..) => "attempt_merge",
            Self::ForceMerge(..) => "force_merge",
            Self::GetGraph(_) => "get_graph",
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeGateway {
    pub identities: Mutex<Vec<Identity>>,
    pub repositories: Mutex<Vec<Repository>>,
    pub branches: Mutex<Vec<Branch>>,
    pub commits: Mutex<Vec<Commit>>,
    pub files: Mutex<HashMap<BranchId, String>>,
    pub graphs: Mutex<HashMap<RepositoryId, RawGraph>>,
    pub merge_responses: Mutex<VecDeque<MergeResponse>>,
    calls: Mutex<Vec<Call>>,
    gates: Mutex<Vec<(Call, Arc<Notify>)>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two identities, one repository owned by the first, and three branches
    /// (`feature`, `main`, `master`) each with its own file content.
    pub fn seeded() -> Self {
        let fake = Self::new();
        fake.identities.lock().unwrap().extend([
            Identity { id: 1, display_name: "alice".into() },
            Identity { id: 2, display_name: "bob".into() },
        ]);
        fake.repositories.lock().unwrap().extend([
            Repository { id: 10, name: "notes".into(), owner_id: 1 },
            Repository { id: 11, name: "scratch".into(), owner_id: 1 },
        ]);
        fake.branches.lock().unwrap().extend([
            branch(100, "feature", 10, Some(1000)),
            branch(101, "main", 10, Some(1001)),
            branch(102, "master", 10, Some(1002)),
            branch(110, "dev", 11, None),
        ]);
        fake.commits.lock().unwrap().extend([
            commit(1000, "feature work", None),
            commit(1001, "init", None),
            commit(1002, "legacy", Some(1001)),
        ]);
        fake.files.lock().unwrap().extend([
            (100, "feature text".to_string()),
            (101, "main text".to_string()),
            (102, "master text".to_string()),
        ]);
        fake
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, op: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op() == op).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make every call to `op` fail with an HTTP 500.
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.failing.lock().unwrap().remove(op);
    }

    /// Hold back the next call equal to `call` until the returned gate is
    /// notified. `notify_one` before the call arrives stores a permit.
    pub fn hold(&self, call: Call) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().push((call, Arc::clone(&gate)));
        gate
    }

    pub fn queue_merge(&self, response: MergeResponse) {
        self.merge_responses.lock().unwrap().push_back(response);
    }

    async fn enter(&self, call: Call) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(call.clone());
        let gate = {
            let mut gates = self.gates.lock().unwrap();
            gates
                .iter()
                .position(|(held, _)| *held == call)
                .map(|pos| gates.remove(pos).1)
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.lock().unwrap().contains(call.op()) {
            return Err(GatewayError::Api {
                status: 500,
                body: format!("{} failed", call.op()),
            });
        }
        Ok(())
    }

    fn next_id(&self) -> i64 {
        let ids = [
            self.identities.lock().unwrap().iter().map(|i| i.id).max(),
            self.repositories.lock().unwrap().iter().map(|r| r.id).max(),
            self.branches.lock().unwrap().iter().map(|b| b.id).max(),
            self.commits.lock().unwrap().iter().map(|c| c.id).max(),
        ];
        ids.into_iter().flatten().max().unwrap_or(0) + 1
    }
}

pub(crate) fn branch(
    id: BranchId,
    name: &str,
    repository_id: RepositoryId,
    head: Option<CommitId>,
) -> Branch {
    Branch {
        id,
        name: name.into(),
        repository_id,
        head_commit_id: head,
    }
}

pub(crate) fn commit(id: CommitId, message: &str, parent: Option<CommitId>) -> Commit {
    Commit {
        id,
        message: message.into(),
        author_id: 1,
        parent_commit_id: parent,
        parent_commit_id_2: None,
        created_at: None,
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn list_identities(&self) -> Result<Vec<Identity>, GatewayError> {
        self.enter(Call::ListIdentities).await?;
        Ok(self.identities.lock().unwrap().clone())
    }

    async fn create_identity(&self, display_name: &str) -> Result<Identity, GatewayError> {
        self.enter(Call::CreateIdentity(display_name.into())).await?;
        let identity = Identity {
            id: self.next_id(),
            display_name: display_name.into(),
        };
        self.identities.lock().unwrap().push(identity.clone());
        Ok(identity)
    }

    async fn list_repositories(
        &self,
        owner_id: Option<IdentityId>,
    ) -> Result<Vec<Repository>, GatewayError> {
        self.enter(Call::ListRepositories(owner_id)).await?;
        Ok(self
            .repositories
            .lock()
            .unwrap()
            .iter()
            .filter(|r| owner_id.map_or(true, |id| r.owner_id == id))
            .cloned()
            .collect())
    }

    async fn create_repository(
        &self,
        name: &str,
        owner_id: IdentityId,
    ) -> Result<Repository, GatewayError> {
        self.enter(Call::CreateRepository(name.into(), owner_id)).await?;
        let repository = Repository {
            id: self.next_id(),
            name: name.into(),
            owner_id,
        };
        self.repositories.lock().unwrap().push(repository.clone());
        Ok(repository)
    }

    async fn list_branches(
        &self,
        repository_id: RepositoryId,
    ) -> Result<Vec<Branch>, GatewayError> {
        self.enter(Call::ListBranches(repository_id)).await?;
        Ok(self
            .branches
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.repository_id == repository_id)
            .cloned()
            .collect())
    }

    async fn create_branch(
        &self,
        name: &str,
        repository_id: RepositoryId,
    ) -> Result<Branch, GatewayError> {
        self.enter(Call::CreateBranch(name.into(), repository_id)).await?;
        let created = branch(self.next_id(), name, repository_id, None);
        self.branches.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn reset_branch(
        &self,
        branch_id: BranchId,
        commit_id: CommitId,
    ) -> Result<Branch, GatewayError> {
        self.enter(Call::ResetBranch(branch_id, commit_id)).await?;
        let mut branches = self.branches.lock().unwrap();
        let target = branches
            .iter_mut()
            .find(|b| b.id == branch_id)
            .ok_or_else(|| GatewayError::Api {
                status: 404,
                body: "branch not found".into(),
            })?;
        target.head_commit_id = Some(commit_id);
        Ok(target.clone())
    }

    async fn list_commits(&self, repository_id: RepositoryId) -> Result<Vec<Commit>, GatewayError> {
        self.enter(Call::ListCommits(repository_id)).await?;
        Ok(self.commits.lock().unwrap().clone())
    }

    async fn get_file(&self, branch_id: BranchId) -> Result<Vec<FileSnapshot>, GatewayError> {
        self.enter(Call::GetFile(branch_id)).await?;
        let text = self.files.lock().unwrap().get(&branch_id).cloned();
        Ok(text
            .map(|text| FileSnapshot {
                file_id: Some(1),
                commit_id: None,
                filename: Some("file.txt".into()),
                text,
                file_size: None,
                created_at: None,
            })
            .into_iter()
            .collect())
    }

    async fn create_commit(&self, new: &NewCommit) -> Result<CommitReceipt, GatewayError> {
        self.enter(Call::CreateCommit(new.clone())).await?;
        let parent = self
            .branches
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.id == new.branch_id)
            .and_then(|b| b.head_commit_id);
        let created = Commit {
            id: self.next_id(),
            message: new.message.clone(),
            author_id: new.author_id,
            parent_commit_id: parent,
            parent_commit_id_2: None,
            created_at: None,
        };
        self.commits.lock().unwrap().push(created.clone());
        if let Some(b) = self
            .branches
            .lock()
            .unwrap()
            .iter_mut()
            .find(|b| b.id == new.branch_id)
        {
            b.head_commit_id = Some(created.id);
        }
        self.files
            .lock()
            .unwrap()
            .insert(new.branch_id, new.content.clone());
        Ok(CommitReceipt {
            success: true,
            commit: Some(created),
        })
    }

    async fn attempt_merge(
        &self,
        source: BranchId,
        target: BranchId,
    ) -> Result<MergeResponse, GatewayError> {
        self.enter(Call::AttemptMerge(source, target)).await?;
        Ok(self
            .merge_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MergeResponse::Merged { message: None }))
    }

    async fn force_merge(
        &self,
        source: BranchId,
        target: BranchId,
        text: &str,
    ) -> Result<Option<String>, GatewayError> {
        self.enter(Call::ForceMerge(source, target, text.into())).await?;
        self.files.lock().unwrap().insert(target, text.into());
        Ok(Some("forced".into()))
    }

    async fn get_graph(&self, repository_id: RepositoryId) -> Result<RawGraph, GatewayError> {
        self.enter(Call::GetGraph(repository_id)).await?;
        Ok(self
            .graphs
            .lock()
            .unwrap()
            .get(&repository_id)
            .cloned()
            .unwrap_or_default())
    }
}
