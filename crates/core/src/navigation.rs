//! Cascading selection of identity, repository and branch.
//!
//! [`NavigationController`] owns the single [`NavigationState`]. Every
//! transition applies its clears synchronously, under the state lock, before
//! the dependent fetch is issued; the lock is never held across a gateway
//! call. Each fetch is tagged with a generation counter and the selection ids
//! current at issue time, and its result is applied only if both still match.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::errors::{CoreError, GatewayError, ValidationError};
use crate::gateway::{NewCommit, RemoteGateway};
use crate::graph::{GraphModel, GraphModelBuilder};
use crate::models::{
    ActiveView, Branch, BranchId, Commit, CommitId, CommitReceipt, Identity, IdentityId,
    Repository, SessionRecord,
};
use crate::session::SessionStore;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// The selection hierarchy. A level is only ever set when every level above
/// it is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub identity: Option<Identity>,
    pub repository: Option<Repository>,
    pub branch: Option<Branch>,
}

impl Selection {
    pub fn ids(&self) -> SessionRecord {
        SessionRecord {
            identity_id: self.identity.as_ref().map(|i| i.id),
            repository_id: self.repository.as_ref().map(|r| r.id),
            branch_id: self.branch.as_ref().map(|b| b.id),
        }
    }

    /// True when no level is set beneath an empty one.
    pub fn is_consistent(&self) -> bool {
        !(self.repository.is_some() && self.identity.is_none())
            && !(self.branch.is_some() && self.repository.is_none())
    }
}

/// Content of the active branch-dependent view.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ViewData {
    #[default]
    Unloaded,
    File(String),
    History(Vec<Commit>),
    Graph(GraphModel),
}

/// Everything the controller knows, as seen by a renderer.
#[derive(Debug, Clone, Default)]
pub struct NavigationState {
    pub identities: Vec<Identity>,
    pub repositories: Vec<Repository>,
    pub branches: Vec<Branch>,
    pub selection: Selection,
    pub active_view: ActiveView,
    pub view: ViewData,
    hierarchy_generation: u64,
    view_generation: u64,
}

/// Selection values captured when a fetch is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoadTag {
    generation: u64,
    ids: SessionRecord,
}

impl NavigationState {
    fn list_tag(&self) -> LoadTag {
        LoadTag {
            generation: self.hierarchy_generation,
            ids: self.selection.ids(),
        }
    }

    fn view_tag(&self) -> LoadTag {
        LoadTag {
            generation: self.view_generation,
            ids: self.selection.ids(),
        }
    }

    fn list_is_current(&self, tag: LoadTag) -> bool {
        tag == self.list_tag()
    }

    fn view_is_current(&self, tag: LoadTag) -> bool {
        tag == self.view_tag()
    }

    fn clear_from_branch(&mut self) {
        self.selection.branch = None;
        self.view = ViewData::Unloaded;
        self.view_generation += 1;
    }

    fn clear_from_repository(&mut self) {
        self.selection.repository = None;
        self.branches.clear();
        self.clear_from_branch();
    }

    fn clear_from_identity(&mut self) {
        self.selection.identity = None;
        self.repositories.clear();
        self.clear_from_repository();
    }

    fn set_branch(&mut self, branch: Option<Branch>) {
        self.hierarchy_generation += 1;
        self.clear_from_branch();
        self.selection.branch = branch;
    }
}

/// Pick the branch to select after a repository change: `main`, then
/// `master`, then the first branch listed.
pub fn default_branch(branches: &[Branch]) -> Option<&Branch> {
    branches
        .iter()
        .find(|b| b.name == "main")
        .or_else(|| branches.iter().find(|b| b.name == "master"))
        .or_else(|| branches.first())
}

/// Reloads whatever the current selection shows after a remote mutation.
#[async_trait]
pub trait ViewRefresher: Send + Sync {
    async fn refresh_views(&self) -> Result<(), CoreError>;
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct NavigationController<G: RemoteGateway> {
    gateway: Arc<G>,
    session: SessionStore,
    state: Mutex<NavigationState>,
}

impl<G: RemoteGateway> NavigationController<G> {
    pub fn new(gateway: Arc<G>, session: SessionStore) -> Self {
        Self {
            gateway,
            session,
            state: Mutex::new(NavigationState::default()),
        }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> NavigationState {
        self.lock().clone()
    }

    pub fn selection(&self) -> Selection {
        self.lock().selection.clone()
    }

    fn lock(&self) -> MutexGuard<'_, NavigationState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self) {
        let ids = self.lock().selection.ids();
        self.session.save(&ids);
    }

    // -- transitions -------------------------------------------------------

    /// Select an identity from the loaded identity list (or clear it), then
    /// load that identity's repositories.
    pub async fn select_identity(&self, id: Option<IdentityId>) -> Result<(), CoreError> {
        if self.apply_identity(id).await? {
            self.persist();
        }
        Ok(())
    }

    async fn apply_identity(&self, id: Option<IdentityId>) -> Result<bool, CoreError> {
        let (tag, owner_id) = {
            let mut state = self.lock();
            let identity = match id {
                Some(id) => Some(
                    state
                        .identities
                        .iter()
                        .find(|i| i.id == id)
                        .cloned()
                        .ok_or(ValidationError::UnknownIdentity(id))?,
                ),
                None => None,
            };
            state.hierarchy_generation += 1;
            state.clear_from_identity();
            state.selection.identity = identity;
            info!(identity_id = ?id, "selected identity");
            match id {
                Some(owner_id) => (state.list_tag(), owner_id),
                None => return Ok(true),
            }
        };

        let repositories = surfaced(
            "list repositories",
            self.gateway.list_repositories(Some(owner_id)).await,
        )?;

        let mut state = self.lock();
        if !state.list_is_current(tag) {
            debug!(identity_id = owner_id, "discarding stale repository list");
            return Ok(false);
        }
        debug!(count = repositories.len(), "repository list applied");
        state.repositories = repositories;
        Ok(true)
    }

    /// Select a repository of the current identity (or clear it), then load
    /// its branches and auto-select the default one.
    pub async fn select_repository(&self, repository: Option<Repository>) -> Result<(), CoreError> {
        if self.apply_repository(repository, None).await? {
            self.persist();
            self.load_active_view().await?;
        }
        Ok(())
    }

    /// With a `preferred` branch id only that branch may be selected; a
    /// vanished id leaves the branch empty. Without one, [`default_branch`]
    /// is auto-selected.
    async fn apply_repository(
        &self,
        repository: Option<Repository>,
        preferred: Option<BranchId>,
    ) -> Result<bool, CoreError> {
        let (tag, repository_id) = {
            let mut state = self.lock();
            if let Some(repo) = &repository {
                let owner = state
                    .selection
                    .identity
                    .as_ref()
                    .ok_or(ValidationError::MissingSelection("identity"))?;
                if repo.owner_id != owner.id {
                    return Err(ValidationError::ForeignEntity {
                        kind: "repository",
                        id: repo.id,
                        parent: "identity",
                    }
                    .into());
                }
            }
            state.hierarchy_generation += 1;
            state.clear_from_repository();
            state.selection.repository = repository.clone();
            info!(repository_id = ?repository.as_ref().map(|r| r.id), "selected repository");
            match &repository {
                Some(repo) => (state.list_tag(), repo.id),
                None => return Ok(true),
            }
        };

        let branches = surfaced(
            "list branches",
            self.gateway.list_branches(repository_id).await,
        )?;

        let mut state = self.lock();
        if !state.list_is_current(tag) {
            debug!(repository_id, "discarding stale branch list");
            return Ok(false);
        }
        let chosen = match preferred {
            Some(id) => {
                let found = branches.iter().find(|b| b.id == id);
                if found.is_none() {
                    info!(branch_id = id, "persisted branch no longer exists");
                }
                found
            }
            None => default_branch(&branches),
        }
        .cloned();
        state.branches = branches;
        if let Some(branch) = chosen {
            info!(branch_id = branch.id, branch = %branch.name, "auto-selected branch");
            state.set_branch(Some(branch));
        }
        Ok(true)
    }

    /// Select a branch of the current repository (or clear it), then reload
    /// the active view for it.
    pub async fn select_branch(&self, branch: Option<Branch>) -> Result<(), CoreError> {
        {
            let mut state = self.lock();
            if let Some(branch) = &branch {
                let repo = state
                    .selection
                    .repository
                    .as_ref()
                    .ok_or(ValidationError::MissingSelection("repository"))?;
                if branch.repository_id != repo.id {
                    return Err(ValidationError::ForeignEntity {
                        kind: "branch",
                        id: branch.id,
                        parent: "repository",
                    }
                    .into());
                }
            }
            info!(branch_id = ?branch.as_ref().map(|b| b.id), "selected branch");
            state.set_branch(branch);
        }
        self.persist();
        self.load_active_view().await
    }

    /// Switch the active view and load it if a branch is selected. The
    /// selection is left alone.
    pub async fn set_active_view(&self, view: ActiveView) -> Result<(), CoreError> {
        {
            let mut state = self.lock();
            state.active_view = view;
            state.view = ViewData::Unloaded;
            state.view_generation += 1;
        }
        debug!(%view, "active view changed");
        self.load_active_view().await
    }

    /// Reload the branch list, then the active view.
    pub async fn refresh_views(&self) -> Result<(), CoreError> {
        self.refresh_branches().await?;
        self.load_active_view().await
    }

    async fn load_active_view(&self) -> Result<(), CoreError> {
        let (tag, view, repository_id, branch_id) = {
            let mut state = self.lock();
            let (repository_id, branch_id) =
                match (&state.selection.repository, &state.selection.branch) {
                    (Some(repo), Some(branch)) => (repo.id, branch.id),
                    _ => return Ok(()),
                };
            state.view_generation += 1;
            (state.view_tag(), state.active_view, repository_id, branch_id)
        };

        let data = match view {
            ActiveView::File => {
                let files = surfaced("get file", self.gateway.get_file(branch_id).await)?;
                ViewData::File(files.into_iter().next().map(|f| f.text).unwrap_or_default())
            }
            ActiveView::History => {
                let commits =
                    surfaced("list commits", self.gateway.list_commits(repository_id).await)?;
                ViewData::History(commits)
            }
            ActiveView::Graph => {
                let raw = surfaced("get graph", self.gateway.get_graph(repository_id).await)?;
                ViewData::Graph(GraphModelBuilder::build(&raw))
            }
        };

        let mut state = self.lock();
        if !state.view_is_current(tag) {
            debug!(branch_id, %view, "discarding stale view data");
            return Ok(());
        }
        state.view = data;
        Ok(())
    }

    // -- session restore ---------------------------------------------------

    /// Load identities and replay the persisted selection with freshly
    /// fetched entities. Replay stops at the first level whose id no longer
    /// exists. Returns the selection that was restored.
    pub async fn restore(&self) -> Result<SessionRecord, CoreError> {
        let record = self.session.load();
        self.refresh_identities().await?;

        let Some(identity_id) = record.and_then(|r| r.identity_id) else {
            debug!("no prior session");
            return Ok(self.lock().selection.ids());
        };
        if !self.lock().identities.iter().any(|i| i.id == identity_id) {
            info!(identity_id, "persisted identity no longer exists");
            return Ok(self.lock().selection.ids());
        }
        if !self.apply_identity(Some(identity_id)).await? {
            return Ok(self.lock().selection.ids());
        }

        let repository = record.and_then(|r| r.repository_id).and_then(|id| {
            self.lock()
                .repositories
                .iter()
                .find(|repo| repo.id == id)
                .cloned()
        });
        if let Some(repository) = repository {
            let preferred = record.and_then(|r| r.branch_id);
            self.apply_repository(Some(repository), preferred).await?;
        }

        self.persist();
        self.load_active_view().await?;
        let restored = self.lock().selection.ids();
        info!(
            identity_id = ?restored.identity_id,
            repository_id = ?restored.repository_id,
            branch_id = ?restored.branch_id,
            "session restored"
        );
        Ok(restored)
    }

    // -- list refreshes ----------------------------------------------------

    /// Re-list identities. A selected identity that vanished is cleared
    /// together with everything beneath it.
    pub async fn refresh_identities(&self) -> Result<Vec<Identity>, CoreError> {
        let identities = surfaced("list identities", self.gateway.list_identities().await)?;
        let mut state = self.lock();
        let selected = state.selection.identity.as_ref().map(|i| i.id);
        let fresh = selected.and_then(|id| identities.iter().find(|i| i.id == id).cloned());
        let vanished = selected.is_some() && fresh.is_none();
        if fresh.is_some() {
            state.selection.identity = fresh;
        }
        if vanished {
            warn!("selected identity no longer exists");
            state.hierarchy_generation += 1;
            state.clear_from_identity();
        }
        state.identities = identities.clone();
        drop(state);
        if vanished {
            self.persist();
        }
        Ok(identities)
    }

    /// Re-list the current identity's repositories.
    pub async fn refresh_repositories(&self) -> Result<Vec<Repository>, CoreError> {
        let (tag, owner_id) = {
            let state = self.lock();
            let identity = state
                .selection
                .identity
                .as_ref()
                .ok_or(ValidationError::MissingSelection("identity"))?;
            (state.list_tag(), identity.id)
        };
        let repositories = surfaced(
            "list repositories",
            self.gateway.list_repositories(Some(owner_id)).await,
        )?;

        let mut state = self.lock();
        if !state.list_is_current(tag) {
            debug!("discarding stale repository list");
            return Ok(repositories);
        }
        let selected = state.selection.repository.as_ref().map(|r| r.id);
        let fresh = selected.and_then(|id| repositories.iter().find(|r| r.id == id).cloned());
        let vanished = selected.is_some() && fresh.is_none();
        if fresh.is_some() {
            state.selection.repository = fresh;
        }
        if vanished {
            warn!("selected repository no longer exists");
            state.hierarchy_generation += 1;
            state.clear_from_repository();
        }
        state.repositories = repositories.clone();
        drop(state);
        if vanished {
            self.persist();
        }
        Ok(repositories)
    }

    /// Re-list the current repository's branches, picking up moved heads.
    pub async fn refresh_branches(&self) -> Result<Vec<Branch>, CoreError> {
        let (tag, repository_id) = {
            let state = self.lock();
            let repo = state
                .selection
                .repository
                .as_ref()
                .ok_or(ValidationError::MissingSelection("repository"))?;
            (state.list_tag(), repo.id)
        };
        let branches = surfaced(
            "list branches",
            self.gateway.list_branches(repository_id).await,
        )?;

        let mut state = self.lock();
        if !state.list_is_current(tag) {
            debug!(repository_id, "discarding stale branch list");
            return Ok(branches);
        }
        let selected = state.selection.branch.as_ref().map(|b| b.id);
        let fresh = selected.and_then(|id| branches.iter().find(|b| b.id == id).cloned());
        let vanished = selected.is_some() && fresh.is_none();
        if fresh.is_some() {
            state.selection.branch = fresh;
        }
        if vanished {
            warn!("selected branch no longer exists");
            state.set_branch(None);
        }
        state.branches = branches.clone();
        drop(state);
        if vanished {
            self.persist();
        }
        Ok(branches)
    }

    // -- entity management -------------------------------------------------

    pub async fn create_identity(&self, display_name: &str) -> Result<Identity, CoreError> {
        let name = required("display name", display_name)?;
        let identity = surfaced("create identity", self.gateway.create_identity(name).await)?;
        info!(identity_id = identity.id, "identity created");
        self.refresh_identities().await?;
        Ok(identity)
    }

    pub async fn create_repository(&self, name: &str) -> Result<Repository, CoreError> {
        let name = required("repository name", name)?;
        let owner_id = self
            .lock()
            .selection
            .identity
            .as_ref()
            .map(|i| i.id)
            .ok_or(ValidationError::MissingSelection("identity"))?;
        let repository = surfaced(
            "create repository",
            self.gateway.create_repository(name, owner_id).await,
        )?;
        info!(repository_id = repository.id, "repository created");
        self.refresh_repositories().await?;
        Ok(repository)
    }

    pub async fn create_branch(&self, name: &str) -> Result<Branch, CoreError> {
        let name = required("branch name", name)?;
        let repository_id = self
            .lock()
            .selection
            .repository
            .as_ref()
            .map(|r| r.id)
            .ok_or(ValidationError::MissingSelection("repository"))?;
        let branch = surfaced(
            "create branch",
            self.gateway.create_branch(name, repository_id).await,
        )?;
        info!(branch_id = branch.id, "branch created");
        self.refresh_branches().await?;
        Ok(branch)
    }

    /// Commit `content` as the new file text of the selected branch.
    pub async fn create_commit(
        &self,
        message: &str,
        content: &str,
    ) -> Result<CommitReceipt, CoreError> {
        let message = required("commit message", message)?;
        let (author_id, branch_id) = {
            let state = self.lock();
            let author = state
                .selection
                .identity
                .as_ref()
                .ok_or(ValidationError::MissingSelection("identity"))?;
            let branch = state
                .selection
                .branch
                .as_ref()
                .ok_or(ValidationError::MissingSelection("branch"))?;
            (author.id, branch.id)
        };
        let request = NewCommit {
            branch_id,
            message: message.to_string(),
            author_id,
            content: content.to_string(),
        };
        let receipt = surfaced("create commit", self.gateway.create_commit(&request).await)?;
        if !receipt.success {
            return Err(GatewayError::Rejected {
                operation: "create commit".into(),
                message: "the service did not record the commit".into(),
            }
            .into());
        }
        info!(branch_id, commit_id = ?receipt.commit.as_ref().map(|c| c.id), "commit created");
        self.refresh_views().await?;
        Ok(receipt)
    }

    /// Point the selected branch at `commit_id`.
    pub async fn reset_branch(&self, commit_id: CommitId) -> Result<Branch, CoreError> {
        let branch_id = self
            .lock()
            .selection
            .branch
            .as_ref()
            .map(|b| b.id)
            .ok_or(ValidationError::MissingSelection("branch"))?;
        let branch = surfaced(
            "reset branch",
            self.gateway.reset_branch(branch_id, commit_id).await,
        )?;
        info!(branch_id, commit_id, "branch reset");
        self.refresh_views().await?;
        Ok(branch)
    }
}

#[async_trait]
impl<G: RemoteGateway> ViewRefresher for NavigationController<G> {
    async fn refresh_views(&self) -> Result<(), CoreError> {
        NavigationController::refresh_views(self).await
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(trimmed)
}

/// Log a failed gateway call before handing it to the caller.
fn surfaced<T>(operation: &str, result: Result<T, GatewayError>) -> Result<T, CoreError> {
    result.map_err(|e| {
        warn!(operation, error = %e, "gateway call failed");
        CoreError::from(e)
    })
}
