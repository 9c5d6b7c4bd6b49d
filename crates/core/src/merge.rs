//! Two-phase merge: an optimistic attempt, then forced resolution of a
//! conflict with client-supplied content.
//!
//! ```text
//! idle -> attempting -> merged
//!                    -> conflicted -> resolving -> resolved
//!                                  <- (force-merge failed)
//! ```
//!
//! At most one workflow exists at a time. Starting a new attempt, or
//! [`cancel`](MergeWorkflowCoordinator::cancel), discards the previous one;
//! a late answer for a discarded workflow is dropped and reported as
//! [`MergeError::Superseded`].

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{CoreError, MergeError, ValidationError};
use crate::gateway::{MergeResponse, RemoteGateway};
use crate::models::BranchId;
use crate::navigation::ViewRefresher;

/// The two divergent file contents of a conflicted attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictContext {
    /// Content of the source branch (`text_1`).
    pub source: String,
    /// Content of the target branch (`text_2`).
    pub target: String,
}

impl ConflictContext {
    /// Unified diff turning the target content into the source content.
    pub fn diff(&self) -> String {
        diffy::create_patch(&self.target, &self.source).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeState {
    Idle,
    Attempting,
    Merged,
    Conflicted(ConflictContext),
    Resolving(ConflictContext),
    Resolved,
}

impl MergeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged | Self::Resolved)
    }

    pub fn conflict(&self) -> Option<&ConflictContext> {
        match self {
            Self::Conflicted(ctx) | Self::Resolving(ctx) => Some(ctx),
            _ => None,
        }
    }
}

/// How the user chose to settle a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    UseSource,
    UseTarget,
    Manual(String),
}

impl Resolution {
    /// The literal content the forced merge will write.
    pub fn content<'a>(&'a self, conflict: &'a ConflictContext) -> &'a str {
        match self {
            Self::UseSource => &conflict.source,
            Self::UseTarget => &conflict.target,
            Self::Manual(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    Conflict(ConflictContext),
}

/// Result of [`MergeWorkflowCoordinator::attempt_merge`]. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeAttempt {
    pub source_branch_id: BranchId,
    pub target_branch_id: BranchId,
    pub outcome: MergeOutcome,
    /// Message the service attached to a clean merge.
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
struct MergeWorkflow {
    id: Uuid,
    source: BranchId,
    target: BranchId,
    state: MergeState,
}

pub struct MergeWorkflowCoordinator<G: RemoteGateway> {
    gateway: Arc<G>,
    refresher: Arc<dyn ViewRefresher>,
    workflow: Mutex<Option<MergeWorkflow>>,
}

impl<G: RemoteGateway> MergeWorkflowCoordinator<G> {
    pub fn new(gateway: Arc<G>, refresher: Arc<dyn ViewRefresher>) -> Self {
        Self {
            gateway,
            refresher,
            workflow: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<MergeWorkflow>> {
        self.workflow.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> MergeState {
        self.lock()
            .as_ref()
            .map(|w| w.state.clone())
            .unwrap_or(MergeState::Idle)
    }

    /// Source and target of the current workflow, if any.
    pub fn branches(&self) -> Option<(BranchId, BranchId)> {
        self.lock().as_ref().map(|w| (w.source, w.target))
    }

    /// Merge `source` into `target` without forcing. A conflict is returned
    /// as [`MergeOutcome::Conflict`] and leaves both branches untouched.
    pub async fn attempt_merge(
        &self,
        source: BranchId,
        target: BranchId,
    ) -> Result<MergeAttempt, CoreError> {
        if source == target {
            warn!(branch_id = source, "refusing to merge a branch into itself");
            return Err(ValidationError::SameBranch(source).into());
        }

        let id = Uuid::new_v4();
        {
            let mut workflow = self.lock();
            if let Some(prev) = workflow.as_ref().filter(|w| !w.state.is_terminal()) {
                info!(workflow = %prev.id, "discarding unfinished merge workflow");
            }
            *workflow = Some(MergeWorkflow {
                id,
                source,
                target,
                state: MergeState::Attempting,
            });
        }
        info!(workflow = %id, source, target, "attempting merge");

        let response = self.gateway.attempt_merge(source, target).await;
        let merged_remotely = matches!(response, Ok(MergeResponse::Merged { .. }));

        let attempt = {
            let mut guard = self.lock();
            match guard.as_mut().filter(|w| w.id == id) {
                None => None,
                Some(workflow) => Some(match response {
                    Err(e) => {
                        warn!(workflow = %id, error = %e, "merge attempt failed");
                        *guard = None;
                        return Err(e.into());
                    }
                    Ok(MergeResponse::Merged { message }) => {
                        workflow.state = MergeState::Merged;
                        MergeAttempt {
                            source_branch_id: source,
                            target_branch_id: target,
                            outcome: MergeOutcome::Merged,
                            message,
                        }
                    }
                    Ok(MergeResponse::Conflict {
                        source_text,
                        target_text,
                    }) => {
                        let conflict = ConflictContext {
                            source: source_text,
                            target: target_text,
                        };
                        workflow.state = MergeState::Conflicted(conflict.clone());
                        MergeAttempt {
                            source_branch_id: source,
                            target_branch_id: target,
                            outcome: MergeOutcome::Conflict(conflict),
                            message: None,
                        }
                    }
                }),
            }
        };

        let Some(attempt) = attempt else {
            debug!(workflow = %id, "dropping answer for superseded merge");
            if merged_remotely {
                self.refresh().await;
            }
            return Err(MergeError::Superseded(id).into());
        };

        match attempt.outcome {
            MergeOutcome::Merged => {
                info!(workflow = %id, "branches merged");
                self.refresh().await;
            }
            MergeOutcome::Conflict(_) => {
                info!(workflow = %id, "merge conflict, awaiting resolution")
            }
        }
        Ok(attempt)
    }

    /// Settle the pending conflict by forcing the merge with the content
    /// `resolution` selects. On failure the workflow stays conflicted and
    /// nothing is retried.
    pub async fn resolve_conflict(
        &self,
        resolution: Resolution,
    ) -> Result<Option<String>, CoreError> {
        let (id, source, target, conflict, content) = {
            let mut guard = self.lock();
            let workflow = guard.as_mut().ok_or(ValidationError::NoPendingConflict)?;
            let conflict = match &workflow.state {
                MergeState::Conflicted(conflict) => conflict.clone(),
                _ => return Err(ValidationError::NoPendingConflict.into()),
            };
            let content = resolution.content(&conflict).to_string();
            workflow.state = MergeState::Resolving(conflict.clone());
            (workflow.id, workflow.source, workflow.target, conflict, content)
        };
        info!(workflow = %id, source, target, ?resolution, "forcing merge");

        let result = self.gateway.force_merge(source, target, &content).await;

        let current = {
            let mut guard = self.lock();
            match guard.as_mut().filter(|w| w.id == id) {
                Some(workflow) => {
                    workflow.state = match &result {
                        Ok(_) => MergeState::Resolved,
                        Err(_) => MergeState::Conflicted(conflict),
                    };
                    true
                }
                None => false,
            }
        };

        let message = match (result, current) {
            (Ok(message), _) => message,
            (Err(e), true) => {
                warn!(workflow = %id, error = %e, "forced merge failed, conflict still pending");
                return Err(e.into());
            }
            (Err(_), false) => {
                debug!(workflow = %id, "dropping failure for superseded resolution");
                return Err(MergeError::Superseded(id).into());
            }
        };

        self.refresh().await;
        if !current {
            debug!(workflow = %id, "resolution landed after the workflow was superseded");
            return Err(MergeError::Superseded(id).into());
        }
        info!(workflow = %id, "conflict resolved");
        Ok(message)
    }

    /// Drop the current workflow. Returns whether one existed.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(workflow) => {
                info!(workflow = %workflow.id, "merge workflow cancelled");
                true
            }
            None => false,
        }
    }

    async fn refresh(&self) {
        if let Err(e) = self.refresher.refresh_views().await {
            warn!(error = %e, "views could not be refreshed after merge");
        }
    }
}
