//! Durable checkpoints of workflow progress.
//!
//! Wraps `ApplicationRepository` so every step and state transition lands in
//! the application's status before the engine moves on. The state machine
//! lives in that status, not on a task stack, so a restarted controller
//! resumes from the last recorded step.
//!
//! Writes are skipped when the status would not change, which keeps repeated
//! passes over an unchanged workflow free of status churn.

use conductor_types::application::Application;
use conductor_types::condition::{Condition, set_condition};
use conductor_types::error::StoreError;
use conductor_types::workflow::{WorkflowState, WorkflowStatus, WorkflowStepStatus};

use crate::repository::ApplicationRepository;

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Persists workflow status transitions of an application.
pub struct CheckpointManager<A: ApplicationRepository> {
    repo: A,
}

impl<A: ApplicationRepository> CheckpointManager<A> {
    pub fn new(repo: A) -> Self {
        Self { repo }
    }

    pub fn repo(&self) -> &A {
        &self.repo
    }

    // -----------------------------------------------------------------------
    // Step-level checkpoints
    // -----------------------------------------------------------------------

    /// Record one step's status. Returns `false` when nothing changed.
    pub async fn checkpoint_step(
        &self,
        app: &mut Application,
        step: WorkflowStepStatus,
    ) -> Result<bool, CheckpointError> {
        let mut workflow = current_workflow(app);
        if workflow.step(step.index) == Some(&step) {
            return Ok(false);
        }
        let index = step.index;
        let phase = step.phase;
        workflow.upsert_step(step);
        app.status.workflow = Some(workflow);
        self.persist(app).await?;

        tracing::debug!(app = %app.key(), step_index = index, phase = ?phase, "checkpointed step");
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Run-level checkpoints
    // -----------------------------------------------------------------------

    /// Start tracking `revision_name`, discarding progress recorded for any
    /// other revision.
    pub async fn checkpoint_revision(
        &self,
        app: &mut Application,
        revision_name: &str,
    ) -> Result<bool, CheckpointError> {
        if app
            .status
            .workflow
            .as_ref()
            .is_some_and(|w| w.app_revision == revision_name)
        {
            return Ok(false);
        }
        app.status.workflow = Some(WorkflowStatus::for_revision(revision_name));
        self.persist(app).await?;

        tracing::debug!(app = %app.key(), revision = revision_name, "checkpointed new workflow run");
        Ok(true)
    }

    /// Record the overall workflow state and an optional message.
    pub async fn checkpoint_state(
        &self,
        app: &mut Application,
        state: WorkflowState,
        message: Option<String>,
    ) -> Result<bool, CheckpointError> {
        let mut workflow = current_workflow(app);
        if workflow.state == state && workflow.message == message {
            return Ok(false);
        }
        workflow.state = state;
        workflow.message = message;
        app.status.workflow = Some(workflow);
        self.persist(app).await?;

        tracing::debug!(app = %app.key(), state = %state, "checkpointed workflow state");
        Ok(true)
    }

    /// Set an application condition. Identical conditions are not rewritten.
    pub async fn checkpoint_condition(
        &self,
        app: &mut Application,
        condition: Condition,
    ) -> Result<bool, CheckpointError> {
        let before = app.status.conditions.clone();
        set_condition(&mut app.status.conditions, condition);
        if app.status.conditions == before {
            return Ok(false);
        }
        self.persist(app).await?;
        Ok(true)
    }

    /// Write the status and adopt the stored resource version.
    pub async fn persist(&self, app: &mut Application) -> Result<(), CheckpointError> {
        let stored = self.repo.update_status(app).await.map_err(|e| match e {
            StoreError::Conflict { key, .. } => CheckpointError::Conflict(key),
            other => CheckpointError::Repository(other.to_string()),
        })?;
        app.metadata.resource_version = stored.metadata.resource_version;
        Ok(())
    }
}

fn current_workflow(app: &Application) -> WorkflowStatus {
    app.status.workflow.clone().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckpointError {
    /// The application changed since it was read; the pass must start over.
    #[error("application {0} was modified concurrently")]
    Conflict(String),

    /// Underlying repository operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(String),
}

impl CheckpointError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckpointError::Conflict(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
