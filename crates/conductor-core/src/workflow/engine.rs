//! Workflow Engine.
//!
//! Drives the per-application state machine
//! `Idle -> PreRendering -> Rendered -> Running -> {Succeeded, Failed, Stopped}`.
//!
//! Each call to [`WorkflowEngine::reconcile`] advances the machine as far as
//! it can without waiting: a step whose target has not reported a terminal
//! condition ends the pass with [`EngineOutcome::Pending`], and the caller
//! requeues the application. Every transition is checkpointed into the
//! application status before the engine moves on, so a pass may be cut off
//! at any point and the next one resumes from the recorded cursor.

use conductor_types::application::Application;
use conductor_types::condition::{Condition, ConditionStatus};
use conductor_types::error::StoreError;
use conductor_types::event::ControllerEvent;
use conductor_types::labels::{
    CONDITION_ASSEMBLED, CONDITION_WORKFLOW, REASON_FAILED, REASON_STOPPED, REASON_SUCCEEDED,
};
use conductor_types::revision::ApplicationRevision;
use conductor_types::workflow::{
    WorkflowStage, WorkflowState, WorkflowStep, WorkflowStepPhase, WorkflowStepStatus,
};

use super::checkpoint::{CheckpointError, CheckpointManager};
use super::condition::{StepProgress, evaluate};
use super::context::WorkflowContext;
use super::dispatcher::{DispatchError, StepDispatcher};
use super::renderer::StepRenderer;
use crate::assemble::Assembler;
use crate::event::EventBus;
use crate::repository::{ApplicationRepository, ObjectStore, RevisionRepository};

/// Where a reconcile pass left the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    /// The workflow is in a terminal state.
    Finished(WorkflowState),
    /// Step `index` is applied and waiting on its terminal condition.
    Pending { index: usize },
    /// Assembly hit a transient failure; retry later.
    AssemblyPending,
}

/// Result of walking one stage's steps.
enum StageResult {
    Complete,
    Pending(usize),
    Halted(WorkflowState, Option<String>),
}

/// Executes an application's workflow against a revision.
pub struct WorkflowEngine<S, V, A, R>
where
    S: ObjectStore,
    V: RevisionRepository,
    A: ApplicationRepository,
    R: StepRenderer,
{
    dispatcher: StepDispatcher<S>,
    checkpoints: CheckpointManager<A>,
    revisions: V,
    renderer: R,
    assembler: Assembler,
    events: EventBus,
}

impl<S, V, A, R> WorkflowEngine<S, V, A, R>
where
    S: ObjectStore,
    V: RevisionRepository,
    A: ApplicationRepository,
    R: StepRenderer,
{
    pub fn new(
        store: S,
        revisions: V,
        applications: A,
        renderer: R,
        assembler: Assembler,
        events: EventBus,
    ) -> Self {
        Self {
            dispatcher: StepDispatcher::new(store),
            checkpoints: CheckpointManager::new(applications),
            revisions,
            renderer,
            assembler,
            events,
        }
    }

    /// Advance `app`'s workflow for `revision` as far as possible.
    ///
    /// Progress recorded for a different revision is discarded and the step
    /// sequence restarts from the first step.
    pub async fn reconcile(
        &self,
        app: &mut Application,
        revision: &ApplicationRevision,
    ) -> Result<EngineOutcome, EngineError> {
        let steps = revision
            .spec
            .workflow
            .as_ref()
            .map(|w| w.steps.as_slice())
            .unwrap_or_default();

        if self.checkpoints.checkpoint_revision(app, &revision.name).await? {
            tracing::info!(app = %app.key(), revision = %revision.name, "starting workflow");
            self.checkpoints
                .checkpoint_condition(
                    app,
                    Condition::new(CONDITION_WORKFLOW, ConditionStatus::Unknown, "Running", ""),
                )
                .await?;
        }

        loop {
            let state = app
                .status
                .workflow
                .as_ref()
                .map(|w| w.state)
                .unwrap_or_default();

            match state {
                WorkflowState::Idle => {
                    self.transition(app, state, WorkflowState::PreRendering).await?;
                }
                WorkflowState::PreRendering => {
                    match self.run_stage(app, revision, steps, WorkflowStage::PreRender).await? {
                        StageResult::Complete => {
                            self.transition(app, state, WorkflowState::Rendered).await?;
                        }
                        StageResult::Pending(index) => return Ok(EngineOutcome::Pending { index }),
                        StageResult::Halted(terminal, message) => {
                            self.finish(app, revision, terminal, message).await?;
                        }
                    }
                }
                WorkflowState::Rendered => {
                    if let Some(outcome) = self.render(app, revision).await? {
                        return Ok(outcome);
                    }
                    self.transition(app, state, WorkflowState::Running).await?;
                }
                WorkflowState::Running => {
                    match self.run_stage(app, revision, steps, WorkflowStage::PostRender).await? {
                        StageResult::Complete => {
                            self.finish(app, revision, WorkflowState::Succeeded, None).await?;
                        }
                        StageResult::Pending(index) => return Ok(EngineOutcome::Pending { index }),
                        StageResult::Halted(terminal, message) => {
                            self.finish(app, revision, terminal, message).await?;
                        }
                    }
                }
                WorkflowState::Succeeded | WorkflowState::Failed | WorkflowState::Stopped => {
                    return Ok(EngineOutcome::Finished(state));
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Walk the steps of `stage` in index order, stopping at the first step
    /// that is not yet `succeeded`.
    async fn run_stage(
        &self,
        app: &mut Application,
        revision: &ApplicationRevision,
        steps: &[WorkflowStep],
        stage: WorkflowStage,
    ) -> Result<StageResult, EngineError> {
        for (index, step) in steps.iter().enumerate() {
            if step.stage != stage {
                continue;
            }

            let recorded = app
                .status
                .workflow
                .as_ref()
                .and_then(|w| w.step(index))
                .cloned();
            match recorded.as_ref().map(|s| s.phase) {
                Some(WorkflowStepPhase::Succeeded) => continue,
                Some(WorkflowStepPhase::Failed) => {
                    return Ok(StageResult::Halted(
                        WorkflowState::Failed,
                        recorded.and_then(|s| s.message),
                    ));
                }
                Some(WorkflowStepPhase::Stopped) => {
                    return Ok(StageResult::Halted(
                        WorkflowState::Stopped,
                        recorded.and_then(|s| s.message),
                    ));
                }
                Some(WorkflowStepPhase::Running) | None => {}
            }

            let phase = self
                .advance_step(app, revision, index, step, recorded.as_ref())
                .await?;
            let message = app
                .status
                .workflow
                .as_ref()
                .and_then(|w| w.step(index))
                .and_then(|s| s.message.clone());
            match phase {
                WorkflowStepPhase::Succeeded => continue,
                WorkflowStepPhase::Running => return Ok(StageResult::Pending(index)),
                WorkflowStepPhase::Failed => {
                    return Ok(StageResult::Halted(WorkflowState::Failed, message));
                }
                WorkflowStepPhase::Stopped => {
                    return Ok(StageResult::Halted(WorkflowState::Stopped, message));
                }
            }
        }
        Ok(StageResult::Complete)
    }

    /// Apply one step's target with its context, poll it back, and record
    /// the resulting phase.
    async fn advance_step(
        &self,
        app: &mut Application,
        revision: &ApplicationRevision,
        index: usize,
        step: &WorkflowStep,
        recorded: Option<&WorkflowStepStatus>,
    ) -> Result<WorkflowStepPhase, EngineError> {
        let target = self.renderer.render(app, revision, index, step)?;
        let context = WorkflowContext::new(app.name(), &revision.name, index);
        let applied = self.dispatcher.dispatch(target, &context).await?;

        if recorded.and_then(|s| s.applied_generation) != Some(applied.generation) {
            self.events.publish(ControllerEvent::StepApplied {
                app: app.name().to_string(),
                index,
                step_type: step.step_type.clone(),
                target: applied.target.clone(),
                generation: applied.generation,
            });
        }

        let live = self.dispatcher.poll(&applied.key).await?;
        let (phase, message) = match evaluate(&live, applied.generation) {
            StepProgress::Pending => (WorkflowStepPhase::Running, None),
            StepProgress::Stale { observed, applied: stamped } => {
                tracing::debug!(
                    app = %app.key(),
                    step_index = index,
                    observed = ?observed,
                    applied = stamped,
                    "stale workflow-finish condition"
                );
                (WorkflowStepPhase::Running, None)
            }
            StepProgress::Succeeded => (WorkflowStepPhase::Succeeded, None),
            StepProgress::Failed(message) => (WorkflowStepPhase::Failed, Some(message)),
            StepProgress::Stopped(message) => (WorkflowStepPhase::Stopped, Some(message)),
        };

        let status = WorkflowStepStatus {
            index,
            step_type: step.step_type.clone(),
            stage: step.stage,
            phase,
            resource_ref: Some(applied.target),
            message: message.clone(),
            applied_generation: Some(applied.generation),
        };
        self.checkpoints.checkpoint_step(app, status).await?;

        if recorded.map(|s| s.phase) != Some(phase) {
            tracing::info!(
                app = %app.key(),
                step_index = index,
                step_type = %step.step_type,
                phase = ?phase,
                "workflow step phase changed"
            );
            self.events.publish(ControllerEvent::StepPhaseChanged {
                app: app.name().to_string(),
                index,
                phase,
                message,
            });
        }
        Ok(phase)
    }

    /// Assemble the revision and persist its artifact once.
    ///
    /// Returns `None` when the workflow may move on to the post-render stage.
    async fn render(
        &self,
        app: &mut Application,
        revision: &ApplicationRevision,
    ) -> Result<Option<EngineOutcome>, EngineError> {
        if self
            .revisions
            .get_artifact(&revision.namespace, &revision.name)
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let manifests = self.assembler.assemble(revision).await;
        let failures = manifests.failures();
        if failures.is_empty() {
            self.revisions.persist_artifact(&manifests.artifact()).await?;
            self.checkpoints
                .checkpoint_condition(
                    app,
                    Condition::new(CONDITION_ASSEMBLED, ConditionStatus::True, REASON_SUCCEEDED, ""),
                )
                .await?;
            tracing::info!(
                app = %app.key(),
                revision = %revision.name,
                components = manifests.components().len(),
                "persisted revision artifact"
            );
            return Ok(None);
        }

        let mut retryable = true;
        let mut details = Vec::with_capacity(failures.len());
        for (component, error) in &failures {
            retryable &= error.is_retryable();
            details.push(format!("{component}: {error}"));
            self.events.publish(ControllerEvent::AssemblyFailed {
                app: app.name().to_string(),
                component: component.to_string(),
                error: error.to_string(),
                retryable: error.is_retryable(),
            });
        }
        let message = details.join("; ");

        if retryable {
            tracing::warn!(app = %app.key(), error = %message, "assembly not ready, will retry");
            self.checkpoints
                .checkpoint_condition(
                    app,
                    Condition::new(CONDITION_ASSEMBLED, ConditionStatus::False, "Pending", message),
                )
                .await?;
            return Ok(Some(EngineOutcome::AssemblyPending));
        }

        self.checkpoints
            .checkpoint_condition(
                app,
                Condition::new(CONDITION_ASSEMBLED, ConditionStatus::False, REASON_FAILED, &message),
            )
            .await?;
        self.finish(app, revision, WorkflowState::Failed, Some(message))
            .await?;
        Ok(Some(EngineOutcome::Finished(WorkflowState::Failed)))
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    async fn transition(
        &self,
        app: &mut Application,
        from: WorkflowState,
        to: WorkflowState,
    ) -> Result<(), EngineError> {
        self.checkpoints.checkpoint_state(app, to, None).await?;
        tracing::info!(app = %app.key(), from = %from, to = %to, "workflow transition");
        Ok(())
    }

    async fn finish(
        &self,
        app: &mut Application,
        revision: &ApplicationRevision,
        state: WorkflowState,
        message: Option<String>,
    ) -> Result<(), EngineError> {
        let (status, reason) = match state {
            WorkflowState::Succeeded => (ConditionStatus::True, REASON_SUCCEEDED),
            WorkflowState::Stopped => (ConditionStatus::False, REASON_STOPPED),
            _ => (ConditionStatus::False, REASON_FAILED),
        };
        let condition = Condition::new(
            CONDITION_WORKFLOW,
            status,
            reason,
            message.clone().unwrap_or_default(),
        );

        self.checkpoints.checkpoint_state(app, state, message).await?;
        self.checkpoints.checkpoint_condition(app, condition).await?;

        tracing::info!(
            app = %app.key(),
            revision = %revision.name,
            state = %state,
            "workflow finished"
        );
        self.events.publish(ControllerEvent::WorkflowFinished {
            app: app.name().to_string(),
            revision_name: revision.name.clone(),
            state,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that abort a reconcile pass of the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("revision store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Dispatch(e) => e.is_retryable(),
            EngineError::Checkpoint(e) => e.is_retryable(),
            EngineError::Store(e) => e.is_retryable(),
        }
    }

    /// Whether the pass lost an optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::Checkpoint(CheckpointError::Conflict(_))
                | EngineError::Dispatch(DispatchError::Store(StoreError::Conflict { .. }))
                | EngineError::Store(StoreError::Conflict { .. })
        )
    }
}
