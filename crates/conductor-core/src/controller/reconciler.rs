//! One reconciliation pass over one application.
//!
//! A pass reads the application, makes sure a revision exists for its
//! current spec, then either hands the revision to the Workflow Engine or,
//! when no workflow is declared, assembles it and applies the resources
//! directly. A pass never waits on a step: it reports how soon it wants to
//! run again and gives the worker back.

use std::future::Future;
use std::time::Duration;

use conductor_types::application::{AppKey, Application, RevisionRef};
use conductor_types::condition::{Condition, ConditionStatus};
use conductor_types::config::ControllerConfig;
use conductor_types::error::StoreError;
use conductor_types::event::ControllerEvent;
use conductor_types::labels::{CONDITION_ASSEMBLED, REASON_FAILED, REASON_SUCCEEDED};
use conductor_types::revision::ApplicationRevision;
use tracing::Instrument;

use crate::apply::ResourceApplier;
use crate::assemble::Assembler;
use crate::assemble::options::option_chain;
use crate::event::EventBus;
use crate::repository::{ApplicationRepository, ObjectStore, RevisionRepository};
use crate::revision::{ComponentRenderer, RevisionError, RevisionTracker};
use crate::workflow::{
    CheckpointError, CheckpointManager, EngineError, EngineOutcome, StepRenderer, WorkflowEngine,
};

/// What the worker should do with a key after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Nothing left to do until the application changes.
    Done,
    /// Run again after the delay.
    RequeueAfter(Duration),
}

/// A single reconciliation pass, keyed by application.
pub trait Reconcile: Send + Sync {
    fn reconcile(
        &self,
        key: &AppKey,
    ) -> impl Future<Output = Result<ReconcileAction, ReconcileError>> + Send;
}

/// The application reconciler.
pub struct Reconciler<S, V, A, C, P, R>
where
    S: ObjectStore,
    V: RevisionRepository,
    A: ApplicationRepository,
    C: ComponentRenderer,
    P: ResourceApplier,
    R: StepRenderer,
{
    apps: A,
    status: CheckpointManager<A>,
    tracker: RevisionTracker<V, C>,
    engine: WorkflowEngine<S, V, A, R>,
    assembler: Assembler,
    applier: P,
    events: EventBus,
    requeue_after: Duration,
}

impl<S, V, A, C, P, R> Reconciler<S, V, A, C, P, R>
where
    S: ObjectStore + Clone + 'static,
    V: RevisionRepository + Clone,
    A: ApplicationRepository + Clone,
    C: ComponentRenderer,
    P: ResourceApplier,
    R: StepRenderer,
{
    /// Wire a reconciler from its ports. Assembly options come from `config`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &ControllerConfig,
        store: S,
        revisions: V,
        apps: A,
        components: C,
        applier: P,
        steps: R,
        events: EventBus,
    ) -> Self {
        let engine = WorkflowEngine::new(
            store.clone(),
            revisions.clone(),
            apps.clone(),
            steps,
            Assembler::new(option_chain(&config.assemble, store.clone())),
            events.clone(),
        );
        Self {
            status: CheckpointManager::new(apps.clone()),
            apps,
            tracker: RevisionTracker::new(revisions, components),
            engine,
            assembler: Assembler::new(option_chain(&config.assemble, store)),
            applier,
            events,
            requeue_after: config.requeue_after(),
        }
    }

    async fn reconcile_app(&self, key: &AppKey) -> Result<ReconcileAction, ReconcileError> {
        let mut app = match self.apps.get(key).await {
            Ok(app) => app,
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(app = %key, "application gone, nothing to reconcile");
                return Ok(ReconcileAction::Done);
            }
            Err(e) => return Err(e.into()),
        };

        let (revision, created) = self.tracker.ensure_current(&app).await?;
        if created {
            self.events.publish(ControllerEvent::RevisionCreated {
                app: app.name().to_string(),
                revision_name: revision.name.clone(),
                hash: revision.hash.clone(),
            });
        }
        self.record_revision(&mut app, &revision).await?;

        let has_workflow = revision
            .spec
            .workflow
            .as_ref()
            .is_some_and(|w| !w.steps.is_empty());
        if !has_workflow {
            return self.apply_directly(&mut app, &revision).await;
        }

        match self.engine.reconcile(&mut app, &revision).await? {
            EngineOutcome::Finished(state) => {
                tracing::debug!(app = %key, state = %state, "workflow finished");
                Ok(ReconcileAction::Done)
            }
            EngineOutcome::Pending { index } => {
                tracing::debug!(app = %key, step_index = index, "waiting on workflow step");
                Ok(ReconcileAction::RequeueAfter(self.requeue_after))
            }
            EngineOutcome::AssemblyPending => Ok(ReconcileAction::RequeueAfter(self.requeue_after)),
        }
    }

    /// Point the status at the current revision and the observed generation.
    async fn record_revision(
        &self,
        app: &mut Application,
        revision: &ApplicationRevision,
    ) -> Result<(), ReconcileError> {
        let latest = RevisionRef {
            name: revision.name.clone(),
            revision: revision.revision,
            hash: revision.hash.clone(),
        };
        if app.status.latest_revision.as_ref() == Some(&latest)
            && app.status.observed_generation == app.metadata.generation
        {
            return Ok(());
        }
        app.status.latest_revision = Some(latest);
        app.status.observed_generation = app.metadata.generation;
        self.status.persist(app).await?;
        Ok(())
    }

    /// Assemble and apply without a workflow. Components that assembled are
    /// applied even when others failed.
    async fn apply_directly(
        &self,
        app: &mut Application,
        revision: &ApplicationRevision,
    ) -> Result<ReconcileAction, ReconcileError> {
        let manifests = self.assembler.assemble(revision).await;
        let resources = manifests.assembled_manifests();
        self.applier.apply(&resources).await?;

        let failures = manifests.failures();
        let condition = if failures.is_empty() {
            Condition::new(CONDITION_ASSEMBLED, ConditionStatus::True, REASON_SUCCEEDED, "")
        } else {
            let message = failures
                .iter()
                .map(|(component, error)| format!("{component}: {error}"))
                .collect::<Vec<_>>()
                .join("; ");
            Condition::new(CONDITION_ASSEMBLED, ConditionStatus::False, REASON_FAILED, message)
        };
        self.status.checkpoint_condition(app, condition).await?;

        tracing::info!(
            app = %app.key(),
            revision = %revision.name,
            applied = resources.len(),
            failed = failures.len(),
            "applied assembled resources"
        );

        let mut retry = false;
        for (component, error) in &failures {
            retry |= error.is_retryable();
            self.events.publish(ControllerEvent::AssemblyFailed {
                app: app.name().to_string(),
                component: component.to_string(),
                error: error.to_string(),
                retryable: error.is_retryable(),
            });
        }
        if retry {
            return Ok(ReconcileAction::RequeueAfter(self.requeue_after));
        }
        Ok(ReconcileAction::Done)
    }
}

impl<S, V, A, C, P, R> Reconcile for Reconciler<S, V, A, C, P, R>
where
    S: ObjectStore + Clone + 'static,
    V: RevisionRepository + Clone,
    A: ApplicationRepository + Clone,
    C: ComponentRenderer,
    P: ResourceApplier,
    R: StepRenderer,
{
    async fn reconcile(&self, key: &AppKey) -> Result<ReconcileAction, ReconcileError> {
        self.reconcile_app(key)
            .instrument(tracing::debug_span!("reconcile", app = %key))
            .await
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that abort a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Revision(#[from] RevisionError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// Transient failures are retried after the conflict backoff; the rest
    /// wait for the next change to the application.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Revision(e) => e.is_retryable(),
            ReconcileError::Engine(e) => e.is_retryable(),
            ReconcileError::Checkpoint(e) => e.is_retryable(),
            ReconcileError::Store(e) => e.is_retryable(),
        }
    }
}
