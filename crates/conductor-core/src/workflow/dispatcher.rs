//! Step Dispatcher.
//!
//! Two explicit operations instead of callbacks through shared state:
//! `dispatch` applies a step's target object with its context annotation
//! (a typed "apply step + context" command) and `poll` reads the target back
//! so its terminal condition can be evaluated.

use conductor_types::error::StoreError;
use conductor_types::object::{Object, ObjectKey, TypedReference};

use super::condition::clear_finish_condition;
use super::context::WorkflowContext;
use crate::apply::apply_object_with;
use crate::repository::ObjectStore;

/// Outcome of applying one step target.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedStep {
    pub key: ObjectKey,
    pub target: TypedReference,
    /// Generation of the target right after this apply.
    pub generation: i64,
}

/// Applies step targets against the object store.
pub struct StepDispatcher<S: ObjectStore> {
    store: S,
}

impl<S: ObjectStore> StepDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Attach `context` to `target` and create-or-update it.
    ///
    /// Re-dispatching an unchanged target with an unchanged context writes
    /// nothing and returns the same generation. A target last dispatched
    /// under another context (a previous revision or step) loses its
    /// `workflow-finish` condition in the same write.
    pub async fn dispatch(
        &self,
        mut target: Object,
        context: &WorkflowContext,
    ) -> Result<AppliedStep, DispatchError> {
        context
            .attach(&mut target)
            .map_err(|e| DispatchError::Context(e.to_string()))?;

        let stored = apply_object_with(&self.store, &target, |live, merged| {
            if WorkflowContext::from_object(live).as_ref() != Some(context)
                && clear_finish_condition(merged)
            {
                tracing::info!(
                    app = %context.application_name,
                    step_index = context.workflow_index,
                    target_ref = %merged.typed_reference(),
                    "cleared workflow-finish condition left by a previous context"
                );
            }
        })
        .await?;
        let applied = AppliedStep {
            key: stored.key(),
            target: stored.typed_reference(),
            generation: stored.generation().unwrap_or_default(),
        };

        tracing::debug!(
            app = %context.application_name,
            step_index = context.workflow_index,
            target_ref = %applied.target,
            generation = applied.generation,
            "dispatched workflow step"
        );
        Ok(applied)
    }

    /// Read the current state of a dispatched target.
    pub async fn poll(&self, key: &ObjectKey) -> Result<Object, DispatchError> {
        Ok(self.store.get(key).await?)
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while rendering or dispatching a step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("cannot render step {index}: {reason}")]
    Render { index: usize, reason: String },

    #[error("cannot encode workflow context: {0}")]
    Context(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl DispatchError {
    /// Conflicts and create races resolve on the next pass.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Store(StoreError::AlreadyExists(_)) => true,
            DispatchError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}
