//! Event types for the controller event bus.
//!
//! `ControllerEvent` is broadcast as reconciliation progresses. All variants
//! are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};

use crate::object::TypedReference;
use crate::workflow::{WorkflowState, WorkflowStepPhase};

/// Events emitted while reconciling applications.
///
/// Used by the event bus to surface revision, workflow, and assembly
/// progress to subscribers (CLI output, logging, tests).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    /// A new immutable revision was recorded for an application.
    RevisionCreated {
        app: String,
        revision_name: String,
        hash: String,
    },

    /// A workflow step's target object was applied.
    StepApplied {
        app: String,
        index: usize,
        step_type: String,
        target: TypedReference,
        generation: i64,
    },

    /// A step moved to a new phase.
    StepPhaseChanged {
        app: String,
        index: usize,
        phase: WorkflowStepPhase,
        message: Option<String>,
    },

    /// The workflow reached a terminal state.
    WorkflowFinished {
        app: String,
        revision_name: String,
        state: WorkflowState,
    },

    /// A component failed to assemble.
    AssemblyFailed {
        app: String,
        component: String,
        error: String,
        retryable: bool,
    },
}

impl ControllerEvent {
    /// Name of the application the event belongs to.
    pub fn app(&self) -> &str {
        match self {
            ControllerEvent::RevisionCreated { app, .. }
            | ControllerEvent::StepApplied { app, .. }
            | ControllerEvent::StepPhaseChanged { app, .. }
            | ControllerEvent::WorkflowFinished { app, .. }
            | ControllerEvent::AssemblyFailed { app, .. } => app,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ControllerEvent::WorkflowFinished {
            app: "demo".to_string(),
            revision_name: "demo-v2".to_string(),
            state: WorkflowState::Stopped,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "workflow_finished");
        assert_eq!(json["state"], "stopped");
        assert_eq!(event.app(), "demo");
    }
}
