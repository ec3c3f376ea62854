//! Workflow domain types.
//!
//! A workflow is an ordered list of steps, each tagged with a stage. Step
//! identity is its index in that list; statuses are recorded per index and
//! never reordered. The overall run is tracked as a `WorkflowState` machine
//! persisted in the application status so it survives controller restarts.

use serde::{Deserialize, Serialize};

use crate::object::TypedReference;

// ---------------------------------------------------------------------------
// Declaration
// ---------------------------------------------------------------------------

/// The optional control flow declared on an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

/// When a step runs relative to resource assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowStage {
    /// Runs before the resource bundle is assembled and persisted.
    PreRender,
    /// Runs against the persisted revision artifact.
    #[default]
    PostRender,
}

/// One ordered unit of delegated control logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Optional display name; identity is the step's index.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Step type, e.g. `blue-green-rollout`.
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub stage: WorkflowStage,
    /// Properties handed to the step definition.
    #[serde(default)]
    pub properties: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Phase of a single executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStepPhase {
    Running,
    Succeeded,
    Failed,
    Stopped,
}

impl WorkflowStepPhase {
    /// Terminal phases never change again for the same revision.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowStepPhase::Running)
    }
}

/// Recorded progress of one step, keyed by its index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepStatus {
    pub index: usize,
    #[serde(rename = "type")]
    pub step_type: String,
    pub stage: WorkflowStage,
    pub phase: WorkflowStepPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_ref: Option<TypedReference>,
    /// Error or stop detail reported by the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Target object generation observed right after the last apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_generation: Option<i64>,
}

/// Per-application workflow state machine.
///
/// `Idle -> PreRendering -> Rendered -> Running -> {Succeeded, Failed, Stopped}`.
/// Pre-render failures halt directly in `Failed`/`Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Idle,
    PreRendering,
    Rendered,
    Running,
    Succeeded,
    Failed,
    Stopped,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Succeeded | WorkflowState::Failed | WorkflowState::Stopped
        )
    }

    /// The stage whose steps run while in this state, if any.
    pub fn active_stage(&self) -> Option<WorkflowStage> {
        match self {
            WorkflowState::PreRendering => Some(WorkflowStage::PreRender),
            WorkflowState::Running => Some(WorkflowStage::PostRender),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowState::Idle => "idle",
            WorkflowState::PreRendering => "pre_rendering",
            WorkflowState::Rendered => "rendered",
            WorkflowState::Running => "running",
            WorkflowState::Succeeded => "succeeded",
            WorkflowState::Failed => "failed",
            WorkflowState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Workflow progress stored in the application status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    /// Revision the recorded steps belong to.
    pub app_revision: String,
    #[serde(default)]
    pub state: WorkflowState,
    #[serde(default)]
    pub steps: Vec<WorkflowStepStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WorkflowStatus {
    /// Fresh status for a newly observed revision.
    pub fn for_revision(app_revision: &str) -> Self {
        Self {
            app_revision: app_revision.to_string(),
            ..Self::default()
        }
    }

    pub fn step(&self, index: usize) -> Option<&WorkflowStepStatus> {
        self.steps.iter().find(|s| s.index == index)
    }

    /// Insert or update the status for `status.index` in place.
    pub fn upsert_step(&mut self, status: WorkflowStepStatus) {
        match self.steps.iter_mut().find(|s| s.index == status.index) {
            Some(existing) => *existing = status,
            None => {
                self.steps.push(status);
                self.steps.sort_by_key(|s| s.index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stage_defaults_to_post_render() {
        let step: WorkflowStep = serde_json::from_value(json!({
            "type": "traffic-shift",
            "properties": { "weight": 50 }
        }))
        .unwrap();
        assert_eq!(step.stage, WorkflowStage::PostRender);
        assert_eq!(step.step_type, "traffic-shift");
    }

    #[test]
    fn stage_uses_kebab_case() {
        let step: WorkflowStep =
            serde_json::from_value(json!({ "type": "gitops", "stage": "pre-render" })).unwrap();
        assert_eq!(step.stage, WorkflowStage::PreRender);
        assert_eq!(serde_json::to_value(WorkflowStage::PostRender).unwrap(), "post-render");
    }

    #[test]
    fn phase_terminality() {
        assert!(!WorkflowStepPhase::Running.is_terminal());
        assert!(WorkflowStepPhase::Succeeded.is_terminal());
        assert!(WorkflowStepPhase::Failed.is_terminal());
        assert!(WorkflowStepPhase::Stopped.is_terminal());
    }

    #[test]
    fn state_active_stage() {
        assert_eq!(WorkflowState::PreRendering.active_stage(), Some(WorkflowStage::PreRender));
        assert_eq!(WorkflowState::Running.active_stage(), Some(WorkflowStage::PostRender));
        assert_eq!(WorkflowState::Rendered.active_stage(), None);
        assert!(WorkflowState::Stopped.is_terminal());
        assert!(!WorkflowState::Rendered.is_terminal());
    }

    #[test]
    fn upsert_step_keeps_index_order() {
        let mut status = WorkflowStatus::for_revision("app-v1");
        let entry = |index, phase| WorkflowStepStatus {
            index,
            step_type: "t".to_string(),
            stage: WorkflowStage::PostRender,
            phase,
            resource_ref: None,
            message: None,
            applied_generation: None,
        };
        status.upsert_step(entry(1, WorkflowStepPhase::Running));
        status.upsert_step(entry(0, WorkflowStepPhase::Succeeded));
        status.upsert_step(entry(1, WorkflowStepPhase::Succeeded));

        assert_eq!(status.steps.len(), 2);
        assert_eq!(status.steps[0].index, 0);
        assert_eq!(status.step(1).unwrap().phase, WorkflowStepPhase::Succeeded);
    }
}
