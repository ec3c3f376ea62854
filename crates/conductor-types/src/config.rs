//! Controller configuration types.
//!
//! `ControllerConfig` represents the `conductor.toml` file that sizes the
//! worker pool, sets requeue delays, toggles workload options, and maps
//! workflow step types onto their target object kinds. All fields have
//! defaults, so an empty file is a valid configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::object::GroupKind;

/// Top-level controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Number of applications reconciled concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Delay before re-checking an application whose step is still pending.
    #[serde(default = "default_requeue_after_secs")]
    pub requeue_after_secs: u64,

    /// Delay before retrying after an optimistic-concurrency conflict.
    #[serde(default = "default_conflict_backoff_ms")]
    pub conflict_backoff_ms: u64,

    /// Period of the full re-check that enqueues every application.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,

    #[serde(default)]
    pub assemble: AssembleConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,
}

fn default_workers() -> usize {
    4
}

fn default_requeue_after_secs() -> u64 {
    30
}

fn default_conflict_backoff_ms() -> u64 {
    500
}

fn default_resync_interval_secs() -> u64 {
    300
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            requeue_after_secs: default_requeue_after_secs(),
            conflict_backoff_ms: default_conflict_backoff_ms(),
            resync_interval_secs: default_resync_interval_secs(),
            assemble: AssembleConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_after_secs)
    }

    pub fn conflict_backoff(&self) -> Duration {
        Duration::from_millis(self.conflict_backoff_ms)
    }

    /// Zero disables the periodic re-check.
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }
}

/// Which workload options run during assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembleConfig {
    /// Workload kinds that cannot be mutated in place; their workloads are
    /// named after the component revision instead of the component.
    #[serde(default)]
    pub non_in_place_kinds: Vec<GroupKind>,

    /// Replace externally released workloads with the live object.
    #[serde(default = "default_true")]
    pub discover_external_releases: bool,

    /// Pause workloads and release controller ownership for a rollout controller.
    #[serde(default)]
    pub prepare_for_rollout: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AssembleConfig {
    fn default() -> Self {
        Self {
            non_in_place_kinds: Vec::new(),
            discover_external_releases: true,
            prepare_for_rollout: false,
        }
    }
}

/// Target object kind a workflow step type is applied as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepKind {
    pub api_version: String,
    pub kind: String,
}

impl StepKind {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }
}

/// Step type to target object mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub step_kinds: BTreeMap<String, StepKind>,

    /// Used for step types with no explicit entry.
    #[serde(default = "default_step_kind")]
    pub default_step_kind: StepKind,
}

fn default_step_kind() -> StepKind {
    StepKind::new("core.oam.dev/v1alpha1", "WorkflowStep")
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            step_kinds: BTreeMap::new(),
            default_step_kind: default_step_kind(),
        }
    }
}

impl WorkflowConfig {
    pub fn kind_for(&self, step_type: &str) -> &StepKind {
        self.step_kinds
            .get(step_type)
            .unwrap_or(&self.default_step_kind)
    }
}
