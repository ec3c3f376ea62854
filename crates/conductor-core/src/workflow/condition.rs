//! Condition Evaluator.
//!
//! Reads the `workflow-finish` condition a step controller writes on its
//! target object and classifies it against the generation the engine
//! stamped at apply time. A report that names a different generation
//! answers an earlier input and is stale, whatever its reason.

use conductor_types::condition::{Condition, find_condition};
use conductor_types::labels::{CONDITION_WORKFLOW_FINISH, REASON_FAILED, REASON_STOPPED, REASON_SUCCEEDED};
use conductor_types::object::Object;
use serde_json::Value;

/// Classification of a step target's terminal condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepProgress {
    /// No terminal condition yet, or it is not true.
    Pending,
    /// A terminal report for a different input generation than the one applied.
    Stale { observed: Option<i64>, applied: i64 },
    Succeeded,
    Failed(String),
    Stopped(String),
}

impl StepProgress {
    /// Whether the cursor may leave this step.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepProgress::Succeeded | StepProgress::Failed(_) | StepProgress::Stopped(_)
        )
    }
}

/// Classify `target`'s `workflow-finish` condition.
pub fn evaluate(target: &Object, applied_generation: i64) -> StepProgress {
    let conditions = conditions_of(target);
    let Some(condition) = find_condition(&conditions, CONDITION_WORKFLOW_FINISH) else {
        return StepProgress::Pending;
    };
    if !condition.status.is_true() {
        return StepProgress::Pending;
    }

    match condition.reason.as_str() {
        REASON_SUCCEEDED => {
            let observed = observed_generation(&condition.message);
            if observed.is_none() {
                tracing::warn!(
                    target_ref = %target.typed_reference(),
                    message = %condition.message,
                    "succeeded condition carries no observedGeneration; treating as pending"
                );
            }
            if observed == Some(applied_generation) {
                StepProgress::Succeeded
            } else {
                StepProgress::Stale {
                    observed,
                    applied: applied_generation,
                }
            }
        }
        REASON_FAILED | REASON_STOPPED => {
            let observed = observed_generation(&condition.message);
            if observed.is_some_and(|observed| observed != applied_generation) {
                return StepProgress::Stale {
                    observed,
                    applied: applied_generation,
                };
            }
            if condition.reason == REASON_FAILED {
                StepProgress::Failed(condition.message.clone())
            } else {
                StepProgress::Stopped(condition.message.clone())
            }
        }
        other => {
            tracing::warn!(
                target_ref = %target.typed_reference(),
                reason = other,
                "unrecognized workflow-finish reason; treating as pending"
            );
            StepProgress::Pending
        }
    }
}

/// Drop `target`'s `workflow-finish` condition. Returns whether one was present.
///
/// Used when a target is handed to a new workflow context, so that a report
/// written for the previous context cannot complete the new one.
pub fn clear_finish_condition(target: &mut Object) -> bool {
    let Some(Value::Array(items)) = target.get_path("status.conditions") else {
        return false;
    };
    let total = items.len();
    let kept: Vec<Value> = items
        .iter()
        .filter(|item| {
            item.get("type").and_then(Value::as_str) != Some(CONDITION_WORKFLOW_FINISH)
        })
        .cloned()
        .collect();
    if kept.len() == total {
        return false;
    }
    target.set_path("status.conditions", Value::Array(kept)).is_ok()
}

fn conditions_of(target: &Object) -> Vec<Condition> {
    target
        .get_path("status.conditions")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// `observedGeneration` from the JSON message payload, as a number or a
/// numeric string.
fn observed_generation(message: &str) -> Option<i64> {
    let payload: Value = serde_json::from_str(message).ok()?;
    match payload.get("observedGeneration")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
