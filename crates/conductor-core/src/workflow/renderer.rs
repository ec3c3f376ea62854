//! Step target rendering.
//!
//! Turning a step's `type` and `properties` into a concrete target object is
//! the job of the definition templating collaborator; the engine only sees
//! the `StepRenderer` port. `TypedStepRenderer` is the built-in renderer: it
//! maps step types to target kinds through configuration and uses the
//! step's properties as the target's spec.

use std::collections::BTreeMap;

use conductor_types::application::Application;
use conductor_types::config::WorkflowConfig;
use conductor_types::labels::{LABEL_APP_NAME, LABEL_STEP_INDEX, MAX_NAME_LENGTH};
use conductor_types::object::Object;
use conductor_types::revision::ApplicationRevision;
use conductor_types::workflow::WorkflowStep;
use serde_json::{Map, Value};

use super::dispatcher::DispatchError;
use crate::hash::name_hash;

/// Produces the target object for one workflow step.
pub trait StepRenderer: Send + Sync {
    fn render(
        &self,
        app: &Application,
        revision: &ApplicationRevision,
        index: usize,
        step: &WorkflowStep,
    ) -> Result<Object, DispatchError>;
}

/// Stable target name: `{app}-{index}-{type}`.
///
/// Names over the platform limit become `{app prefix}-{index}-{digest}`,
/// where the digest covers the full name. The index is never cut, so two
/// steps of one application never share a target.
pub fn step_object_name(app_name: &str, index: usize, step_type: &str) -> String {
    let full = format!("{app_name}-{index}-{step_type}").to_lowercase();
    if full.len() <= MAX_NAME_LENGTH {
        return full;
    }
    let suffix = format!("-{index}-{}", name_hash(&Value::String(full.clone())));
    let prefix = app_name.to_lowercase();
    let mut cut = MAX_NAME_LENGTH.saturating_sub(suffix.len()).min(prefix.len());
    while !prefix.is_char_boundary(cut) {
        cut -= 1;
    }
    let name = format!("{}{suffix}", prefix[..cut].trim_end_matches('-'));
    name.trim_start_matches('-').to_string()
}

/// Renders step targets from the configured step-type table.
#[derive(Debug, Clone, Default)]
pub struct TypedStepRenderer {
    config: WorkflowConfig,
}

impl TypedStepRenderer {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }
}

impl StepRenderer for TypedStepRenderer {
    fn render(
        &self,
        app: &Application,
        _revision: &ApplicationRevision,
        index: usize,
        step: &WorkflowStep,
    ) -> Result<Object, DispatchError> {
        let spec = match &step.properties {
            Value::Null => Value::Object(Map::new()),
            Value::Object(map) => Value::Object(map.clone()),
            _ => {
                return Err(DispatchError::Render {
                    index,
                    reason: "step properties must be an object".to_string(),
                });
            }
        };

        let kind = self.config.kind_for(&step.step_type);
        let mut object = Object::new(&kind.api_version, &kind.kind);
        object.set_name(&step_object_name(app.name(), index, &step.step_type));
        object.set_namespace(app.namespace());
        object.set_labels(BTreeMap::from([
            (LABEL_APP_NAME.to_string(), app.name().to_string()),
            (LABEL_STEP_INDEX.to_string(), index.to_string()),
        ]));
        object.set_owner_references(&[app.owner_reference()]);
        object.as_map_mut().insert("spec".to_string(), spec);
        Ok(object)
    }
}
