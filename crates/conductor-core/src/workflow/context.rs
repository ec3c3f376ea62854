//! Workflow context handoff.
//!
//! The context is the only channel from the engine to a step controller: a
//! JSON payload under a single reserved annotation on the step's target
//! object, letting the controller correlate the object back to the
//! application, revision, and step that produced it.

use conductor_types::labels::ANNOTATION_WORKFLOW_CONTEXT;
use conductor_types::object::Object;
use serde::{Deserialize, Serialize};

/// `{applicationName, applicationRevisionName, workflowIndex}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowContext {
    pub application_name: String,
    pub application_revision_name: String,
    pub workflow_index: usize,
}

impl WorkflowContext {
    pub fn new(application_name: &str, application_revision_name: &str, workflow_index: usize) -> Self {
        Self {
            application_name: application_name.to_string(),
            application_revision_name: application_revision_name.to_string(),
            workflow_index,
        }
    }

    /// Write the context annotation onto `object`, replacing any previous one.
    pub fn attach(&self, object: &mut Object) -> Result<(), serde_json::Error> {
        let value = serde_json::to_string(self)?;
        let mut annotations = object.annotations();
        annotations.insert(ANNOTATION_WORKFLOW_CONTEXT.to_string(), value);
        object.set_annotations(annotations);
        Ok(())
    }

    /// Read the context back from an object, if present and well-formed.
    pub fn from_object(object: &Object) -> Option<Self> {
        object
            .annotations()
            .get(ANNOTATION_WORKFLOW_CONTEXT)
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}
