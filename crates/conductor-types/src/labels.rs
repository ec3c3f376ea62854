//! Well-known label, annotation, and identity constants.
//!
//! Every assembled workload and trait carries the same label vocabulary so
//! that operators can select all resources of an application, a revision, or
//! a single component with one label query.

/// API version of the Application resource.
pub const APPLICATION_API_VERSION: &str = "core.oam.dev/v1beta1";

/// Kind of the Application resource.
pub const APPLICATION_KIND: &str = "Application";

// --- Labels stamped on every assembled resource ---

/// Name of the owning application.
pub const LABEL_APP_NAME: &str = "app.oam.dev/name";

/// Name of the application revision the resource was assembled from.
pub const LABEL_APP_REVISION: &str = "app.oam.dev/appRevision";

/// Content hash of the application revision.
pub const LABEL_APP_REVISION_HASH: &str = "app.oam.dev/app-revision-hash";

/// Name of the component the resource belongs to.
pub const LABEL_APP_COMPONENT: &str = "app.oam.dev/component";

/// Component revision identity (component name + content hash).
pub const LABEL_APP_COMPONENT_REVISION: &str = "app.oam.dev/revision";

/// Component (workload) type, e.g. `webservice`.
pub const LABEL_WORKLOAD_TYPE: &str = "workload.oam.dev/type";

/// Trait type, e.g. `ingress`.
pub const LABEL_TRAIT_TYPE: &str = "trait.oam.dev/type";

/// Resource role within the application: workload or trait.
pub const LABEL_RESOURCE_TYPE: &str = "app.oam.dev/resourceType";

/// Resource role value for workloads.
pub const RESOURCE_TYPE_WORKLOAD: &str = "WORKLOAD";

/// Resource role value for traits.
pub const RESOURCE_TYPE_TRAIT: &str = "TRAIT";

// --- Reserved annotations ---

/// The single context annotation slot on assembled resources.
pub const ANNOTATION_APP_CONTEXT: &str = "app.oam.dev/context";

/// Context annotation carried by workflow step target objects.
pub const ANNOTATION_WORKFLOW_CONTEXT: &str = "app.oam.dev/workflow-context";

/// Label carrying the step index on a workflow step target object.
pub const LABEL_STEP_INDEX: &str = "workflow.oam.dev/step-index";

// --- External release provenance ---

/// Annotation set by Helm naming the release that owns an object.
pub const ANNOTATION_HELM_RELEASE_NAME: &str = "meta.helm.sh/release-name";

/// Annotation set by Helm naming the namespace of the owning release.
pub const ANNOTATION_HELM_RELEASE_NAMESPACE: &str = "meta.helm.sh/release-namespace";

/// Standard label identifying the tool managing an object.
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// `managed-by` value written by Helm.
pub const MANAGED_BY_HELM: &str = "Helm";

// --- Workflow condition contract ---

/// Condition type reported by step target objects when they are done.
pub const CONDITION_WORKFLOW_FINISH: &str = "workflow-finish";

/// Terminal condition reason: the step completed.
pub const REASON_SUCCEEDED: &str = "Succeeded";

/// Terminal condition reason: the step failed.
pub const REASON_FAILED: &str = "Failed";

/// Terminal condition reason: the step asked the workflow to stop.
pub const REASON_STOPPED: &str = "Stopped";

/// Application condition type summarising workflow progress.
pub const CONDITION_WORKFLOW: &str = "Workflow";

/// Application condition type summarising resource assembly.
pub const CONDITION_ASSEMBLED: &str = "Assembled";

/// Maximum length of a platform object name (DNS label limit).
pub const MAX_NAME_LENGTH: usize = 63;
