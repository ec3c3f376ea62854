//! Application revisions and the raw component bundle they carry.
//!
//! A revision is an immutable snapshot of an application's rendered inputs.
//! Its bundle holds one `ComponentManifest` per component: the raw workload,
//! raw trait objects, and scope bindings, exactly as produced by the
//! templating stage and before any metadata stamping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::ApplicationSpec;
use crate::object::{Object, TypedReference};

/// Immutable snapshot of an application at one accepted spec change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRevision {
    /// `{app}-v{N}`.
    pub name: String,
    pub namespace: String,
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_uid: Option<String>,
    /// Monotonic revision number N.
    pub revision: i64,
    /// Content hash of `spec`.
    pub hash: String,
    pub spec: ApplicationSpec,
    pub bundle: RevisionBundle,
    pub created_at: DateTime<Utc>,
}

/// Ordered raw manifests, one entry per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevisionBundle {
    #[serde(default)]
    pub components: Vec<ComponentManifest>,
}

/// Rendered, pre-assembly manifest of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentManifest {
    pub name: String,
    /// Component revision identity, e.g. `test-comp-v1`. Assigned when the
    /// revision is recorded if the renderer leaves it empty.
    #[serde(default)]
    pub revision_name: String,
    #[serde(default)]
    pub revision_hash: String,
    /// Component type, e.g. `webservice`.
    pub workload_type: String,
    pub workload: Object,
    #[serde(default)]
    pub traits: Vec<TraitManifest>,
    #[serde(default)]
    pub scopes: Vec<TypedReference>,
    /// Set when an external release mechanism owns the workload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_release: Option<ExternalRelease>,
}

/// One raw trait object. A single trait type may render several objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitManifest {
    pub trait_type: String,
    pub object: Object,
    /// Dotted path of the workload reference field; `spec.workloadRef` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_ref_path: Option<String>,
}

impl TraitManifest {
    pub const DEFAULT_WORKLOAD_REF_PATH: &'static str = "spec.workloadRef";

    pub fn workload_ref_path(&self) -> &str {
        self.workload_ref_path
            .as_deref()
            .unwrap_or(Self::DEFAULT_WORKLOAD_REF_PATH)
    }
}

/// The release object of an externally managed workload (e.g. a HelmRelease).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRelease {
    pub release: Object,
}

/// The serialized assembled resources persisted once per revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionArtifact {
    pub revision_name: String,
    pub namespace: String,
    pub resources: Vec<Object>,
}
