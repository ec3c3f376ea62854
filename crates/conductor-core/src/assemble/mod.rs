//! Resource Assembler: turns a revision's raw component manifests into the
//! canonical, owned, labeled set of platform resources.
//!
//! - `stamp` -- deterministic names, label sets, owner references, context annotation
//! - `kinds` -- closed per-kind tables (rollout pause paths, external release naming)
//! - `options` -- the pluggable Workload Option Chain
//! - `manifests` -- the assembler itself and its per-component results

pub mod kinds;
pub mod manifests;
pub mod options;
pub mod stamp;

pub use manifests::{AppManifests, AssembledComponent, Assembler, GroupedManifests, ScopeMap};
pub use options::{BoxWorkloadOption, WorkloadOption};

use conductor_types::error::StoreError;
use conductor_types::object::ObjectError;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while assembling a single component.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssembleError {
    /// The raw manifest cannot be assembled as written.
    #[error("malformed manifest for component '{component}': {reason}")]
    MalformedInput { component: String, reason: String },

    /// The raw template already uses the reserved context annotation with
    /// content that cannot be merged.
    #[error("component '{component}': annotation '{key}' conflicts with the application context")]
    ContextAnnotationConflict { component: String, key: String },

    /// The external release mechanism has not created the workload yet.
    #[error("workload '{name}' of release '{release}' does not exist yet")]
    ExternalNotReady { name: String, release: String },

    /// An object with the computed name exists but belongs to someone else.
    #[error(
        "workload '{name}' exists but is not managed by release '{release}' in namespace '{namespace}'"
    )]
    ForeignObject {
        name: String,
        release: String,
        namespace: String,
    },

    /// No behavior is known for this kind; never silently skipped.
    #[error("cannot {operation} '{name}': unknown type {kind}")]
    UnknownCapability {
        operation: &'static str,
        name: String,
        kind: String,
    },

    #[error("object field error: {0}")]
    Object(#[from] ObjectError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl AssembleError {
    /// Transient errors clear up on a later reconcile; everything else needs
    /// a new revision or operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            AssembleError::ExternalNotReady { .. } => true,
            AssembleError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}
