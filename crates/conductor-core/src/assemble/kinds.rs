//! Closed per-kind behavior tables.
//!
//! Kind-specific behavior is looked up here instead of being switched on ad
//! hoc at call sites. Every lookup has a default arm that returns
//! `AssembleError::UnknownCapability`; an unrecognized kind is never a no-op.

use conductor_types::labels::{
    ANNOTATION_HELM_RELEASE_NAME, ANNOTATION_HELM_RELEASE_NAMESPACE, LABEL_MANAGED_BY,
    MANAGED_BY_HELM, MAX_NAME_LENGTH,
};
use conductor_types::object::{GroupKind, Object};

use super::AssembleError;

const GROUP_APPS: &str = "apps";
const GROUP_KRUISE: &str = "apps.kruise.io";
const GROUP_FLUX_HELM: &str = "helm.toolkit.fluxcd.io";

/// Workload kinds whose updates can be paused ahead of a progressive rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutKind {
    Deployment,
    CloneSet,
    AdvancedStatefulSet,
}

impl RolloutKind {
    pub fn resolve(group_kind: &GroupKind, name: &str) -> Result<Self, AssembleError> {
        match (group_kind.group.as_str(), group_kind.kind.as_str()) {
            (GROUP_APPS, "Deployment") => Ok(RolloutKind::Deployment),
            (GROUP_KRUISE, "CloneSet") => Ok(RolloutKind::CloneSet),
            (GROUP_KRUISE, "StatefulSet") => Ok(RolloutKind::AdvancedStatefulSet),
            _ => Err(AssembleError::UnknownCapability {
                operation: "prepare",
                name: name.to_string(),
                kind: group_kind.to_string(),
            }),
        }
    }

    /// Field that stops the workload's own controller from rolling out changes.
    pub fn pause_path(&self) -> &'static str {
        match self {
            RolloutKind::Deployment => "spec.paused",
            RolloutKind::CloneSet => "spec.updateStrategy.paused",
            RolloutKind::AdvancedStatefulSet => "spec.updateStrategy.rollingUpdate.paused",
        }
    }
}

/// Release mechanisms whose workloads are discovered rather than trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalReleaseKind {
    HelmRelease,
}

impl ExternalReleaseKind {
    pub fn resolve(release: &Object) -> Result<Self, AssembleError> {
        let group_kind = release.group_kind();
        match (group_kind.group.as_str(), group_kind.kind.as_str()) {
            (GROUP_FLUX_HELM, "HelmRelease") => Ok(ExternalReleaseKind::HelmRelease),
            _ => Err(AssembleError::UnknownCapability {
                operation: "discover workload of",
                name: release.name().to_string(),
                kind: group_kind.to_string(),
            }),
        }
    }

    /// Path of the chart/package name inside the release object.
    pub fn chart_name_path(&self) -> &'static str {
        match self {
            ExternalReleaseKind::HelmRelease => "spec.chart.spec.chart",
        }
    }

    /// Name the release mechanism gives the workload it creates.
    ///
    /// The release name is used as-is when it already contains the chart
    /// name; otherwise `{release}-{chart}` truncated to the platform's name
    /// limit with any trailing `-` trimmed.
    pub fn qualified_name(&self, release_name: &str, chart_name: &str) -> String {
        match self {
            ExternalReleaseKind::HelmRelease => {
                if release_name.contains(chart_name) {
                    return release_name.to_string();
                }
                let full = format!("{release_name}-{chart_name}");
                if full.len() <= MAX_NAME_LENGTH {
                    return full;
                }
                let mut cut = MAX_NAME_LENGTH;
                while !full.is_char_boundary(cut) {
                    cut -= 1;
                }
                full[..cut].trim_end_matches('-').to_string()
            }
        }
    }

    /// Whether a live object carries this release's provenance markers.
    pub fn provenance_matches(&self, live: &Object, release_name: &str, namespace: &str) -> bool {
        match self {
            ExternalReleaseKind::HelmRelease => {
                let annotations = live.annotations();
                let labels = live.labels();
                annotations.get(ANNOTATION_HELM_RELEASE_NAME).map(String::as_str)
                    == Some(release_name)
                    && annotations
                        .get(ANNOTATION_HELM_RELEASE_NAMESPACE)
                        .map(String::as_str)
                        == Some(namespace)
                    && labels.get(LABEL_MANAGED_BY).map(String::as_str) == Some(MANAGED_BY_HELM)
            }
        }
    }
}
