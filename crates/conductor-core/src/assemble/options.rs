//! Workload Option Chain.
//!
//! A `WorkloadOption` mutates an assembled workload after stamping and
//! before its traits are linked to it. Options run in configured order; the
//! first error aborts assembly of that component only.
//!
//! `WorkloadOption` uses RPITIT, so it cannot be a trait object directly.
//! Following the same blanket-impl pattern as the other ports:
//! 1. `WorkloadOptionDyn` is the object-safe version with boxed futures
//! 2. every `T: WorkloadOption` gets `WorkloadOptionDyn` for free
//! 3. `BoxWorkloadOption` wraps `Box<dyn WorkloadOptionDyn>` and delegates

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use conductor_types::config::AssembleConfig;
use conductor_types::error::StoreError;
use conductor_types::labels::LABEL_APP_COMPONENT_REVISION;
use conductor_types::object::{GroupKind, Object, ObjectKey};
use conductor_types::revision::ComponentManifest;
use serde_json::Value;

use super::AssembleError;
use super::kinds::{ExternalReleaseKind, RolloutKind};
use crate::repository::ObjectReader;

/// A pluggable mutation applied to a stamped workload.
pub trait WorkloadOption: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn apply(
        &self,
        workload: &mut Object,
        component: &ComponentManifest,
    ) -> impl Future<Output = Result<(), AssembleError>> + Send;
}

/// Object-safe version of [`WorkloadOption`] with boxed futures.
pub trait WorkloadOptionDyn: Send + Sync {
    fn name(&self) -> &str;

    fn apply_boxed<'a>(
        &'a self,
        workload: &'a mut Object,
        component: &'a ComponentManifest,
    ) -> Pin<Box<dyn Future<Output = Result<(), AssembleError>> + Send + 'a>>;
}

impl<T: WorkloadOption> WorkloadOptionDyn for T {
    fn name(&self) -> &str {
        WorkloadOption::name(self)
    }

    fn apply_boxed<'a>(
        &'a self,
        workload: &'a mut Object,
        component: &'a ComponentManifest,
    ) -> Pin<Box<dyn Future<Output = Result<(), AssembleError>> + Send + 'a>> {
        Box::pin(self.apply(workload, component))
    }
}

/// Type-erased workload option, so a chain can mix option types.
pub struct BoxWorkloadOption {
    inner: Box<dyn WorkloadOptionDyn>,
}

impl BoxWorkloadOption {
    pub fn new<T: WorkloadOption + 'static>(option: T) -> Self {
        Self {
            inner: Box::new(option),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn apply(
        &self,
        workload: &mut Object,
        component: &ComponentManifest,
    ) -> Result<(), AssembleError> {
        self.inner.apply_boxed(workload, component).await
    }
}

impl std::fmt::Debug for BoxWorkloadOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BoxWorkloadOption").field(&self.name()).finish()
    }
}

/// Build the option chain the configuration enables, in execution order:
/// naming override, external release discovery, rollout preparation.
pub fn option_chain<R>(config: &AssembleConfig, reader: R) -> Vec<BoxWorkloadOption>
where
    R: ObjectReader + 'static,
{
    let mut chain = Vec::new();
    if !config.non_in_place_kinds.is_empty() {
        chain.push(BoxWorkloadOption::new(NameNonInPlaceUpgradable::new(
            config.non_in_place_kinds.iter().cloned(),
        )));
    }
    if config.discover_external_releases {
        chain.push(BoxWorkloadOption::new(DiscoverExternalRelease::new(reader)));
    }
    if config.prepare_for_rollout {
        chain.push(BoxWorkloadOption::new(PrepareForRollout));
    }
    chain
}

// ---------------------------------------------------------------------------
// Naming override
// ---------------------------------------------------------------------------

/// Names workloads of kinds that cannot be updated in place after their
/// component revision, so every revision gets a fresh object.
#[derive(Debug, Clone, Default)]
pub struct NameNonInPlaceUpgradable {
    kinds: BTreeSet<GroupKind>,
}

impl NameNonInPlaceUpgradable {
    pub fn new(kinds: impl IntoIterator<Item = GroupKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }
}

impl WorkloadOption for NameNonInPlaceUpgradable {
    fn name(&self) -> &str {
        "name-non-in-place-upgradable"
    }

    async fn apply(
        &self,
        workload: &mut Object,
        component: &ComponentManifest,
    ) -> Result<(), AssembleError> {
        if !self.kinds.contains(&workload.group_kind()) {
            return Ok(());
        }
        let revision_name = workload
            .labels()
            .get(LABEL_APP_COMPONENT_REVISION)
            .cloned()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AssembleError::MalformedInput {
                component: component.name.clone(),
                reason: format!("workload has no '{LABEL_APP_COMPONENT_REVISION}' label"),
            })?;
        tracing::debug!(
            component = %component.name,
            name = %revision_name,
            "naming non-in-place-upgradable workload after its component revision"
        );
        workload.set_name(&revision_name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// External release discovery
// ---------------------------------------------------------------------------

/// Replaces the workload of an externally released component with the live
/// object the release mechanism created.
pub struct DiscoverExternalRelease<R: ObjectReader> {
    reader: R,
}

impl<R: ObjectReader> DiscoverExternalRelease<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: ObjectReader> WorkloadOption for DiscoverExternalRelease<R> {
    fn name(&self) -> &str {
        "discover-external-release"
    }

    async fn apply(
        &self,
        workload: &mut Object,
        component: &ComponentManifest,
    ) -> Result<(), AssembleError> {
        let Some(external) = &component.external_release else {
            return Ok(());
        };
        let release = &external.release;
        let kind = ExternalReleaseKind::resolve(release)?;

        let release_name = release.name().to_string();
        let chart_name = release
            .get_path(kind.chart_name_path())
            .and_then(Value::as_str)
            .filter(|chart| !chart.is_empty())
            .ok_or_else(|| AssembleError::MalformedInput {
                component: component.name.clone(),
                reason: format!("release has no chart name at '{}'", kind.chart_name_path()),
            })?;
        let namespace = workload.namespace().to_string();
        let qualified = kind.qualified_name(&release_name, chart_name);

        let key = ObjectKey::new(workload.api_version(), workload.kind(), &namespace, &qualified);
        let live = match self.reader.get(&key).await {
            Ok(live) => live,
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(
                    component = %component.name,
                    workload = %qualified,
                    "released workload not created yet"
                );
                return Err(AssembleError::ExternalNotReady {
                    name: qualified,
                    release: release_name,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if !kind.provenance_matches(&live, &release_name, &namespace) {
            tracing::error!(
                component = %component.name,
                workload = %qualified,
                release = %release_name,
                "found a name-matched workload not managed by the release"
            );
            return Err(AssembleError::ForeignObject {
                name: qualified,
                release: release_name,
                namespace,
            });
        }

        *workload = live;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rollout preparation
// ---------------------------------------------------------------------------

/// Pauses a workload and gives up controller ownership so a progressive
/// delivery controller can take it over.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrepareForRollout;

impl WorkloadOption for PrepareForRollout {
    fn name(&self) -> &str {
        "prepare-for-rollout"
    }

    async fn apply(
        &self,
        workload: &mut Object,
        _component: &ComponentManifest,
    ) -> Result<(), AssembleError> {
        let kind = match RolloutKind::resolve(&workload.group_kind(), workload.name()) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::info!(
                    kind = %workload.group_kind(),
                    name = workload.name(),
                    "unknown workload type, cannot prepare it for rollout"
                );
                return Err(e);
            }
        };

        workload.set_path(kind.pause_path(), Value::Bool(true))?;

        let mut owners = workload.owner_references();
        for owner in owners.iter_mut().filter(|o| o.is_controller()) {
            owner.controller = Some(false);
        }
        workload.set_owner_references(&owners);

        tracing::info!(
            kind = ?kind,
            name = workload.name(),
            "paused workload ahead of rollout"
        );
        Ok(())
    }
}
