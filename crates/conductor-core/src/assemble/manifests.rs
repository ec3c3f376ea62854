//! The Resource Assembler.
//!
//! `Assembler::assemble` runs the Metadata Stamper and the Workload Option
//! Chain over every component of a revision and returns `AppManifests`: one
//! `Result` per component plus the scope reference map. A failing component
//! never prevents the others from assembling.

use std::collections::BTreeMap;

use conductor_types::object::{Object, TypedReference};
use conductor_types::revision::{ApplicationRevision, ComponentManifest, RevisionArtifact};
use tracing::{debug, warn};

use super::AssembleError;
use super::options::BoxWorkloadOption;
use super::stamp::{StampContext, stamp_trait, stamp_workload};

/// Workload reference to the ordered, de-duplicated scopes it participates in.
pub type ScopeMap = BTreeMap<TypedReference, Vec<TypedReference>>;

/// Fully assembled resources of one component.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledComponent {
    pub workload: Object,
    pub traits: Vec<Object>,
    pub scopes: Vec<TypedReference>,
}

/// Successful components grouped by resource role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedManifests {
    pub workloads: BTreeMap<String, Object>,
    pub traits: BTreeMap<String, Vec<Object>>,
    pub scopes: ScopeMap,
}

/// Stateless assembler configured with an option chain.
#[derive(Debug, Default)]
pub struct Assembler {
    options: Vec<BoxWorkloadOption>,
}

impl Assembler {
    pub fn new(options: Vec<BoxWorkloadOption>) -> Self {
        Self { options }
    }

    /// Assemble every component of `revision`.
    pub async fn assemble(&self, revision: &ApplicationRevision) -> AppManifests {
        let ctx = StampContext::from_revision(revision);
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for component in &revision.bundle.components {
            *counts.entry(component.name.as_str()).or_default() += 1;
        }

        let mut manifests = AppManifests {
            revision_name: revision.name.clone(),
            namespace: revision.namespace.clone(),
            order: Vec::new(),
            components: BTreeMap::new(),
            scopes: ScopeMap::new(),
        };

        for component in &revision.bundle.components {
            if manifests.components.contains_key(&component.name) {
                continue;
            }
            let result = if counts[component.name.as_str()] > 1 {
                Err(AssembleError::MalformedInput {
                    component: component.name.clone(),
                    reason: "component name is declared more than once".to_string(),
                })
            } else {
                self.assemble_component(&ctx, component).await
            };

            match &result {
                Ok(assembled) => {
                    debug!(
                        app = %ctx.app_name,
                        component = %component.name,
                        workload = %assembled.workload.typed_reference(),
                        traits = assembled.traits.len(),
                        "assembled component"
                    );
                    if !assembled.scopes.is_empty() {
                        let entry = manifests
                            .scopes
                            .entry(assembled.workload.typed_reference())
                            .or_default();
                        for scope in &assembled.scopes {
                            if !entry.contains(scope) {
                                entry.push(scope.clone());
                            }
                        }
                    }
                }
                Err(e) => warn!(
                    app = %ctx.app_name,
                    component = %component.name,
                    retryable = e.is_retryable(),
                    error = %e,
                    "component failed to assemble"
                ),
            }
            manifests.order.push(component.name.clone());
            manifests.components.insert(component.name.clone(), result);
        }
        manifests
    }

    async fn assemble_component(
        &self,
        ctx: &StampContext,
        component: &ComponentManifest,
    ) -> Result<AssembledComponent, AssembleError> {
        let mut workload = component.workload.clone();
        stamp_workload(ctx, component, &mut workload)?;

        for option in &self.options {
            option.apply(&mut workload, component).await?;
        }

        let workload_ref = workload.typed_reference().to_workload_ref();
        let mut traits = Vec::with_capacity(component.traits.len());
        for manifest in &component.traits {
            let mut assembled = stamp_trait(ctx, component, manifest)?;
            assembled.set_path(manifest.workload_ref_path(), workload_ref.clone())?;
            traits.push(assembled);
        }

        Ok(AssembledComponent {
            workload,
            traits,
            scopes: component.scopes.clone(),
        })
    }
}

/// Result of assembling one revision.
#[derive(Debug, Clone)]
pub struct AppManifests {
    revision_name: String,
    namespace: String,
    order: Vec<String>,
    components: BTreeMap<String, Result<AssembledComponent, AssembleError>>,
    scopes: ScopeMap,
}

impl AppManifests {
    pub fn revision_name(&self) -> &str {
        &self.revision_name
    }

    /// Per-component results keyed by component name.
    pub fn components(&self) -> &BTreeMap<String, Result<AssembledComponent, AssembleError>> {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&Result<AssembledComponent, AssembleError>> {
        self.components.get(name)
    }

    /// Components that failed, in bundle order.
    pub fn failures(&self) -> Vec<(&str, &AssembleError)> {
        self.ordered()
            .filter_map(|(name, result)| result.as_ref().err().map(|e| (name, e)))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.components.values().all(Result::is_ok)
    }

    /// Successful components grouped into workloads, traits, and scopes.
    pub fn grouped(&self) -> GroupedManifests {
        let mut grouped = GroupedManifests {
            scopes: self.scopes.clone(),
            ..GroupedManifests::default()
        };
        for (name, result) in self.ordered() {
            if let Ok(assembled) = result {
                grouped
                    .workloads
                    .insert(name.to_string(), assembled.workload.clone());
                grouped
                    .traits
                    .insert(name.to_string(), assembled.traits.clone());
            }
        }
        grouped
    }

    /// Every successfully assembled resource: each workload followed by its
    /// traits, in bundle order.
    pub fn assembled_manifests(&self) -> Vec<Object> {
        let mut resources = Vec::new();
        for (_, result) in self.ordered() {
            if let Ok(assembled) = result {
                resources.push(assembled.workload.clone());
                resources.extend(assembled.traits.iter().cloned());
            }
        }
        resources
    }

    /// Scope reference map; only workloads with at least one scope appear.
    pub fn referenced_scopes(&self) -> &ScopeMap {
        &self.scopes
    }

    /// Serialized resource bundle to persist as the revision artifact.
    pub fn artifact(&self) -> RevisionArtifact {
        RevisionArtifact {
            revision_name: self.revision_name.clone(),
            namespace: self.namespace.clone(),
            resources: self.assembled_manifests(),
        }
    }

    fn ordered(&self) -> impl Iterator<Item = (&str, &Result<AssembledComponent, AssembleError>)> {
        self.order.iter().filter_map(|name| {
            self.components
                .get(name)
                .map(|result| (name.as_str(), result))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::assemble::options::{NameNonInPlaceUpgradable, PrepareForRollout};
    use crate::testing::MockObjectStore;
    use chrono::Utc;
    use conductor_types::application::ApplicationSpec;
    use conductor_types::labels::LABEL_APP_COMPONENT_REVISION;
    use conductor_types::object::GroupKind;
    use conductor_types::revision::{ExternalRelease, RevisionBundle, TraitManifest};
    use serde_json::{Value, json};

    fn obj(value: Value) -> Object {
        Object::from_value(value).unwrap()
    }

    fn component(name: &str, api_version: &str, kind: &str) -> ComponentManifest {
        ComponentManifest {
            name: name.to_string(),
            revision_name: format!("{name}-v2"),
            revision_hash: String::new(),
            workload_type: "worker".to_string(),
            workload: obj(json!({ "apiVersion": api_version, "kind": kind, "spec": {} })),
            traits: vec![TraitManifest {
                trait_type: "scaler".to_string(),
                object: obj(json!({
                    "apiVersion": "core.oam.dev/v1alpha2", "kind": "ManualScalerTrait",
                    "spec": { "replicaCount": 2 }
                })),
                workload_ref_path: None,
            }],
            scopes: Vec::new(),
            external_release: None,
        }
    }

    fn revision(components: Vec<ComponentManifest>) -> ApplicationRevision {
        ApplicationRevision {
            name: "app-v2".to_string(),
            namespace: "prod".to_string(),
            app_name: "app".to_string(),
            app_uid: None,
            revision: 2,
            hash: "h".to_string(),
            spec: ApplicationSpec::default(),
            bundle: RevisionBundle { components },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn partial_failure_keeps_other_components() {
        let assembler = Assembler::new(vec![BoxWorkloadOption::new(PrepareForRollout)]);
        let rev = revision(vec![
            component("api", "apps/v1", "Deployment"),
            component("db", "example.io/v1", "Database"),
        ]);

        let manifests = assembler.assemble(&rev).await;
        assert!(!manifests.is_complete());
        assert!(manifests.component("api").unwrap().is_ok());
        let failures = manifests.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "db");
        assert!(matches!(failures[0].1, AssembleError::UnknownCapability { .. }));

        let grouped = manifests.grouped();
        assert_eq!(grouped.workloads.len(), 1);
        assert_eq!(manifests.assembled_manifests().len(), 2);
    }

    #[tokio::test]
    async fn workload_name_follows_in_place_capability() {
        let assembler = Assembler::new(vec![BoxWorkloadOption::new(
            NameNonInPlaceUpgradable::new([GroupKind::new("apps.kruise.io", "CloneSet")]),
        )]);
        let rev = revision(vec![
            component("api", "apps/v1", "Deployment"),
            component("cache", "apps.kruise.io/v1alpha1", "CloneSet"),
        ]);
        let grouped = assembler.assemble(&rev).await.grouped();

        assert_eq!(grouped.workloads["api"].name(), "api");
        let cache = &grouped.workloads["cache"];
        assert_eq!(cache.name(), "cache-v2");
        assert_eq!(cache.labels()[LABEL_APP_COMPONENT_REVISION], cache.name());

        // Traits follow the renamed workload.
        let scaler = &grouped.traits["cache"][0];
        assert_eq!(
            scaler.get_path("spec.workloadRef"),
            Some(&json!({
                "apiVersion": "apps.kruise.io/v1alpha1", "kind": "CloneSet", "name": "cache-v2"
            }))
        );
    }

    #[tokio::test]
    async fn custom_workload_ref_path() {
        let mut comp = component("api", "apps/v1", "Deployment");
        comp.traits[0].workload_ref_path = Some("spec.targetRef".to_string());
        let grouped = Assembler::default().assemble(&revision(vec![comp])).await.grouped();
        let scaler = &grouped.traits["api"][0];
        assert!(scaler.get_path("spec.workloadRef").is_none());
        assert_eq!(scaler.get_path("spec.targetRef.name"), Some(&json!("api")));
    }

    #[tokio::test]
    async fn scopes_are_keyed_by_final_workload_and_never_empty() {
        let mut with_scope = component("api", "apps/v1", "Deployment");
        let health = TypedReference::new("core.oam.dev/v1beta1", "HealthScope", "health");
        with_scope.scopes = vec![health.clone(), health.clone()];
        let without_scope = component("worker", "apps/v1", "Deployment");

        let manifests = Assembler::default()
            .assemble(&revision(vec![with_scope, without_scope]))
            .await;
        let scopes = manifests.referenced_scopes();
        assert_eq!(scopes.len(), 1);
        let key = TypedReference::new("apps/v1", "Deployment", "api");
        assert_eq!(scopes[&key], vec![health]);
        assert!(scopes.values().all(|v| !v.is_empty()));
    }

    #[tokio::test]
    async fn duplicate_component_names_are_malformed() {
        let rev = revision(vec![
            component("api", "apps/v1", "Deployment"),
            component("api", "apps/v1", "Deployment"),
        ]);
        let manifests = Assembler::default().assemble(&rev).await;
        assert_eq!(manifests.components().len(), 1);
        assert!(matches!(
            manifests.component("api"),
            Some(Err(AssembleError::MalformedInput { .. }))
        ));
    }

    #[tokio::test]
    async fn assembly_is_deterministic() {
        let rev = revision(vec![component("api", "apps/v1", "Deployment")]);
        let a = Assembler::default().assemble(&rev).await.assembled_manifests();
        let b = Assembler::default().assemble(&rev).await.assembled_manifests();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn discovery_failure_is_retryable_and_isolated() {
        let store = Arc::new(MockObjectStore::default());
        let assembler = Assembler::new(vec![BoxWorkloadOption::new(
            crate::assemble::options::DiscoverExternalRelease::new(store),
        )]);
        let mut helm = component("chart", "apps/v1", "Deployment");
        helm.external_release = Some(ExternalRelease {
            release: obj(json!({
                "apiVersion": "helm.toolkit.fluxcd.io/v2beta1", "kind": "HelmRelease",
                "metadata": { "name": "chart" },
                "spec": { "chart": { "spec": { "chart": "redis" } } }
            })),
        });
        let rev = revision(vec![helm, component("api", "apps/v1", "Deployment")]);

        let manifests = assembler.assemble(&rev).await;
        let failures = manifests.failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].1.is_retryable());
        assert!(manifests.component("api").unwrap().is_ok());
        assert_eq!(manifests.artifact().resources.len(), 2);
    }
}
