//! Metadata Stamper.
//!
//! Pure functions that give every assembled workload and trait its namespace,
//! deterministic name, label set, controlling owner reference, and the
//! single reserved context annotation.

use std::collections::BTreeMap;

use conductor_types::labels::{
    ANNOTATION_APP_CONTEXT, APPLICATION_API_VERSION, APPLICATION_KIND, LABEL_APP_COMPONENT,
    LABEL_APP_COMPONENT_REVISION, LABEL_APP_NAME, LABEL_APP_REVISION, LABEL_APP_REVISION_HASH,
    LABEL_RESOURCE_TYPE, LABEL_TRAIT_TYPE, LABEL_WORKLOAD_TYPE, RESOURCE_TYPE_TRAIT,
    RESOURCE_TYPE_WORKLOAD,
};
use conductor_types::object::{Object, OwnerReference, add_labels};
use conductor_types::revision::{ApplicationRevision, ComponentManifest, TraitManifest};
use serde_json::{Map, Value};

use super::AssembleError;
use crate::hash::{canonical_json, name_hash};

/// Middle segment of a trait name when the trait has no type.
const TRAIT_NAME_FALLBACK: &str = "trait";

/// Application identity every stamped resource is derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct StampContext {
    pub app_name: String,
    pub namespace: String,
    pub revision_name: String,
    pub revision_hash: String,
    pub owner: OwnerReference,
}

impl StampContext {
    pub fn from_revision(revision: &ApplicationRevision) -> Self {
        Self {
            app_name: revision.app_name.clone(),
            namespace: revision.namespace.clone(),
            revision_name: revision.name.clone(),
            revision_hash: revision.hash.clone(),
            owner: OwnerReference {
                api_version: APPLICATION_API_VERSION.to_string(),
                kind: APPLICATION_KIND.to_string(),
                name: revision.app_name.clone(),
                uid: revision.app_uid.clone().unwrap_or_default(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            },
        }
    }

    fn common_labels(&self, component: &ComponentManifest) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_APP_NAME.to_string(), self.app_name.clone()),
            (LABEL_APP_REVISION.to_string(), self.revision_name.clone()),
            (LABEL_APP_REVISION_HASH.to_string(), self.revision_hash.clone()),
            (LABEL_APP_COMPONENT.to_string(), component.name.clone()),
            (
                LABEL_APP_COMPONENT_REVISION.to_string(),
                component.revision_name.clone(),
            ),
        ])
    }

    /// Context annotation payload for one component.
    fn context_payload(&self, component: &ComponentManifest) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("appName".to_string(), Value::String(self.app_name.clone()));
        payload.insert(
            "appRevision".to_string(),
            Value::String(self.revision_name.clone()),
        );
        payload.insert(
            "component".to_string(),
            Value::String(component.name.clone()),
        );
        payload.insert("namespace".to_string(), Value::String(self.namespace.clone()));
        payload
    }
}

/// The seven labels every workload carries.
pub fn workload_labels(ctx: &StampContext, component: &ComponentManifest) -> BTreeMap<String, String> {
    let mut labels = ctx.common_labels(component);
    labels.insert(LABEL_WORKLOAD_TYPE.to_string(), component.workload_type.clone());
    labels.insert(
        LABEL_RESOURCE_TYPE.to_string(),
        RESOURCE_TYPE_WORKLOAD.to_string(),
    );
    labels
}

/// The seven labels every trait carries.
pub fn trait_labels(
    ctx: &StampContext,
    component: &ComponentManifest,
    trait_type: &str,
) -> BTreeMap<String, String> {
    let mut labels = ctx.common_labels(component);
    labels.insert(LABEL_TRAIT_TYPE.to_string(), trait_type.to_string());
    labels.insert(LABEL_RESOURCE_TYPE.to_string(), RESOURCE_TYPE_TRAIT.to_string());
    labels
}

/// `{component}-{trait type}-{hash of the raw trait}`.
///
/// Two traits of the same type on one component get distinct names as long
/// as their content differs.
pub fn trait_name(component: &str, trait_type: &str, raw_trait: &Object) -> String {
    let middle = if trait_type.is_empty() {
        TRAIT_NAME_FALLBACK.to_string()
    } else {
        trait_type.to_lowercase()
    };
    let digest = name_hash(&Value::Object(raw_trait.as_map().clone()));
    format!("{component}-{middle}-{digest}")
}

/// Stamp a raw workload in place.
pub fn stamp_workload(
    ctx: &StampContext,
    component: &ComponentManifest,
    workload: &mut Object,
) -> Result<(), AssembleError> {
    workload.set_namespace(&ctx.namespace);
    workload.set_name(&component.name);
    add_labels(workload, &workload_labels(ctx, component));
    stamp_common(ctx, component, workload)
}

/// Stamp a raw trait, returning the assembled trait. Its workload reference
/// is set later, once the workload is final.
pub fn stamp_trait(
    ctx: &StampContext,
    component: &ComponentManifest,
    manifest: &TraitManifest,
) -> Result<Object, AssembleError> {
    let mut object = manifest.object.clone();
    if object.name().is_empty() {
        let name = trait_name(&component.name, &manifest.trait_type, &manifest.object);
        object.set_name(&name);
    }
    object.set_namespace(&ctx.namespace);
    add_labels(&mut object, &trait_labels(ctx, component, &manifest.trait_type));
    stamp_common(ctx, component, &mut object)?;
    Ok(object)
}

fn stamp_common(
    ctx: &StampContext,
    component: &ComponentManifest,
    object: &mut Object,
) -> Result<(), AssembleError> {
    object.set_owner_references(std::slice::from_ref(&ctx.owner));

    let mut annotations = object.annotations();
    let payload = ctx.context_payload(component);
    let merged = match annotations.get(ANNOTATION_APP_CONTEXT) {
        None => payload,
        Some(existing) => merge_context(existing, payload).ok_or_else(|| {
            AssembleError::ContextAnnotationConflict {
                component: component.name.clone(),
                key: ANNOTATION_APP_CONTEXT.to_string(),
            }
        })?,
    };
    annotations.insert(
        ANNOTATION_APP_CONTEXT.to_string(),
        canonical_json(&Value::Object(merged)),
    );
    object.set_annotations(annotations);
    Ok(())
}

/// Merge a template-provided context value with ours. Mergeable only when the
/// existing value is a JSON object agreeing with ours on every shared key.
fn merge_context(existing: &str, ours: Map<String, Value>) -> Option<Map<String, Value>> {
    let Ok(Value::Object(mut theirs)) = serde_json::from_str::<Value>(existing) else {
        return None;
    };
    for (key, value) in ours {
        match theirs.get(&key) {
            Some(current) if *current != value => return None,
            _ => {
                theirs.insert(key, value);
            }
        }
    }
    Some(theirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conductor_types::application::ApplicationSpec;
    use conductor_types::revision::RevisionBundle;
    use serde_json::json;

    fn revision() -> ApplicationRevision {
        ApplicationRevision {
            name: "test-assemble-v1".to_string(),
            namespace: "default".to_string(),
            app_name: "test-assemble".to_string(),
            app_uid: Some("uid-1".to_string()),
            revision: 1,
            hash: "abc123".to_string(),
            spec: ApplicationSpec::default(),
            bundle: RevisionBundle::default(),
            created_at: Utc::now(),
        }
    }

    fn component() -> ComponentManifest {
        ComponentManifest {
            name: "test-comp".to_string(),
            revision_name: "test-comp-v1".to_string(),
            revision_hash: "c0ffee".to_string(),
            workload_type: "webservice".to_string(),
            workload: Object::from_value(json!({
                "apiVersion": "apps/v1", "kind": "Deployment",
                "spec": { "replicas": 1 }
            }))
            .unwrap(),
            traits: Vec::new(),
            scopes: Vec::new(),
            external_release: None,
        }
    }

    fn scaler() -> TraitManifest {
        TraitManifest {
            trait_type: "ManualScaler".to_string(),
            object: Object::from_value(json!({
                "apiVersion": "core.oam.dev/v1alpha2", "kind": "ManualScalerTrait",
                "spec": { "replicaCount": 3 }
            }))
            .unwrap(),
            workload_ref_path: None,
        }
    }

    #[test]
    fn workload_gets_identity_labels_owner_and_one_annotation() {
        let ctx = StampContext::from_revision(&revision());
        let comp = component();
        let mut wl = comp.workload.clone();
        stamp_workload(&ctx, &comp, &mut wl).unwrap();

        assert_eq!(wl.name(), "test-comp");
        assert_eq!(wl.namespace(), "default");
        let labels = wl.labels();
        assert_eq!(labels.len(), 7);
        assert_eq!(labels[LABEL_APP_COMPONENT_REVISION], "test-comp-v1");
        assert_eq!(labels[LABEL_RESOURCE_TYPE], RESOURCE_TYPE_WORKLOAD);
        assert_eq!(wl.annotations().len(), 1);
        let owner = wl.controller_of().unwrap();
        assert_eq!(owner.kind, "Application");
        assert_eq!(owner.uid, "uid-1");
    }

    #[test]
    fn stamping_is_deterministic() {
        let ctx = StampContext::from_revision(&revision());
        let comp = component();
        let mut a = comp.workload.clone();
        let mut b = comp.workload.clone();
        stamp_workload(&ctx, &comp, &mut a).unwrap();
        stamp_workload(&ctx, &comp, &mut b).unwrap();
        assert_eq!(a, b);

        let t1 = stamp_trait(&ctx, &comp, &scaler()).unwrap();
        let t2 = stamp_trait(&ctx, &comp, &scaler()).unwrap();
        assert_eq!(t1, t2);
    }

    #[test]
    fn trait_name_is_lowercased_and_content_addressed() {
        let raw = scaler().object;
        let name = trait_name("test-comp", "ManualScaler", &raw);
        assert!(name.starts_with("test-comp-manualscaler-"));

        let mut other = raw.clone();
        other.set_path("spec.replicaCount", json!(5)).unwrap();
        assert_ne!(name, trait_name("test-comp", "ManualScaler", &other));
        assert!(trait_name("test-comp", "", &raw).starts_with("test-comp-trait-"));
    }

    #[test]
    fn template_trait_name_is_kept() {
        let ctx = StampContext::from_revision(&revision());
        let mut manifest = scaler();
        manifest.object.set_name("custom-scaler");
        let stamped = stamp_trait(&ctx, &component(), &manifest).unwrap();
        assert_eq!(stamped.name(), "custom-scaler");
        assert_eq!(stamped.labels()[LABEL_TRAIT_TYPE], "ManualScaler");
        assert_eq!(stamped.labels().len(), 7);
    }

    #[test]
    fn mergeable_context_annotation_is_merged() {
        let ctx = StampContext::from_revision(&revision());
        let comp = component();
        let mut wl = comp.workload.clone();
        wl.set_annotations(BTreeMap::from([(
            ANNOTATION_APP_CONTEXT.to_string(),
            r#"{"team":"payments","component":"test-comp"}"#.to_string(),
        )]));
        stamp_workload(&ctx, &comp, &mut wl).unwrap();

        let annotations = wl.annotations();
        assert_eq!(annotations.len(), 1);
        let value: Value = serde_json::from_str(&annotations[ANNOTATION_APP_CONTEXT]).unwrap();
        assert_eq!(value["team"], "payments");
        assert_eq!(value["appName"], "test-assemble");
    }

    #[test]
    fn conflicting_context_annotation_fails() {
        let ctx = StampContext::from_revision(&revision());
        let comp = component();
        for raw in [r#"{"component":"other"}"#, "not json"] {
            let mut wl = comp.workload.clone();
            wl.set_annotations(BTreeMap::from([(
                ANNOTATION_APP_CONTEXT.to_string(),
                raw.to_string(),
            )]));
            let err = stamp_workload(&ctx, &comp, &mut wl).unwrap_err();
            assert!(matches!(err, AssembleError::ContextAnnotationConflict { .. }));
            assert!(!err.is_retryable());
        }
    }
}
