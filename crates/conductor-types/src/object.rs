//! Unstructured platform objects and typed references.
//!
//! `Object` is a thin wrapper over a JSON map with accessors for the
//! metadata fields the controller reads and writes (name, namespace, labels,
//! annotations, owner references, resource version, generation).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while reading or writing object fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    #[error("manifest is not a JSON object")]
    NotAnObject,

    #[error("field path '{0}' is empty or malformed")]
    InvalidPath(String),

    #[error("cannot set '{path}': segment '{segment}' is not an object")]
    PathConflict { path: String, segment: String },
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// A reference to a platform object by API version, kind, and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl TypedReference {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            uid: None,
        }
    }

    /// The `{apiVersion, kind, name}` map written into a trait's workload reference.
    pub fn to_workload_ref(&self) -> Value {
        let mut map = Map::new();
        map.insert("apiVersion".to_string(), Value::String(self.api_version.clone()));
        map.insert("kind".to_string(), Value::String(self.kind.clone()));
        map.insert("name".to_string(), Value::String(self.name.clone()));
        Value::Object(map)
    }
}

impl fmt::Display for TypedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.api_version, self.kind, self.name)
    }
}

/// An owner reference as stored in `metadata.ownerReferences`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

impl OwnerReference {
    /// Whether this reference marks the managing controller.
    pub fn is_controller(&self) -> bool {
        self.controller.unwrap_or(false)
    }
}

/// API group plus kind, used to key per-kind behavior tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKind {
    #[serde(default)]
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// Address of a namespaced object in the platform store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {}/{}",
            self.api_version, self.kind, self.namespace, self.name
        )
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// An unstructured platform object (apiVersion, kind, metadata, spec, status).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Object(Map<String, Value>);

impl Object {
    /// Create an empty object of the given API version and kind.
    pub fn new(api_version: &str, kind: &str) -> Self {
        let mut map = Map::new();
        map.insert("apiVersion".to_string(), Value::String(api_version.to_string()));
        map.insert("kind".to_string(), Value::String(kind.to_string()));
        Self(map)
    }

    /// Wrap a JSON value, rejecting anything that is not an object.
    pub fn from_value(value: Value) -> Result<Self, ObjectError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(ObjectError::NotAnObject),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    // -- identity -----------------------------------------------------------

    pub fn api_version(&self) -> &str {
        self.0.get("apiVersion").and_then(Value::as_str).unwrap_or("")
    }

    pub fn kind(&self) -> &str {
        self.0.get("kind").and_then(Value::as_str).unwrap_or("")
    }

    /// API group parsed from `apiVersion` (empty for the core group).
    pub fn group(&self) -> &str {
        match self.api_version().split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(self.group(), self.kind())
    }

    pub fn name(&self) -> &str {
        self.metadata_str("name")
    }

    pub fn set_name(&mut self, name: &str) {
        self.metadata_mut()
            .insert("name".to_string(), Value::String(name.to_string()));
    }

    pub fn namespace(&self) -> &str {
        self.metadata_str("namespace")
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.metadata_mut()
            .insert("namespace".to_string(), Value::String(namespace.to_string()));
    }

    /// `{apiVersion, kind, name}` reference to this object.
    pub fn typed_reference(&self) -> TypedReference {
        TypedReference::new(self.api_version(), self.kind(), self.name())
    }

    /// Store address of this object.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.api_version(), self.kind(), self.namespace(), self.name())
    }

    // -- versioning ---------------------------------------------------------

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata()
            .and_then(|m| m.get("resourceVersion"))
            .and_then(Value::as_str)
    }

    pub fn set_resource_version(&mut self, version: &str) {
        self.metadata_mut().insert(
            "resourceVersion".to_string(),
            Value::String(version.to_string()),
        );
    }

    pub fn generation(&self) -> Option<i64> {
        self.metadata()
            .and_then(|m| m.get("generation"))
            .and_then(Value::as_i64)
    }

    pub fn set_generation(&mut self, generation: i64) {
        self.metadata_mut()
            .insert("generation".to_string(), Value::from(generation));
    }

    // -- labels & annotations -----------------------------------------------

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.string_map("labels")
    }

    pub fn set_labels(&mut self, labels: BTreeMap<String, String>) {
        self.set_string_map("labels", labels);
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.string_map("annotations")
    }

    pub fn set_annotations(&mut self, annotations: BTreeMap<String, String>) {
        self.set_string_map("annotations", annotations);
    }

    // -- owner references ---------------------------------------------------

    pub fn owner_references(&self) -> Vec<OwnerReference> {
        self.metadata()
            .and_then(|m| m.get("ownerReferences"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn set_owner_references(&mut self, refs: &[OwnerReference]) {
        let value = serde_json::to_value(refs).unwrap_or(Value::Array(Vec::new()));
        self.metadata_mut()
            .insert("ownerReferences".to_string(), value);
    }

    /// The owner reference flagged as controller, if any.
    pub fn controller_of(&self) -> Option<OwnerReference> {
        self.owner_references()
            .into_iter()
            .find(OwnerReference::is_controller)
    }

    // -- field paths --------------------------------------------------------

    /// Read a nested field by dotted path (e.g. `spec.updateStrategy.paused`).
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Write a nested field by dotted path, creating intermediate maps.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), ObjectError> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ObjectError::InvalidPath(path.to_string()));
        }
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| ObjectError::InvalidPath(path.to_string()))?;

        let mut current = &mut self.0;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = entry.as_object_mut().ok_or_else(|| ObjectError::PathConflict {
                path: path.to_string(),
                segment: segment.to_string(),
            })?;
        }
        current.insert(last.to_string(), value);
        Ok(())
    }

    /// Copy of the object without `metadata` and `status`.
    ///
    /// Two objects with equal desired content compare equal here regardless
    /// of bookkeeping fields, which is what generation tracking keys on.
    pub fn desired_content(&self) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(k, _)| k.as_str() != "metadata" && k.as_str() != "status")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // -- internals ----------------------------------------------------------

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.0.get("metadata").and_then(Value::as_object)
    }

    fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        let entry = self
            .0
            .entry("metadata".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => map,
            _ => unreachable!("metadata normalized above"),
        }
    }

    fn metadata_str(&self, field: &str) -> &str {
        self.metadata()
            .and_then(|m| m.get(field))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    fn string_map(&self, field: &str) -> BTreeMap<String, String> {
        self.metadata()
            .and_then(|m| m.get(field))
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_string_map(&mut self, field: &str, values: BTreeMap<String, String>) {
        let map: Map<String, Value> = values
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        self.metadata_mut()
            .insert(field.to_string(), Value::Object(map));
    }
}

/// Merge two string maps; on key conflicts the value from `dst` wins.
pub fn merge_map_override_with_dst(
    src: &BTreeMap<String, String>,
    dst: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = src.clone();
    for (k, v) in dst {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Merge `labels` into the object's labels, new values overriding existing ones.
pub fn add_labels(obj: &mut Object, labels: &BTreeMap<String, String>) {
    let merged = merge_map_override_with_dst(&obj.labels(), labels);
    obj.set_labels(merged);
}

/// Copy every label of `parent` onto `child`, keeping the parent's values.
pub fn pass_labels(parent: &Object, child: &mut Object) {
    add_labels(child, &parent.labels());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
