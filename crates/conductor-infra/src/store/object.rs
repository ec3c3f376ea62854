//! In-memory object store.
//!
//! Mirrors the platform store semantics the controller relies on:
//! - every write gets a fresh, monotonically increasing resource version
//! - `update` is rejected with `Conflict` unless it carries the current version
//! - `metadata.generation` starts at 1 and moves only when content outside
//!   `metadata` and `status` changes, so a status write never bumps it

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{SecondsFormat, Utc};
use conductor_core::repository::{ObjectReader, ObjectStore};
use conductor_types::error::StoreError;
use conductor_types::object::{Object, ObjectKey};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use uuid::Uuid;

/// Shared, cloneable in-memory object store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    objects: Arc<DashMap<ObjectKey, Object>>,
    version: Arc<AtomicU64>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Every stored object, ordered by key.
    pub fn objects(&self) -> Vec<Object> {
        let mut all: Vec<(ObjectKey, Object)> = self
            .objects
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all.into_iter().map(|(_, object)| object).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectReader for InMemoryObjectStore {
    async fn get(&self, key: &ObjectKey) -> Result<Object, StoreError> {
        self.objects
            .get(key)
            .map(|r| r.value().clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Object>, StoreError> {
        let mut matched: Vec<Object> = self
            .objects
            .iter()
            .filter(|r| {
                let key = r.key();
                key.api_version == api_version && key.kind == kind && key.namespace == namespace
            })
            .filter(|r| {
                let labels = r.value().labels();
                selector.iter().all(|(k, v)| labels.get(k) == Some(v))
            })
            .map(|r| r.value().clone())
            .collect();
        matched.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(matched)
    }
}

impl ObjectStore for InMemoryObjectStore {
    async fn create(&self, object: &Object) -> Result<Object, StoreError> {
        let key = object.key();
        if key.name.is_empty() {
            return Err(StoreError::Backend(format!(
                "cannot create {} {} without a name",
                key.api_version, key.kind
            )));
        }

        let mut stored = object.clone();
        stored.set_generation(1);
        stored.set_resource_version(&self.next_version());
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        for (path, value) in [
            ("metadata.uid", Uuid::now_v7().to_string()),
            ("metadata.creationTimestamp", created_at),
        ] {
            stored
                .set_path(path, Value::String(value))
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        match self.objects.entry(key) {
            Entry::Occupied(entry) => Err(StoreError::AlreadyExists(entry.key().to_string())),
            Entry::Vacant(entry) => {
                entry.insert(stored.clone());
                tracing::trace!(object = %stored.key(), "created");
                Ok(stored)
            }
        }
    }

    async fn update(&self, object: &Object) -> Result<Object, StoreError> {
        let key = object.key();
        let mut live = self
            .objects
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        let expected = object.resource_version().unwrap_or_default();
        let actual = live.resource_version().unwrap_or_default();
        if expected != actual {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        let mut generation = live.generation().unwrap_or(1);
        if live.desired_content() != object.desired_content() {
            generation += 1;
        }
        let mut stored = object.clone();
        for field in ["uid", "creationTimestamp"] {
            if let Some(value) = live.get_path(&format!("metadata.{field}")).cloned() {
                stored
                    .set_path(&format!("metadata.{field}"), value)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
            }
        }
        stored.set_generation(generation);
        stored.set_resource_version(&self.next_version());
        *live = stored.clone();
        tracing::trace!(object = %key, generation, "updated");
        Ok(stored)
    }
}
