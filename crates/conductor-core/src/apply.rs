//! Create-or-update of desired objects against the live store.
//!
//! Applying merges the desired object into the live one: desired fields win,
//! fields only present on the live object survive (a human-toggled approval
//! flag, a status written by another controller). The write carries the live
//! resource version as its precondition, so a concurrent writer turns into a
//! `Conflict` instead of a lost update.

use std::future::Future;
use std::sync::Arc;

use conductor_types::error::StoreError;
use conductor_types::object::Object;
use serde_json::{Map, Value};

use crate::repository::ObjectStore;

/// Metadata fields owned by the store; never copied from a desired object.
const STORE_OWNED_METADATA: &[&str] = &["resourceVersion", "generation", "uid", "creationTimestamp"];

/// Applies assembled resources directly (the path taken when an application
/// declares no workflow).
pub trait ResourceApplier: Send + Sync {
    /// Create or update every resource in order; returns the stored copies.
    fn apply(
        &self,
        resources: &[Object],
    ) -> impl Future<Output = Result<Vec<Object>, StoreError>> + Send;
}

impl<T: ResourceApplier> ResourceApplier for Arc<T> {
    fn apply(
        &self,
        resources: &[Object],
    ) -> impl Future<Output = Result<Vec<Object>, StoreError>> + Send {
        (**self).apply(resources)
    }
}

/// Merge `desired` into `live`, leaving live-only fields and `status` intact.
pub fn merge_into_live(live: &Object, desired: &Object) -> Object {
    let mut merged = live.as_map().clone();
    for (key, value) in desired.as_map() {
        match key.as_str() {
            "status" => {}
            "metadata" => {
                let Value::Object(desired_meta) = value else {
                    continue;
                };
                let meta = merged
                    .entry("metadata")
                    .or_insert_with(|| Value::Object(Map::new()));
                if !meta.is_object() {
                    *meta = Value::Object(Map::new());
                }
                if let Value::Object(meta) = meta {
                    for (field, field_value) in desired_meta {
                        if STORE_OWNED_METADATA.contains(&field.as_str()) {
                            continue;
                        }
                        merge_value(meta.entry(field.clone()).or_insert(Value::Null), field_value);
                    }
                }
            }
            _ => merge_value(merged.entry(key.clone()).or_insert(Value::Null), value),
        }
    }
    Object::from_map(merged)
}

fn merge_value(dst: &mut Value, src: &Value) {
    if let (Value::Object(dst_map), Value::Object(src_map)) = (&mut *dst, src) {
        for (key, value) in src_map {
            merge_value(dst_map.entry(key.clone()).or_insert(Value::Null), value);
        }
        return;
    }
    *dst = src.clone();
}

/// Create `desired` if absent, otherwise merge it into the live object and
/// update under the live resource version. Unchanged objects are not written.
pub async fn apply_object<S: ObjectStore>(store: &S, desired: &Object) -> Result<Object, StoreError> {
    apply_object_with(store, desired, |_, _| {}).await
}

/// [`apply_object`], with `adjust` run on the merged object (next to the live
/// one it came from) before the unchanged check. Creates skip `adjust`.
pub async fn apply_object_with<S, F>(
    store: &S,
    desired: &Object,
    adjust: F,
) -> Result<Object, StoreError>
where
    S: ObjectStore,
    F: FnOnce(&Object, &mut Object) + Send,
{
    let key = desired.key();
    let live = match store.get(&key).await {
        Ok(live) => live,
        Err(StoreError::NotFound(_)) => {
            tracing::debug!(object = %key, "creating object");
            return store.create(desired).await;
        }
        Err(e) => return Err(e),
    };

    let mut merged = merge_into_live(&live, desired);
    adjust(&live, &mut merged);
    if merged == live {
        tracing::debug!(object = %key, "object unchanged, skipping update");
        return Ok(live);
    }

    tracing::debug!(object = %key, "updating object");
    store.update(&merged).await
}
