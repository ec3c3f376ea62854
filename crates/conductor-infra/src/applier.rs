//! Direct-apply adapter: create-or-update assembled resources against an
//! object store, one at a time and in assembly order.

use conductor_core::apply::{ResourceApplier, apply_object};
use conductor_core::repository::ObjectStore;
use conductor_types::error::StoreError;
use conductor_types::object::Object;

/// [`ResourceApplier`] backed by any [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct ObjectStoreApplier<S: ObjectStore> {
    store: S,
}

impl<S: ObjectStore> ObjectStoreApplier<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: ObjectStore> ResourceApplier for ObjectStoreApplier<S> {
    async fn apply(&self, resources: &[Object]) -> Result<Vec<Object>, StoreError> {
        let mut applied = Vec::with_capacity(resources.len());
        for resource in resources {
            let stored = apply_object(&self.store, resource).await.inspect_err(|e| {
                tracing::warn!(object = %resource.key(), error = %e, "apply failed");
            })?;
            applied.push(stored);
        }
        Ok(applied)
    }
}
