//! Platform object store ports.
//!
//! `ObjectReader` is the read-only half handed to the assembler (discovery
//! performs a single read). `ObjectStore` adds writes guarded by an
//! optimistic-concurrency precondition on `metadata.resourceVersion`.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use conductor_types::error::StoreError;
use conductor_types::object::{Object, ObjectKey};

/// Read access to the platform object store.
pub trait ObjectReader: Send + Sync {
    /// Fetch an object by key. Missing objects yield `StoreError::NotFound`.
    fn get(&self, key: &ObjectKey) -> impl Future<Output = Result<Object, StoreError>> + Send;

    /// List objects of one kind in a namespace whose labels contain `selector`.
    fn list(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<Vec<Object>, StoreError>> + Send;
}

/// Read-write access to the platform object store.
pub trait ObjectStore: ObjectReader {
    /// Create a new object. Returns the stored copy with resource version and
    /// generation assigned. Fails with `AlreadyExists` if the key is taken.
    fn create(&self, object: &Object) -> impl Future<Output = Result<Object, StoreError>> + Send;

    /// Replace an existing object.
    ///
    /// The object's `resourceVersion` must equal the stored one, otherwise the
    /// call fails with `StoreError::Conflict` and nothing is written. The store
    /// bumps `generation` only when content outside `metadata`/`status` changes.
    fn update(&self, object: &Object) -> impl Future<Output = Result<Object, StoreError>> + Send;
}

impl<T: ObjectReader> ObjectReader for Arc<T> {
    fn get(&self, key: &ObjectKey) -> impl Future<Output = Result<Object, StoreError>> + Send {
        (**self).get(key)
    }

    fn list(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<Vec<Object>, StoreError>> + Send {
        (**self).list(api_version, kind, namespace, selector)
    }
}

impl<T: ObjectStore> ObjectStore for Arc<T> {
    fn create(&self, object: &Object) -> impl Future<Output = Result<Object, StoreError>> + Send {
        (**self).create(object)
    }

    fn update(&self, object: &Object) -> impl Future<Output = Result<Object, StoreError>> + Send {
        (**self).update(object)
    }
}
