//! Revision repository trait definition.
//!
//! Revisions are append-only: created once, never updated. The assembled
//! resource artifact of a revision is likewise written at most once.

use std::future::Future;
use std::sync::Arc;

use conductor_types::error::StoreError;
use conductor_types::revision::{ApplicationRevision, RevisionArtifact};

/// Repository trait for application revisions and their artifacts.
pub trait RevisionRepository: Send + Sync {
    /// The highest-numbered revision of an application, if any.
    fn latest(
        &self,
        namespace: &str,
        app_name: &str,
    ) -> impl Future<Output = Result<Option<ApplicationRevision>, StoreError>> + Send;

    /// Get a revision by name.
    fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<ApplicationRevision>, StoreError>> + Send;

    /// Record a new revision. Fails with `AlreadyExists` if the name is taken.
    fn create(
        &self,
        revision: &ApplicationRevision,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persist the assembled artifact of a revision.
    ///
    /// Create-only: persisting identical content again is a no-op; persisting
    /// different content for the same revision fails with `Conflict`.
    fn persist_artifact(
        &self,
        artifact: &RevisionArtifact,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Get the persisted artifact of a revision.
    fn get_artifact(
        &self,
        namespace: &str,
        revision_name: &str,
    ) -> impl Future<Output = Result<Option<RevisionArtifact>, StoreError>> + Send;
}

impl<T: RevisionRepository> RevisionRepository for Arc<T> {
    fn latest(
        &self,
        namespace: &str,
        app_name: &str,
    ) -> impl Future<Output = Result<Option<ApplicationRevision>, StoreError>> + Send {
        (**self).latest(namespace, app_name)
    }

    fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<ApplicationRevision>, StoreError>> + Send {
        (**self).get(namespace, name)
    }

    fn create(
        &self,
        revision: &ApplicationRevision,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).create(revision)
    }

    fn persist_artifact(
        &self,
        artifact: &RevisionArtifact,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).persist_artifact(artifact)
    }

    fn get_artifact(
        &self,
        namespace: &str,
        revision_name: &str,
    ) -> impl Future<Output = Result<Option<RevisionArtifact>, StoreError>> + Send {
        (**self).get_artifact(namespace, revision_name)
    }
}
