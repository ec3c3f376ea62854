//! In-memory revision repository. Revisions and artifacts are create-only.

use std::sync::Arc;

use conductor_core::repository::RevisionRepository;
use conductor_types::error::StoreError;
use conductor_types::revision::{ApplicationRevision, RevisionArtifact};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// `(namespace, name)`.
type RevisionKey = (String, String);

/// Shared, cloneable in-memory revision store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRevisionRepository {
    revisions: Arc<DashMap<RevisionKey, ApplicationRevision>>,
    artifacts: Arc<DashMap<RevisionKey, RevisionArtifact>>,
}

impl InMemoryRevisionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revisions of one application, oldest first.
    pub fn history(&self, namespace: &str, app_name: &str) -> Vec<ApplicationRevision> {
        let mut revisions: Vec<ApplicationRevision> = self
            .revisions
            .iter()
            .filter(|r| r.namespace == namespace && r.app_name == app_name)
            .map(|r| r.value().clone())
            .collect();
        revisions.sort_by_key(|r| r.revision);
        revisions
    }
}

impl RevisionRepository for InMemoryRevisionRepository {
    async fn latest(
        &self,
        namespace: &str,
        app_name: &str,
    ) -> Result<Option<ApplicationRevision>, StoreError> {
        Ok(self.history(namespace, app_name).pop())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ApplicationRevision>, StoreError> {
        Ok(self
            .revisions
            .get(&(namespace.to_string(), name.to_string()))
            .map(|r| r.value().clone()))
    }

    async fn create(&self, revision: &ApplicationRevision) -> Result<(), StoreError> {
        match self
            .revisions
            .entry((revision.namespace.clone(), revision.name.clone()))
        {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(format!(
                "{}/{}",
                revision.namespace, revision.name
            ))),
            Entry::Vacant(entry) => {
                entry.insert(revision.clone());
                Ok(())
            }
        }
    }

    async fn persist_artifact(&self, artifact: &RevisionArtifact) -> Result<(), StoreError> {
        let key = (artifact.namespace.clone(), artifact.revision_name.clone());
        match self.artifacts.entry(key) {
            Entry::Occupied(existing) if existing.get() == artifact => Ok(()),
            Entry::Occupied(_) => Err(StoreError::Conflict {
                key: format!("{}/{}", artifact.namespace, artifact.revision_name),
                expected: "identical artifact".to_string(),
                actual: "different artifact".to_string(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(artifact.clone());
                tracing::debug!(
                    revision = %artifact.revision_name,
                    resources = artifact.resources.len(),
                    "persisted artifact"
                );
                Ok(())
            }
        }
    }

    async fn get_artifact(
        &self,
        namespace: &str,
        revision_name: &str,
    ) -> Result<Option<RevisionArtifact>, StoreError> {
        Ok(self
            .artifacts
            .get(&(namespace.to_string(), revision_name.to_string()))
            .map(|r| r.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conductor_types::application::ApplicationSpec;
    use conductor_types::object::Object;
    use conductor_types::revision::RevisionBundle;

    fn revision(n: i64) -> ApplicationRevision {
        ApplicationRevision {
            name: format!("shop-v{n}"),
            namespace: "default".to_string(),
            app_name: "shop".to_string(),
            app_uid: None,
            revision: n,
            hash: format!("h{n}"),
            spec: ApplicationSpec::default(),
            bundle: RevisionBundle::default(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn latest_is_highest_number() {
        let repo = InMemoryRevisionRepository::new();
        for n in [1, 3, 2] {
            repo.create(&revision(n)).await.unwrap();
        }
        let latest = repo.latest("default", "shop").await.unwrap().unwrap();
        assert_eq!(latest.name, "shop-v3");
        assert!(repo.latest("default", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_revision_is_rejected() {
        let repo = InMemoryRevisionRepository::new();
        repo.create(&revision(1)).await.unwrap();
        let err = repo.create(&revision(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn artifacts_are_write_once() {
        let repo = InMemoryRevisionRepository::new();
        let artifact = RevisionArtifact {
            revision_name: "shop-v1".to_string(),
            namespace: "default".to_string(),
            resources: vec![Object::new("apps/v1", "Deployment")],
        };
        repo.persist_artifact(&artifact).await.unwrap();
        repo.persist_artifact(&artifact).await.unwrap();

        let different = RevisionArtifact {
            resources: Vec::new(),
            ..artifact.clone()
        };
        assert!(repo.persist_artifact(&different).await.unwrap_err().is_conflict());
        assert_eq!(
            repo.get_artifact("default", "shop-v1").await.unwrap(),
            Some(artifact)
        );
    }
}
