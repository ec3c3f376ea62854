//! In-process mock ports shared by the unit tests of this crate.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use conductor_types::application::{AppKey, Application};
use conductor_types::error::StoreError;
use conductor_types::object::{Object, ObjectKey};
use conductor_types::revision::{
    ApplicationRevision, ComponentManifest, RevisionArtifact, RevisionBundle,
};
use serde_json::{Map, Value};

use crate::apply::{ResourceApplier, apply_object};
use crate::repository::{ApplicationRepository, ObjectReader, ObjectStore, RevisionRepository};
use crate::revision::{ComponentRenderer, RevisionError};

/// Object store with resource versions and generations, mirroring the
/// semantics the infra adapter provides.
#[derive(Default)]
pub struct MockObjectStore {
    objects: Mutex<BTreeMap<ObjectKey, Object>>,
    version: AtomicU64,
    reads: AtomicU64,
}

impl MockObjectStore {
    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Insert or overwrite an object as an external actor would.
    pub fn put(&self, mut object: Object) -> Object {
        let mut objects = self.objects.lock().unwrap();
        let generation = match objects.get(&object.key()) {
            Some(live) if live.desired_content() == object.desired_content() => {
                live.generation().unwrap_or(1)
            }
            Some(live) => live.generation().unwrap_or(0) + 1,
            None => 1,
        };
        object.set_generation(generation);
        object.set_resource_version(&self.next_version());
        objects.insert(object.key(), object.clone());
        object
    }

    pub fn snapshot(&self, key: &ObjectKey) -> Option<Object> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ObjectReader for MockObjectStore {
    async fn get(&self, key: &ObjectKey) -> Result<Object, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Object>, StoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.api_version() == api_version && o.kind() == kind)
            .filter(|o| o.namespace() == namespace)
            .filter(|o| {
                let labels = o.labels();
                selector.iter().all(|(k, v)| labels.get(k) == Some(v))
            })
            .cloned()
            .collect())
    }
}

impl ObjectStore for MockObjectStore {
    async fn create(&self, object: &Object) -> Result<Object, StoreError> {
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&object.key()) {
            return Err(StoreError::AlreadyExists(object.key().to_string()));
        }
        let mut stored = object.clone();
        stored.set_generation(1);
        stored.set_resource_version(&self.next_version());
        objects.insert(stored.key(), stored.clone());
        Ok(stored)
    }

    async fn update(&self, object: &Object) -> Result<Object, StoreError> {
        let mut objects = self.objects.lock().unwrap();
        let key = object.key();
        let live = objects
            .get(&key)
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
        stored.set_generation(generation);
        stored.set_resource_version(&self.next_version());
        objects.insert(key, stored.clone());
        Ok(stored)
    }
}

impl ResourceApplier for MockObjectStore {
    async fn apply(&self, resources: &[Object]) -> Result<Vec<Object>, StoreError> {
        let mut stored = Vec::with_capacity(resources.len());
        for resource in resources {
            stored.push(apply_object(self, resource).await?);
        }
        Ok(stored)
    }
}

/// Application repository with status-write preconditions.
#[derive(Default)]
pub struct MockApplicationRepository {
    apps: Mutex<BTreeMap<AppKey, Application>>,
    version: AtomicU64,
    status_writes: AtomicU64,
}

impl MockApplicationRepository {
    pub fn put(&self, mut app: Application) -> Application {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        app.metadata.resource_version = Some(version.to_string());
        app.metadata.generation += 1;
        self.apps.lock().unwrap().insert(app.key(), app.clone());
        app
    }

    pub fn snapshot(&self, key: &AppKey) -> Option<Application> {
        self.apps.lock().unwrap().get(key).cloned()
    }

    pub fn status_writes(&self) -> u64 {
        self.status_writes.load(Ordering::SeqCst)
    }
}

impl ApplicationRepository for MockApplicationRepository {
    async fn get(&self, key: &AppKey) -> Result<Application, StoreError> {
        self.apps
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list_keys(&self) -> Result<Vec<AppKey>, StoreError> {
        Ok(self.apps.lock().unwrap().keys().cloned().collect())
    }

    async fn update_status(&self, app: &Application) -> Result<Application, StoreError> {
        let mut apps = self.apps.lock().unwrap();
        let key = app.key();
        let live = apps
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if live.metadata.resource_version != app.metadata.resource_version {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected: app.metadata.resource_version.clone().unwrap_or_default(),
                actual: live.metadata.resource_version.clone().unwrap_or_default(),
            });
        }
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        live.status = app.status.clone();
        live.metadata.resource_version = Some(version.to_string());
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(live.clone())
    }
}

/// Append-only revision repository.
#[derive(Default)]
pub struct MockRevisionRepository {
    revisions: Mutex<Vec<ApplicationRevision>>,
    artifacts: Mutex<BTreeMap<(String, String), RevisionArtifact>>,
}

impl MockRevisionRepository {
    pub fn count(&self) -> usize {
        self.revisions.lock().unwrap().len()
    }
}

impl RevisionRepository for MockRevisionRepository {
    async fn latest(
        &self,
        namespace: &str,
        app_name: &str,
    ) -> Result<Option<ApplicationRevision>, StoreError> {
        Ok(self
            .revisions
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.namespace == namespace && r.app_name == app_name)
            .max_by_key(|r| r.revision)
            .cloned())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ApplicationRevision>, StoreError> {
        Ok(self
            .revisions
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.namespace == namespace && r.name == name)
            .cloned())
    }

    async fn create(&self, revision: &ApplicationRevision) -> Result<(), StoreError> {
        let mut revisions = self.revisions.lock().unwrap();
        if revisions
            .iter()
            .any(|r| r.namespace == revision.namespace && r.name == revision.name)
        {
            return Err(StoreError::AlreadyExists(revision.name.clone()));
        }
        revisions.push(revision.clone());
        Ok(())
    }

    async fn persist_artifact(&self, artifact: &RevisionArtifact) -> Result<(), StoreError> {
        let mut artifacts = self.artifacts.lock().unwrap();
        let key = (artifact.namespace.clone(), artifact.revision_name.clone());
        match artifacts.get(&key) {
            Some(existing) if existing == artifact => Ok(()),
            Some(_) => Err(StoreError::Conflict {
                key: artifact.revision_name.clone(),
                expected: "identical artifact".to_string(),
                actual: "different artifact".to_string(),
            }),
            None => {
                artifacts.insert(key, artifact.clone());
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
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), revision_name.to_string()))
            .cloned())
    }
}

/// Renders every declared component as a `Deployment` whose spec is the
/// component's properties.
pub struct EchoRenderer;

impl ComponentRenderer for EchoRenderer {
    async fn render(&self, app: &Application) -> Result<RevisionBundle, RevisionError> {
        let components = app
            .spec
            .components
            .iter()
            .map(|c| {
                let mut workload = Object::new("apps/v1", "Deployment");
                let spec = match &c.properties {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                workload
                    .as_map_mut()
                    .insert("spec".to_string(), Value::Object(spec));
                ComponentManifest {
                    name: c.name.clone(),
                    revision_name: String::new(),
                    revision_hash: String::new(),
                    workload_type: c.workload_type.clone(),
                    workload,
                    traits: Vec::new(),
                    scopes: Vec::new(),
                    external_release: None,
                }
            })
            .collect();
        Ok(RevisionBundle { components })
    }
}
