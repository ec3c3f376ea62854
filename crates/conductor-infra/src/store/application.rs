//! In-memory application repository.
//!
//! Users write the spec through [`InMemoryApplicationRepository::upsert`];
//! the controller writes only the status, guarded by the resource version
//! it last read. A spec change bumps `metadata.generation`; a status write
//! never does.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use conductor_core::repository::ApplicationRepository;
use conductor_types::application::{AppKey, Application};
use conductor_types::error::StoreError;
use dashmap::DashMap;
use uuid::Uuid;

/// Shared, cloneable in-memory application store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryApplicationRepository {
    apps: Arc<DashMap<AppKey, Application>>,
    version: Arc<AtomicU64>,
}

impl InMemoryApplicationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Create or replace an application's spec, labels, and annotations.
    ///
    /// The stored status is preserved. Returns the stored application.
    pub fn upsert(&self, app: &Application) -> Application {
        let key = app.key();
        let mut entry = self.apps.entry(key.clone()).or_insert_with(|| {
            let mut fresh = app.clone();
            fresh.metadata.generation = 0;
            fresh.metadata.resource_version = None;
            fresh.status = Default::default();
            if fresh.metadata.uid.is_none() {
                fresh.metadata.uid = Some(Uuid::now_v7().to_string());
            }
            fresh
        });

        let stored = entry.value_mut();
        if stored.metadata.generation == 0 || stored.spec != app.spec {
            stored.metadata.generation += 1;
        }
        stored.spec = app.spec.clone();
        stored.metadata.labels = app.metadata.labels.clone();
        stored.metadata.annotations = app.metadata.annotations.clone();
        stored.metadata.resource_version = Some(self.next_version());

        tracing::debug!(app = %key, generation = stored.metadata.generation, "stored application");
        stored.clone()
    }

    /// Remove an application. Returns whether it existed.
    pub fn delete(&self, key: &AppKey) -> bool {
        self.apps.remove(key).is_some()
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    async fn get(&self, key: &AppKey) -> Result<Application, StoreError> {
        self.apps
            .get(key)
            .map(|r| r.value().clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list_keys(&self) -> Result<Vec<AppKey>, StoreError> {
        let mut keys: Vec<AppKey> = self.apps.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    async fn update_status(&self, app: &Application) -> Result<Application, StoreError> {
        let key = app.key();
        let mut live = self
            .apps
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if live.metadata.resource_version != app.metadata.resource_version {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected: app.metadata.resource_version.clone().unwrap_or_default(),
                actual: live.metadata.resource_version.clone().unwrap_or_default(),
            });
        }

        live.status = app.status.clone();
        live.metadata.resource_version = Some(self.next_version());
        Ok(live.clone())
    }
}
