//! Application repository trait definition.

use std::future::Future;
use std::sync::Arc;

use conductor_types::application::{AppKey, Application};
use conductor_types::error::StoreError;

/// Repository trait for Application resources.
///
/// The controller only ever writes the status subresource; spec writes come
/// from users through the adapter's own API.
pub trait ApplicationRepository: Send + Sync {
    /// Get an application by key. Missing applications yield `NotFound`.
    fn get(&self, key: &AppKey) -> impl Future<Output = Result<Application, StoreError>> + Send;

    /// Keys of every stored application.
    fn list_keys(&self) -> impl Future<Output = Result<Vec<AppKey>, StoreError>> + Send;

    /// Write `app.status`, guarded by `app.metadata.resource_version`.
    ///
    /// Returns the stored application with its new resource version.
    fn update_status(
        &self,
        app: &Application,
    ) -> impl Future<Output = Result<Application, StoreError>> + Send;
}

impl<T: ApplicationRepository> ApplicationRepository for Arc<T> {
    fn get(&self, key: &AppKey) -> impl Future<Output = Result<Application, StoreError>> + Send {
        (**self).get(key)
    }

    fn list_keys(&self) -> impl Future<Output = Result<Vec<AppKey>, StoreError>> + Send {
        (**self).list_keys()
    }

    fn update_status(
        &self,
        app: &Application,
    ) -> impl Future<Output = Result<Application, StoreError>> + Send {
        (**self).update_status(app)
    }
}
