//! Revision tracking.
//!
//! Every accepted spec change produces a new immutable `ApplicationRevision`
//! named `{app}-v{N}`. The tracker compares the spec's content hash against
//! the latest revision and, on a change, asks the component renderer (the
//! templating collaborator) for the raw bundle and records it.

use std::future::Future;

use chrono::Utc;
use conductor_types::application::{Application, ApplicationSpec};
use conductor_types::error::StoreError;
use conductor_types::revision::{ApplicationRevision, RevisionBundle};

use crate::hash::content_hash;
use crate::repository::RevisionRepository;

/// Separator between the application name and the revision number.
const REVISION_DELIMITER: char = '-';

/// Renders an application's components into raw, pre-assembly manifests.
pub trait ComponentRenderer: Send + Sync {
    fn render(
        &self,
        app: &Application,
    ) -> impl Future<Output = Result<RevisionBundle, RevisionError>> + Send;
}

/// Content hash of an application spec.
pub fn spec_hash(spec: &ApplicationSpec) -> Result<String, RevisionError> {
    let value =
        serde_json::to_value(spec).map_err(|e| RevisionError::Serialization(e.to_string()))?;
    Ok(content_hash(&value))
}

/// `{app}-v{N}`.
pub fn revision_name(app_name: &str, revision: i64) -> String {
    format!("{app_name}{REVISION_DELIMITER}v{revision}")
}

/// Parse N out of `{app}-v{N}`. Names without a delimiter (`v1`, `appv2`) or
/// whose last segment is not `v<number>` (`myapp-a1`) are rejected.
pub fn extract_revision_number(name: &str) -> Result<i64, RevisionError> {
    let bad = || RevisionError::BadRevisionName(name.to_string());
    let (_, last) = name.rsplit_once(REVISION_DELIMITER).ok_or_else(bad)?;
    let digits = last.strip_prefix('v').ok_or_else(bad)?;
    digits.parse::<i64>().map_err(|_| bad())
}

/// Creates revisions when an application's spec changes.
pub struct RevisionTracker<V: RevisionRepository, C: ComponentRenderer> {
    revisions: V,
    renderer: C,
}

impl<V: RevisionRepository, C: ComponentRenderer> RevisionTracker<V, C> {
    pub fn new(revisions: V, renderer: C) -> Self {
        Self {
            revisions,
            renderer,
        }
    }

    pub fn revisions(&self) -> &V {
        &self.revisions
    }

    /// Return the revision matching the application's current spec, creating
    /// it if the spec changed. The flag is `true` when a revision was created.
    pub async fn ensure_current(
        &self,
        app: &Application,
    ) -> Result<(ApplicationRevision, bool), RevisionError> {
        let hash = spec_hash(&app.spec)?;
        let latest = self
            .revisions
            .latest(app.namespace(), app.name())
            .await?;

        if let Some(current) = latest.as_ref().filter(|r| r.hash == hash) {
            return Ok((current.clone(), false));
        }

        let number = latest.as_ref().map_or(1, |r| r.revision + 1);
        let mut bundle = self.renderer.render(app).await?;
        stamp_component_revisions(app, &mut bundle, latest.as_ref(), number)?;

        let revision = ApplicationRevision {
            name: revision_name(app.name(), number),
            namespace: app.namespace().to_string(),
            app_name: app.name().to_string(),
            app_uid: app.metadata.uid.clone(),
            revision: number,
            hash,
            spec: app.spec.clone(),
            bundle,
            created_at: Utc::now(),
        };
        self.revisions.create(&revision).await?;

        tracing::info!(
            app = %app.key(),
            revision = %revision.name,
            hash = %revision.hash,
            "created application revision"
        );
        Ok((revision, true))
    }
}

/// Give every component a revision identity. Unchanged components keep the
/// identity they had in the previous revision.
fn stamp_component_revisions(
    app: &Application,
    bundle: &mut RevisionBundle,
    previous: Option<&ApplicationRevision>,
    number: i64,
) -> Result<(), RevisionError> {
    for manifest in &mut bundle.components {
        let declared = app.spec.components.iter().find(|c| c.name == manifest.name);
        let value = match declared {
            Some(component) => serde_json::to_value(component),
            None => serde_json::to_value(&manifest.workload),
        }
        .map_err(|e| RevisionError::Serialization(e.to_string()))?;
        manifest.revision_hash = content_hash(&value);

        if !manifest.revision_name.is_empty() {
            continue;
        }
        let reused = previous
            .and_then(|p| p.bundle.components.iter().find(|c| c.name == manifest.name))
            .filter(|c| c.revision_hash == manifest.revision_hash)
            .map(|c| c.revision_name.clone());
        manifest.revision_name =
            reused.unwrap_or_else(|| revision_name(&manifest.name, number));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while tracking revisions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevisionError {
    #[error("bad revision name '{0}'")]
    BadRevisionName(String),

    #[error("cannot serialize spec: {0}")]
    Serialization(String),

    #[error("component rendering failed: {0}")]
    Render(String),

    #[error("revision store error: {0}")]
    Store(#[from] StoreError),
}

impl RevisionError {
    /// A concurrently created revision shows up on the next pass.
    pub fn is_retryable(&self) -> bool {
        match self {
            RevisionError::Store(StoreError::AlreadyExists(_)) => true,
            RevisionError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}
