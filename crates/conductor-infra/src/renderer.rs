//! Component renderer backed by pre-rendered manifests.
//!
//! Template rendering belongs to an external collaborator; this adapter
//! serves the raw manifests it produced, keyed by component name, for the
//! components an application declares.

use std::collections::BTreeMap;

use conductor_core::revision::{ComponentRenderer, RevisionError};
use conductor_types::application::Application;
use conductor_types::revision::{ComponentManifest, RevisionBundle};

/// Serves a fixed set of rendered component manifests.
#[derive(Debug, Clone, Default)]
pub struct StaticComponentRenderer {
    manifests: BTreeMap<String, ComponentManifest>,
}

impl StaticComponentRenderer {
    pub fn new(manifests: impl IntoIterator<Item = ComponentManifest>) -> Self {
        Self {
            manifests: manifests.into_iter().map(|m| (m.name.clone(), m)).collect(),
        }
    }

    pub fn from_bundle(bundle: RevisionBundle) -> Self {
        Self::new(bundle.components)
    }
}

impl ComponentRenderer for StaticComponentRenderer {
    async fn render(&self, app: &Application) -> Result<RevisionBundle, RevisionError> {
        let components = app
            .spec
            .components
            .iter()
            .map(|component| {
                self.manifests.get(&component.name).cloned().ok_or_else(|| {
                    RevisionError::Render(format!(
                        "no rendered manifest for component '{}'",
                        component.name
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RevisionBundle { components })
    }
}
