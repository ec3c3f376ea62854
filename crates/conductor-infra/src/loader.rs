//! Manifest file loading.
//!
//! Applications, revision bundles, and revisions are read from YAML or
//! JSON files; the format is picked by extension (`.json` is JSON,
//! anything else is parsed as YAML, which also accepts JSON).

use std::path::{Path, PathBuf};

use conductor_types::application::Application;
use conductor_types::revision::{ApplicationRevision, RevisionBundle};
use serde::de::DeserializeOwned;

/// Errors raised while loading a manifest file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Parse `content` as JSON or YAML depending on `path`'s extension.
pub fn parse_manifest<T: DeserializeOwned>(path: &Path, content: &str) -> Result<T, LoadError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let parsed = if is_json {
        serde_json::from_str(content).map_err(|e| e.to_string())
    } else {
        serde_yaml_ng::from_str(content).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| LoadError::Parse {
        path: path.to_path_buf(),
        reason,
    })
}

async fn load<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let value = parse_manifest(path, &content)?;
    tracing::debug!(path = %path.display(), "loaded manifest");
    Ok(value)
}

pub async fn load_application(path: &Path) -> Result<Application, LoadError> {
    load(path).await
}

/// Load the rendered component manifests produced by the templating stage.
pub async fn load_bundle(path: &Path) -> Result<RevisionBundle, LoadError> {
    load(path).await
}

pub async fn load_revision(path: &Path) -> Result<ApplicationRevision, LoadError> {
    load(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const APP_YAML: &str = r#"
metadata:
  name: shop
  namespace: default
spec:
  components:
    - name: web
      type: webservice
      properties:
        image: nginx:1.27
  workflow:
    steps:
      - type: blue-green-rollout
      - type: rollout-promotion
        properties:
          manualApproval: true
"#;

    #[tokio::test]
    async fn loads_yaml_application() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.yaml");
        tokio::fs::write(&path, APP_YAML).await.unwrap();

        let app = load_application(&path).await.unwrap();
        assert_eq!(app.name(), "shop");
        assert_eq!(app.kind, "Application");
        assert!(app.has_workflow());
        assert_eq!(app.spec.workflow.unwrap().steps[1].step_type, "rollout-promotion");
    }

    #[tokio::test]
    async fn loads_json_bundle() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bundle.json");
        tokio::fs::write(
            &path,
            r#"{"components":[{"name":"web","revisionName":"web-v1","workloadType":"webservice",
                "workload":{"apiVersion":"apps/v1","kind":"Deployment"}}]}"#,
        )
        .await
        .unwrap();

        let bundle = load_bundle(&path).await.unwrap();
        assert_eq!(bundle.components.len(), 1);
        assert_eq!(bundle.components[0].workload.kind(), "Deployment");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_application(&tmp.path().join("absent.yaml")).await.unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn malformed_content_names_the_file() {
        let err = parse_manifest::<Application>(Path::new("broken.yaml"), "metadata: [").unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
        assert!(err.to_string().contains("broken.yaml"));
    }
}
