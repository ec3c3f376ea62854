//! Controller configuration loader.
//!
//! Reads `conductor.toml` and deserializes it into [`ControllerConfig`].
//! Falls back to defaults when the file is missing or malformed.

use std::path::Path;

use conductor_types::config::ControllerConfig;

/// File name looked up inside a configuration directory.
pub const CONFIG_FILE_NAME: &str = "conductor.toml";

/// Load controller configuration from `path`.
///
/// - If the file does not exist, returns [`ControllerConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_controller_config(path: &Path) -> ControllerConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return ControllerConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return ControllerConfig::default();
        }
    };

    match toml::from_str::<ControllerConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            ControllerConfig::default()
        }
    }
}

/// Load `{dir}/conductor.toml`.
pub async fn load_controller_config_from_dir(dir: &Path) -> ControllerConfig {
    load_controller_config(&dir.join(CONFIG_FILE_NAME)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_controller_config_from_dir(tmp.path()).await;
        assert_eq!(config, ControllerConfig::default());
    }

    #[tokio::test]
    async fn valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            r#"
workers = 2
conflict_backoff_ms = 100

[assemble]
discover_external_releases = false
prepare_for_rollout = true

[workflow.step_kinds.rollout-promotion]
api_version = "rollouts.example.io/v1"
kind = "Promotion"
"#,
        )
        .await
        .unwrap();

        let config = load_controller_config_from_dir(tmp.path()).await;
        assert_eq!(config.workers, 2);
        assert_eq!(config.conflict_backoff(), Duration::from_millis(100));
        assert_eq!(config.requeue_after(), Duration::from_secs(30));
        assert!(!config.assemble.discover_external_releases);
        assert!(config.assemble.prepare_for_rollout);
        assert_eq!(config.workflow.kind_for("rollout-promotion").kind, "Promotion");
    }

    #[tokio::test]
    async fn invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, "workers = [not valid").await.unwrap();

        let config = load_controller_config(&path).await;
        assert_eq!(config, ControllerConfig::default());
    }
}
