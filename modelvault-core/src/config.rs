//! Configuration system for modelvault.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides.
//! Configuration is loaded from `~/.config/modelvault/config.toml` and/or
//! `.modelvault/config.toml` in the project root.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Directory (relative to the project root) holding workspace configuration.
pub const CONFIG_DIR: &str = ".modelvault";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Layout and naming for the local model registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Folder holding one subfolder per saved version.
    #[serde(default = "default_versions_dir")]
    pub versions_dir: PathBuf,
    /// Folder holding the single promoted model.
    #[serde(default = "default_best_dir")]
    pub best_dir: PathBuf,
    /// File stem of the serialized model blob.
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// File stem of the metrics document.
    #[serde(default = "default_metrics_name")]
    pub metrics_name: String,
    /// Metric used to rank candidates.
    #[serde(default = "default_metric_key")]
    pub metric_key: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            versions_dir: default_versions_dir(),
            best_dir: default_best_dir(),
            model_name: default_model_name(),
            metrics_name: default_metrics_name(),
            metric_key: default_metric_key(),
        }
    }
}

impl RegistryConfig {
    /// Versions root resolved against the project root. Absolute paths are kept.
    pub fn versions_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.versions_dir)
    }

    /// Best-model root resolved against the project root.
    pub fn best_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.best_dir)
    }

    /// Reject names that would escape the version folder or collide with temp files.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("registry.model_name", &self.model_name),
            ("registry.metrics_name", &self.metrics_name),
        ] {
            validate_file_stem(field, value)?;
        }
        if self.versions_dir == self.best_dir {
            return Err(ConfigError::Invalid {
                message: "registry.versions_dir and registry.best_dir must differ".into(),
            });
        }
        Ok(())
    }
}

/// A file stem must stay inside its folder and must not look like a temp or hidden file.
pub fn validate_file_stem(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() || value.contains(['/', '\\']) || value.starts_with('.') {
        return Err(ConfigError::Invalid {
            message: format!("{field} must be a plain file stem, got '{value}'"),
        });
    }
    Ok(())
}

fn default_versions_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_best_dir() -> PathBuf {
    PathBuf::from("predictive_model")
}

fn default_model_name() -> String {
    "model".to_string()
}

fn default_metrics_name() -> String {
    "metrics".to_string()
}

fn default_metric_key() -> String {
    "accuracy".to_string()
}

/// Where object-storage credentials come from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to a dotenv-style file with the storage credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<PathBuf>,
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR).join("config.toml")
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "modelvault", "modelvault")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `MODELVAULT_`)
/// 3. Workspace-local config (`.modelvault/config.toml`)
/// 4. User config (`~/.config/modelvault/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    project_root: Option<&Path>,
    overrides: Option<&VaultConfig>,
) -> Result<VaultConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(VaultConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(root) = project_root {
        let ws_config = workspace_config_path(root);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // MODELVAULT_REGISTRY__METRIC_KEY, MODELVAULT_STORAGE__ENV_FILE, etc.
    figment = figment.merge(Env::prefixed("MODELVAULT_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: VaultConfig = figment.extract().map_err(Box::new)?;
    config.registry.validate()?;
    Ok(config)
}

/// Check whether a configuration file exists at user or workspace level.
pub fn config_exists(project_root: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    project_root.is_some_and(|root| workspace_config_path(root).exists())
}

/// Write the default configuration to `.modelvault/config.toml`.
///
/// Returns `Ok(None)` when a config file is already present.
pub fn write_default_config(project_root: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let path = workspace_config_path(project_root);
    if path.exists() {
        return Ok(None);
    }
    let rendered =
        toml::to_string_pretty(&VaultConfig::default()).map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })?;
    crate::persistence::atomic_write(&path, rendered.as_bytes()).map_err(|e| {
        ConfigError::Invalid {
            message: format!("failed to write {}: {e}", path.display()),
        }
    })?;
    tracing::debug!(path = %path.display(), "Wrote default configuration");
    Ok(Some(path))
}
