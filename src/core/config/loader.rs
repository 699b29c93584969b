use super::BridgeConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from a workspace root (workspace/modelbridge.toml).
    /// Environment variables override config file values.
    /// A missing file yields defaults plus env overrides.
    pub fn load_from_workspace(workspace_path: &Path) -> Result<BridgeConfig, AppError> {
        let config_path = workspace_path.join("modelbridge.toml");
        let config_file = Self::load_from_file(&config_path)?;

        let mut config = config_file.unwrap_or_default();

        Self::apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Load config from a specific file path.
    /// Returns Ok(None) if the file doesn't exist.
    pub fn load_from_file(path: &Path) -> Result<Option<BridgeConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: BridgeConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
        })?;

        Ok(Some(config))
    }

    /// Apply environment variable overrides to the configuration.
    /// Environment variables take precedence over config file values.
    fn apply_env_overrides(config: &mut BridgeConfig) {
        if let Ok(dir) = env::var("MODELBRIDGE_DATA_DIR") {
            config.workspace.data_dir = PathBuf::from(dir);
        }

        if let Ok(base_url) = env::var("MODELBRIDGE_MODELER_BASE_URL") {
            config.modeler.base_url = base_url;
        }

        if let Ok(token_url) = env::var("MODELBRIDGE_MODELER_TOKEN_URL") {
            config.modeler.token_url = token_url;
        }

        if let Ok(audience) = env::var("MODELBRIDGE_MODELER_AUDIENCE") {
            config.modeler.audience = audience;
        }

        if let Ok(project) = env::var("MODELBRIDGE_MODELER_PROJECT") {
            config.modeler.project_name = Some(project);
        }

        if let Ok(attempts) = env::var("MODELBRIDGE_MODELER_MAX_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse::<u32>() {
                config.modeler.max_attempts = attempts;
            }
        }

        if let Ok(root) = env::var("MODELBRIDGE_STORAGE_ROOT") {
            config.storage.root = PathBuf::from(root);
        }

        if let Ok(bucket) = env::var("MODELBRIDGE_STORAGE_BUCKET") {
            config.storage.bucket = bucket;
        }

        if let Ok(endpoint) = env::var("MODELBRIDGE_TEXTGEN_ENDPOINT") {
            config.textgen.endpoint = Some(endpoint);
        }

        if let Ok(model) = env::var("MODELBRIDGE_TEXTGEN_MODEL") {
            config.textgen.model = model;
        }
    }
}
