#![allow(clippy::result_large_err)]

use super::SheetflowConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "sheetflow.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from workspace root (workspace/sheetflow.toml)
    /// Environment variables override config file values
    pub fn load_from_workspace(workspace_path: &Path) -> Result<SheetflowConfig, AppError> {
        let config_path = workspace_path.join(CONFIG_FILE_NAME);
        let config_file = Self::load_from_file(&config_path)?;

        let mut config = config_file.unwrap_or_default();
        Self::apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<SheetflowConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: SheetflowConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
        })?;

        Ok(Some(config))
    }

    fn apply_env_overrides(config: &mut SheetflowConfig) {
        if let Ok(dir) = env::var("SHEETFLOW_RULE_DIR") {
            config.rules.dir = PathBuf::from(dir);
        }

        if let Ok(workflow) = env::var("SHEETFLOW_WORKFLOW_FILE") {
            config.rules.workflow = Some(PathBuf::from(workflow));
        }

        if let Ok(limit_str) = env::var("SHEETFLOW_BATCH_PARALLEL_LIMIT") {
            match limit_str.parse::<usize>() {
                Ok(limit) => config.batch.parallel_limit = limit,
                Err(_) => tracing::warn!(
                    value = %limit_str,
                    "ignoring non-numeric SHEETFLOW_BATCH_PARALLEL_LIMIT"
                ),
            }
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "SHEETFLOW_RULE_DIR - Override the trusted rule directory (default: rules)",
            "SHEETFLOW_WORKFLOW_FILE - Override the workflow description file",
            "SHEETFLOW_BATCH_PARALLEL_LIMIT - Override the batch parallel limit (default: 4)",
        ]
    }

    /// Validate configuration values
    pub fn validate_config(config: &SheetflowConfig) -> Result<(), AppError> {
        if config.rules.dir.as_os_str().is_empty() {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "Rule directory cannot be empty",
            ));
        }

        if config.batch.parallel_limit == 0 {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "Batch parallel limit must be at least 1",
            ));
        }

        if let Some(workflow) = &config.rules.workflow {
            if workflow.as_os_str().is_empty() {
                return Err(AppError::new(
                    ErrorCategory::ValidationError,
                    "Workflow file path cannot be empty",
                ));
            }
        }

        Ok(())
    }
}
