use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration loaded from sheetflow.toml
///
/// The `[logging]` table of the same file is read by
/// [`crate::logging::LoggingConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SheetflowConfig {
    /// Rule discovery configuration
    #[serde(default)]
    pub rules: RulesConfig,

    /// Batch execution configuration
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Rule discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RulesConfig {
    /// Trusted directory holding script rules, relative to the workspace
    #[serde(default = "default_rule_dir")]
    pub dir: PathBuf,

    /// Workflow description file; the built-in workflow is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<PathBuf>,
}

/// Batch execution configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchConfig {
    /// Maximum number of records processed at once
    #[serde(default = "default_parallel_limit")]
    pub parallel_limit: usize,
}

fn default_rule_dir() -> PathBuf {
    PathBuf::from("rules")
}

fn default_parallel_limit() -> usize {
    4
}

impl Default for RulesConfig {
    fn default() -> Self {
        RulesConfig {
            dir: default_rule_dir(),
            workflow: None,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            parallel_limit: default_parallel_limit(),
        }
    }
}

impl SheetflowConfig {
    /// Rule directory resolved against the workspace root.
    pub fn rule_dir(&self, workspace_root: &std::path::Path) -> PathBuf {
        workspace_root.join(&self.rules.dir)
    }

    /// Workflow file resolved against the workspace root, if configured.
    pub fn workflow_file(&self, workspace_root: &std::path::Path) -> Option<PathBuf> {
        self.rules
            .workflow
            .as_ref()
            .map(|path| workspace_root.join(path))
    }
}


pub mod loader;

pub use loader::ConfigLoader;
