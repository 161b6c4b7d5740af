#![allow(clippy::result_large_err)] // Workflow schema APIs return AppError to preserve structured validation context without boxing.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Sentinel edge endpoint marking the workflow entry.
pub const START: &str = "START";
/// Sentinel edge endpoint marking the workflow exit.
pub const END: &str = "END";

const DEFAULT_STATE_KEY: &str = "product_data";
const DEFAULT_WORKFLOW_KIND: &str = "sequential";

fn default_state_key() -> String {
    DEFAULT_STATE_KEY.to_string()
}

fn default_workflow_kind() -> String {
    DEFAULT_WORKFLOW_KIND.to_string()
}

/// Root document describing a rule pipeline.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WorkflowDescription {
    #[serde(default)]
    pub workflow: WorkflowSettings,
    #[serde(default)]
    pub nodes: IndexMap<String, NodeDescriptor>,
    #[serde(default)]
    pub edges: Vec<EdgeDescriptor>,
    #[serde(default)]
    pub disabled_nodes: Vec<String>,
}

/// Workflow-level settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowSettings {
    /// Informational execution style, e.g. `sequential`.
    #[serde(rename = "type", default = "default_workflow_kind")]
    pub kind: String,
    /// Field of the outer execution state that holds the record.
    #[serde(default = "default_state_key")]
    pub state_key: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            kind: default_workflow_kind(),
            state_key: default_state_key(),
        }
    }
}

/// A node bound to one `(module, function)` rule reference.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeDescriptor {
    pub module: String,
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NodeDescriptor {
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Directed edge between two node names or sentinels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct EdgeDescriptor {
    pub from: String,
    pub to: String,
}

impl EdgeDescriptor {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl WorkflowDescription {
    /// Built-in workflow used when no configuration can be loaded.
    pub fn builtin() -> Self {
        let chain = [
            (
                "format_fba_id",
                "apply_fba_rule",
                "Normalize FBA shipment box ids",
            ),
            (
                "replace_parentheses",
                "apply_parentheses_rule",
                "Replace ASCII parentheses with full-width ones",
            ),
            (
                "calculate_totals",
                "apply_calculate_rules",
                "Compute piece and price totals",
            ),
            (
                "fill_missing_values",
                "apply_fill_missing_values_rule",
                "Fill empty cells with defaults",
            ),
        ];

        let mut nodes = IndexMap::new();
        for (module, function, description) in chain {
            nodes.insert(
                module.to_string(),
                NodeDescriptor::new(module, function).with_description(description),
            );
        }
        let names: Vec<&str> = chain.iter().map(|(name, _, _)| *name).collect();
        Self::linear(nodes, &names)
    }

    /// Chain `order` from `START` to `END` over the given nodes.
    pub fn linear(nodes: IndexMap<String, NodeDescriptor>, order: &[&str]) -> Self {
        let mut edges = Vec::with_capacity(order.len() + 1);
        let mut previous = START;
        for name in order {
            edges.push(EdgeDescriptor::new(previous, *name));
            previous = *name;
        }
        if !order.is_empty() {
            edges.push(EdgeDescriptor::new(previous, END));
        }
        Self {
            workflow: WorkflowSettings::default(),
            nodes,
            edges,
            disabled_nodes: Vec::new(),
        }
    }

    pub fn state_key(&self) -> &str {
        &self.workflow.state_key
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled_nodes.iter().any(|disabled| disabled == name)
    }

    /// Enabled nodes in declaration order.
    pub fn enabled_nodes(&self) -> impl Iterator<Item = (&String, &NodeDescriptor)> {
        self.nodes.iter().filter(|(name, _)| !self.is_disabled(name))
    }

    /// Parse a workflow from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, AppError> {
        let mut description: WorkflowDescription = serde_yaml::from_str(text).map_err(|err| {
            AppError::new(
                ErrorCategory::SerializationError,
                format!("failed to parse workflow: {}", err),
            )
        })?;
        if description.workflow.state_key.trim().is_empty() {
            description.workflow.state_key = default_state_key();
        }
        Ok(description)
    }

    /// Load a workflow from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self, AppError> {
        let text = fs::read_to_string(path).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to read {}: {}", path.display(), err),
            )
        })?;
        Self::from_yaml_str(&text).map_err(|err| err.with_context("path", path.display().to_string()))
    }
}

/// Supplies a workflow description to the assembler.
pub trait ConfigSource {
    fn load(&self) -> Result<WorkflowDescription, AppError>;
}

/// Workflow description stored in a YAML file.
#[derive(Debug, Clone)]
pub struct YamlFileSource {
    path: PathBuf,
}

impl YamlFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for YamlFileSource {
    fn load(&self) -> Result<WorkflowDescription, AppError> {
        WorkflowDescription::load_from_file(&self.path)
    }
}

/// Load from `source`, falling back to [`WorkflowDescription::builtin`] on any failure.
pub fn load_or_builtin(source: &dyn ConfigSource) -> WorkflowDescription {
    match source.load() {
        Ok(description) => {
            tracing::info!(
                nodes = description.nodes.len(),
                edges = description.edges.len(),
                "loaded workflow configuration"
            );
            description
        }
        Err(err) => {
            tracing::error!(
                error = %err.message,
                "failed to load workflow configuration, using built-in workflow"
            );
            WorkflowDescription::builtin()
        }
    }
}

/// Load the workflow at `path`; `None` or any failure yields the built-in workflow.
pub fn load_workflow(path: Option<&Path>) -> WorkflowDescription {
    match path {
        Some(path) => load_or_builtin(&YamlFileSource::new(path)),
        None => {
            tracing::warn!("no workflow configuration given, using built-in workflow");
            WorkflowDescription::builtin()
        }
    }
}
