//! Configurable rule pipelines over spreadsheet records.

#![allow(clippy::result_large_err)]

pub mod assembler;
pub mod batch;
pub mod compiler;
#[cfg(feature = "graph")]
pub mod dot;
pub mod executor;
pub mod pipeline;
pub mod plan;
pub mod record;
pub mod resolver;
pub mod rule;
pub mod rules;
pub mod schema;
pub mod script;

pub use assembler::PipelineAssembler;
pub use batch::BatchRunner;
pub use pipeline::CompiledPipeline;
pub use record::Record;
pub use resolver::RuleResolver;
pub use rule::{Rule, RuleRegistry, Transform};
pub use schema::{ConfigSource, WorkflowDescription, YamlFileSource};

use crate::core::config::{ConfigLoader, SheetflowConfig};
use crate::core::error::AppError;
use std::path::Path;

/// Build the pipeline described by `config` for the workspace at `workspace_root`.
///
/// Script rules resolve from the configured rule directory; the workflow file
/// falls back to the built-in workflow when it is unset or unreadable.
pub fn build_pipeline(
    config: &SheetflowConfig,
    workspace_root: &Path,
    registry: RuleRegistry,
) -> Result<CompiledPipeline, AppError> {
    ConfigLoader::validate_config(config)?;
    let workflow_file = config.workflow_file(workspace_root);
    let workflow = schema::load_workflow(workflow_file.as_deref());
    let resolver = RuleResolver::new(registry).with_rule_dir(config.rule_dir(workspace_root));
    PipelineAssembler::new(resolver).assemble(&workflow)
}
