#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::workflow_graph::compiler::{default_compiler, Compiler};
use crate::core::workflow_graph::pipeline::CompiledPipeline;
use crate::core::workflow_graph::plan::{ExecutionPlan, PipelineStep};
use crate::core::workflow_graph::resolver::RuleResolver;
use crate::core::workflow_graph::schema::WorkflowDescription;

/// Turns workflow descriptions into compiled pipelines.
///
/// Owns the resolver, so transforms stay cached across every pipeline it builds.
pub struct PipelineAssembler {
    resolver: RuleResolver,
    compiler: Box<dyn Compiler>,
}

impl PipelineAssembler {
    /// Assembler using the best compiler strategy available in this build.
    pub fn new(resolver: RuleResolver) -> Self {
        Self::with_compiler(resolver, default_compiler())
    }

    pub fn with_compiler(resolver: RuleResolver, compiler: Box<dyn Compiler>) -> Self {
        Self { resolver, compiler }
    }

    pub fn resolver(&self) -> &RuleResolver {
        &self.resolver
    }

    pub fn compiler_name(&self) -> &'static str {
        self.compiler.name()
    }

    /// Build a pipeline for `workflow`.
    ///
    /// Fails only on a trust-boundary violation in a node's module reference.
    pub fn assemble(&mut self, workflow: &WorkflowDescription) -> Result<CompiledPipeline, AppError> {
        let mut steps = Vec::with_capacity(workflow.nodes.len());
        for (name, node) in &workflow.nodes {
            if workflow.is_disabled(name) {
                tracing::info!(node = %name, "skipping disabled node");
                continue;
            }
            let transform = self
                .resolver
                .resolve(&node.module, &node.function)
                .map_err(|err| err.with_context("node", name.as_str()))?;
            tracing::debug!(
                node = %name,
                rule = %format!("{}.{}", node.module, node.function),
                "added node"
            );
            steps.push(PipelineStep::new(name.as_str(), transform).with_description(node.description.clone()));
        }

        for disabled in &workflow.disabled_nodes {
            if !workflow.nodes.contains_key(disabled) {
                tracing::warn!(node = %disabled, "disabled node is not declared");
            }
        }

        if steps.is_empty() {
            tracing::warn!("workflow has no enabled nodes, pipeline passes records through unchanged");
            return Ok(CompiledPipeline::passthrough(workflow.state_key()));
        }

        let plan = ExecutionPlan::new(workflow, steps);
        let pipeline = self.compiler.compile(plan);
        tracing::info!(
            nodes = pipeline.len(),
            strategy = pipeline.strategy(),
            "workflow pipeline assembled"
        );
        Ok(pipeline)
    }
}
