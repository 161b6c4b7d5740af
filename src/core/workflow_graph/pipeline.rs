use crate::core::workflow_graph::plan::PipelineStep;
use std::fmt;

/// Immutable, ready-to-run linearization of a workflow.
///
/// Built once per configuration load and shared across every record of a batch.
#[derive(Clone)]
pub struct CompiledPipeline {
    state_key: String,
    strategy: &'static str,
    steps: Vec<PipelineStep>,
}

impl CompiledPipeline {
    pub fn new(state_key: impl Into<String>, strategy: &'static str, steps: Vec<PipelineStep>) -> Self {
        Self {
            state_key: state_key.into(),
            strategy,
            steps,
        }
    }

    /// Pipeline without steps; running it returns the input unchanged.
    pub fn passthrough(state_key: impl Into<String>) -> Self {
        Self::new(state_key, "passthrough", Vec::new())
    }

    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    /// Name of the compiler strategy that produced this pipeline.
    pub fn strategy(&self) -> &'static str {
        self.strategy
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Debug for CompiledPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPipeline")
            .field("state_key", &self.state_key)
            .field("strategy", &self.strategy)
            .field("nodes", &self.node_names())
            .finish()
    }
}
