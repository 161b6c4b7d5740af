//! Strategies that linearize an [`ExecutionPlan`] into a [`CompiledPipeline`].
//!
//! Both strategies produce the same order for the same plan: with no edges the
//! declaration order, otherwise a topological order of the nodes reachable from
//! the entry points with ties broken by declaration order.

use crate::core::workflow_graph::pipeline::CompiledPipeline;
use crate::core::workflow_graph::plan::ExecutionPlan;

#[cfg(feature = "graph")]
pub mod graph;
pub mod sequential;

#[cfg(feature = "graph")]
pub use graph::GraphCompiler;
pub use sequential::SequentialCompiler;

/// Turns an execution plan into a compiled pipeline.
pub trait Compiler: Send + Sync {
    /// Strategy name recorded on the compiled pipeline.
    fn name(&self) -> &'static str;

    fn compile(&self, plan: ExecutionPlan) -> CompiledPipeline;
}

/// Pick the best available strategy for this build.
pub fn default_compiler() -> Box<dyn Compiler> {
    #[cfg(feature = "graph")]
    {
        Box::new(GraphCompiler::new())
    }
    #[cfg(not(feature = "graph"))]
    {
        Box::new(SequentialCompiler::new())
    }
}

/// True when the graph-backed strategy was compiled in.
pub fn graph_backend_available() -> bool {
    cfg!(feature = "graph")
}

/// Keep `order` (positions into `plan.steps`) and drop everything else.
fn select_steps(plan: ExecutionPlan, order: &[usize], strategy: &'static str) -> CompiledPipeline {
    let mut slots: Vec<_> = plan.steps.into_iter().map(Some).collect();
    let steps = order
        .iter()
        .filter_map(|index| slots.get_mut(*index).and_then(Option::take))
        .collect();
    CompiledPipeline::new(plan.state_key, strategy, steps)
}

/// Nodes of `plan` never scheduled by `order`, logged by name.
fn warn_unscheduled(plan: &ExecutionPlan, reachable: &[bool]) {
    for (index, step) in plan.steps.iter().enumerate() {
        if !reachable[index] {
            tracing::warn!(node = %step.name, "node is not reachable from the workflow entry, skipping");
        }
    }
}
