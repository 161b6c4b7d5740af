use super::{select_steps, warn_unscheduled, Compiler};
use crate::core::workflow_graph::pipeline::CompiledPipeline;
use crate::core::workflow_graph::plan::ExecutionPlan;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

/// Strategy used when no graph backend is compiled in.
///
/// Declaration order when the plan has no edges; otherwise a Kahn topological
/// sort over explicit edges so non-linear workflows keep their dependencies.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialCompiler;

impl SequentialCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for SequentialCompiler {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn compile(&self, plan: ExecutionPlan) -> CompiledPipeline {
        let order = linearize(&plan);
        tracing::info!(
            strategy = self.name(),
            nodes = order.len(),
            "compiled pipeline"
        );
        select_steps(plan, &order, self.name())
    }
}

fn linearize(plan: &ExecutionPlan) -> Vec<usize> {
    let count = plan.steps.len();
    if plan.edges.is_empty() {
        return (0..count).collect();
    }

    let indexed = plan.indexed();
    if indexed.implicit_entries {
        tracing::warn!("workflow declares no START edge, entering at nodes without predecessors");
    }

    let mut successors = vec![Vec::new(); count];
    for (from, to) in &indexed.links {
        successors[*from].push(*to);
    }

    let mut reachable = vec![false; count];
    let mut queue: VecDeque<usize> = indexed.entries.iter().copied().collect();
    while let Some(current) = queue.pop_front() {
        if std::mem::replace(&mut reachable[current], true) {
            continue;
        }
        queue.extend(successors[current].iter().copied());
    }
    warn_unscheduled(plan, &reachable);

    let mut in_degree = vec![0usize; count];
    for (from, to) in &indexed.links {
        if reachable[*from] && reachable[*to] {
            in_degree[*to] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..count)
        .filter(|index| reachable[*index] && in_degree[*index] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(count);
    let mut placed = vec![false; count];
    while let Some(Reverse(current)) = ready.pop() {
        order.push(current);
        placed[current] = true;
        for next in &successors[current] {
            in_degree[*next] -= 1;
            if in_degree[*next] == 0 {
                ready.push(Reverse(*next));
            }
        }
    }

    let cyclic: Vec<usize> = (0..count)
        .filter(|index| reachable[*index] && !placed[*index])
        .collect();
    if !cyclic.is_empty() {
        let names: Vec<&str> = cyclic
            .iter()
            .map(|index| plan.steps[*index].name.as_str())
            .collect();
        tracing::error!(nodes = ?names, "workflow edges form a cycle, running those nodes in declaration order");
        order.extend(cyclic);
    }
    order
}
