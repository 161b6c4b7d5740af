use super::{select_steps, warn_unscheduled, Compiler};
use crate::core::workflow_graph::pipeline::CompiledPipeline;
use crate::core::workflow_graph::plan::{Endpoint, ExecutionPlan};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Walker};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

/// Node weight: sentinels plus positions into the plan's steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphNode {
    Start,
    End,
    Step(usize),
}

/// Graph-backed strategy built on petgraph.
///
/// Supports branch/merge shapes: every node reachable from `START` runs once, after
/// all of its reachable predecessors.
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphCompiler;

impl GraphCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for GraphCompiler {
    fn name(&self) -> &'static str {
        "graph"
    }

    fn compile(&self, plan: ExecutionPlan) -> CompiledPipeline {
        let order = if plan.edges.is_empty() {
            (0..plan.steps.len()).collect()
        } else {
            WorkflowGraph::build(&plan).linearize(&plan)
        };
        tracing::info!(
            strategy = self.name(),
            nodes = order.len(),
            "compiled pipeline"
        );
        select_steps(plan, &order, self.name())
    }
}

struct WorkflowGraph {
    graph: DiGraph<GraphNode, ()>,
    start: NodeIndex,
    steps: Vec<NodeIndex>,
}

impl WorkflowGraph {
    fn build(plan: &ExecutionPlan) -> Self {
        let mut graph = DiGraph::new();
        let start = graph.add_node(GraphNode::Start);
        let end = graph.add_node(GraphNode::End);
        let steps: Vec<NodeIndex> = (0..plan.steps.len())
            .map(|index| graph.add_node(GraphNode::Step(index)))
            .collect();

        let lookup = |endpoint: &Endpoint| match endpoint {
            Endpoint::Start => Some(start),
            Endpoint::End => Some(end),
            Endpoint::Node(name) => plan.index_of(name).map(|index| steps[index]),
        };
        for (from, to) in &plan.edges {
            if let (Some(from), Some(to)) = (lookup(from), lookup(to)) {
                graph.add_edge(from, to, ());
            }
        }

        // Without a START edge, enter at every node lacking predecessors.
        let indexed = plan.indexed();
        if indexed.implicit_entries {
            tracing::warn!("workflow declares no START edge, entering at nodes without predecessors");
            for index in indexed.entries {
                graph.add_edge(start, steps[index], ());
            }
        }

        Self {
            graph,
            start,
            steps,
        }
    }

    fn linearize(&self, plan: &ExecutionPlan) -> Vec<usize> {
        let count = self.steps.len();
        let reachable_nodes: HashSet<NodeIndex> =
            Bfs::new(&self.graph, self.start).iter(&self.graph).collect();
        let reachable: Vec<bool> = self
            .steps
            .iter()
            .map(|node| reachable_nodes.contains(node))
            .collect();
        warn_unscheduled(plan, &reachable);

        let step_of = |node: NodeIndex| match self.graph[node] {
            GraphNode::Step(index) if reachable[index] => Some(index),
            _ => None,
        };

        let mut in_degree = vec![0usize; count];
        for (index, node) in self.steps.iter().enumerate() {
            if reachable[index] {
                in_degree[index] = self
                    .graph
                    .neighbors_directed(*node, Direction::Incoming)
                    .filter(|pred| step_of(*pred).is_some())
                    .count();
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..count)
            .filter(|index| reachable[*index] && in_degree[*index] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(current)) = ready.pop() {
            order.push(current);
            for next in self
                .graph
                .neighbors_directed(self.steps[current], Direction::Outgoing)
                .filter_map(step_of)
            {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() < reachable.iter().filter(|r| **r).count() {
            let placed: HashSet<usize> = order.iter().copied().collect();
            let mut cyclic: Vec<usize> = tarjan_scc(&self.graph)
                .into_iter()
                .flatten()
                .filter_map(step_of)
                .filter(|index| !placed.contains(index))
                .collect();
            cyclic.sort_unstable();
            let names: Vec<&str> = cyclic
                .iter()
                .map(|index| plan.steps[*index].name.as_str())
                .collect();
            tracing::error!(nodes = ?names, "workflow edges form a cycle, running those nodes in declaration order");
            order.extend(cyclic);
        }
        order
    }
}
