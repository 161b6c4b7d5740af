use crate::core::workflow_graph::plan::{ExecutionPlan, PipelineStep};
use crate::core::workflow_graph::rule::{PassThrough, Transform};
use crate::core::workflow_graph::schema::{WorkflowDescription, END, START};
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Node weight carrying display information.
enum DotNode {
    Sentinel(&'static str),
    Rule {
        name: String,
        reference: String,
        disabled: bool,
    },
}

impl fmt::Display for DotNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DotNode::Sentinel(label) => write!(f, "{label}"),
            DotNode::Rule {
                name,
                reference,
                disabled,
            } => {
                write!(f, "{name}\n{reference}")?;
                if *disabled {
                    write!(f, "\n(disabled)")?;
                }
                Ok(())
            }
        }
    }
}

struct Unlabeled;

impl fmt::Display for Unlabeled {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

fn build_graph(workflow: &WorkflowDescription) -> DiGraph<DotNode, Unlabeled> {
    let mut graph = DiGraph::new();
    let mut node_map: HashMap<String, NodeIndex> = HashMap::new();

    let uses_start = workflow.edges.iter().any(|edge| edge.from == START);
    let uses_end = workflow.edges.iter().any(|edge| edge.to == END);
    if uses_start {
        node_map.insert(START.to_string(), graph.add_node(DotNode::Sentinel(START)));
    }

    for (name, node) in &workflow.nodes {
        let idx = graph.add_node(DotNode::Rule {
            name: name.clone(),
            reference: format!("{}.{}", node.module, node.function),
            disabled: workflow.is_disabled(name),
        });
        node_map.insert(name.clone(), idx);
    }

    if uses_end {
        node_map.insert(END.to_string(), graph.add_node(DotNode::Sentinel(END)));
    }

    for edge in &workflow.edges {
        if let (Some(&from), Some(&to)) = (node_map.get(&edge.from), node_map.get(&edge.to)) {
            graph.add_edge(from, to, Unlabeled);
        }
    }

    graph
}

/// Render the declared workflow as a Graphviz DOT string.
///
/// Disabled nodes are drawn and marked; edges naming undeclared nodes are omitted.
pub fn workflow_to_dot(workflow: &WorkflowDescription) -> String {
    let graph = build_graph(workflow);
    format!("{}", Dot::new(&graph))
}

/// Enabled nodes the compilers will skip as unreachable, sorted by name.
///
/// Entry points follow [`ExecutionPlan::indexed`]: the `START` successors, or every
/// node without predecessors when no `START` edge exists. A workflow without
/// usable edges runs every node, so nothing is reported.
pub fn reachability_warnings(workflow: &WorkflowDescription) -> Vec<String> {
    let steps = workflow
        .enabled_nodes()
        .map(|(name, node)| {
            let transform: Transform = Arc::new(PassThrough::new(&node.module, &node.function));
            PipelineStep::new(name.as_str(), transform)
        })
        .collect();
    let plan = ExecutionPlan::new(workflow, steps);
    if plan.edges.is_empty() {
        return Vec::new();
    }

    let indexed = plan.indexed();
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..plan.steps.len()).map(|index| graph.add_node(index)).collect();
    for (from, to) in &indexed.links {
        graph.add_edge(nodes[*from], nodes[*to], ());
    }

    let mut reachable = vec![false; plan.steps.len()];
    for entry in &indexed.entries {
        let mut bfs = Bfs::new(&graph, nodes[*entry]);
        while let Some(nx) = bfs.next(&graph) {
            reachable[graph[nx]] = true;
        }
    }

    let mut unreachable: Vec<String> = plan
        .steps
        .iter()
        .zip(&reachable)
        .filter(|(_, reached)| !**reached)
        .map(|(step, _)| step.name.clone())
        .collect();
    unreachable.sort();
    unreachable
}
