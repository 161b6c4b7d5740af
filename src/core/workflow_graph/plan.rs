//! Pre-compilation view of a workflow: bound steps plus repaired edges.

use crate::core::workflow_graph::rule::Transform;
use crate::core::workflow_graph::schema::{WorkflowDescription, END, START};
use std::collections::HashSet;
use std::fmt;

/// One node bound to its resolved transform.
#[derive(Clone)]
pub struct PipelineStep {
    pub name: String,
    pub description: Option<String>,
    pub transform: Transform,
}

impl PipelineStep {
    pub fn new(name: impl Into<String>, transform: Transform) -> Self {
        Self {
            name: name.into(),
            description: None,
            transform,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

impl fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStep")
            .field("name", &self.name)
            .field("rule", &self.transform.name())
            .finish()
    }
}

/// Edge endpoint after sentinel mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Start,
    End,
    Node(String),
}

impl Endpoint {
    fn parse(name: &str) -> Self {
        match name {
            START => Endpoint::Start,
            END => Endpoint::End,
            other => Endpoint::Node(other.to_string()),
        }
    }

    pub fn node_name(&self) -> Option<&str> {
        match self {
            Endpoint::Node(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Start => write!(f, "{}", START),
            Endpoint::End => write!(f, "{}", END),
            Endpoint::Node(name) => write!(f, "{}", name),
        }
    }
}

/// Enabled steps in declaration order and edges that only reference them.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub state_key: String,
    pub steps: Vec<PipelineStep>,
    pub edges: Vec<(Endpoint, Endpoint)>,
}

impl ExecutionPlan {
    /// Build a plan from bound steps and the workflow's declared edges.
    pub fn new(workflow: &WorkflowDescription, steps: Vec<PipelineStep>) -> Self {
        let enabled: HashSet<&str> = steps.iter().map(|step| step.name.as_str()).collect();
        let edges = normalize_edges(workflow, &enabled);
        Self {
            state_key: workflow.state_key().to_string(),
            steps,
            edges,
        }
    }

    /// Position of `name` in declaration order.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.name == name)
    }

    /// Node-index edges plus the entry nodes the plan starts from.
    ///
    /// Entries are the `START` successors, or every node without an incoming
    /// edge when the workflow declares no `START` edge.
    pub fn indexed(&self) -> IndexedEdges {
        let mut entries = Vec::new();
        let mut links = Vec::new();
        for (from, to) in &self.edges {
            let to_index = to.node_name().and_then(|name| self.index_of(name));
            match (from, to_index) {
                (Endpoint::Start, Some(to)) => entries.push(to),
                (Endpoint::Node(name), Some(to)) => {
                    if let Some(from) = self.index_of(name) {
                        links.push((from, to));
                    }
                }
                _ => {}
            }
        }

        let implicit_entries = entries.is_empty();
        if implicit_entries {
            let targets: HashSet<usize> = links.iter().map(|(_, to)| *to).collect();
            entries = (0..self.steps.len())
                .filter(|index| !targets.contains(index))
                .collect();
        }
        entries.sort_unstable();
        entries.dedup();
        IndexedEdges {
            entries,
            links,
            implicit_entries,
        }
    }
}

/// Edges expressed as positions into [`ExecutionPlan::steps`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedEdges {
    pub entries: Vec<usize>,
    pub links: Vec<(usize, usize)>,
    pub implicit_entries: bool,
}

fn normalize_edges(
    workflow: &WorkflowDescription,
    enabled: &HashSet<&str>,
) -> Vec<(Endpoint, Endpoint)> {
    let mut edges: Vec<(Endpoint, Endpoint)> = Vec::new();
    for edge in &workflow.edges {
        let from = Endpoint::parse(&edge.from);
        let to = Endpoint::parse(&edge.to);
        if from == Endpoint::End || to == Endpoint::Start {
            tracing::warn!(from = %edge.from, to = %edge.to, "edge runs backwards through a sentinel, dropping");
            continue;
        }
        let undeclared = [&from, &to].into_iter().find_map(|endpoint| {
            endpoint
                .node_name()
                .filter(|name| !workflow.nodes.contains_key(*name))
        });
        if let Some(name) = undeclared {
            tracing::warn!(from = %edge.from, to = %edge.to, node = name, "edge references undeclared node, dropping");
            continue;
        }
        edges.push((from, to));
    }

    // Contract nodes that are declared but not part of the pipeline.
    let bypassed: Vec<String> = workflow
        .nodes
        .keys()
        .filter(|name| !enabled.contains(name.as_str()))
        .cloned()
        .collect();
    for name in bypassed {
        let node = Endpoint::Node(name.clone());
        let incoming: Vec<Endpoint> = edges
            .iter()
            .filter(|(_, to)| *to == node)
            .map(|(from, _)| from.clone())
            .collect();
        let outgoing: Vec<Endpoint> = edges
            .iter()
            .filter(|(from, _)| *from == node)
            .map(|(_, to)| to.clone())
            .collect();
        if incoming.is_empty() && outgoing.is_empty() {
            continue;
        }
        tracing::debug!(node = %name, "bridging edges around disabled node");
        edges.retain(|(from, to)| *from != node && *to != node);
        for from in &incoming {
            for to in &outgoing {
                edges.push((from.clone(), to.clone()));
            }
        }
    }

    let mut seen = HashSet::new();
    edges.retain(|(from, to)| {
        let trivial = from == to || (*from == Endpoint::Start && *to == Endpoint::End);
        !trivial && seen.insert((from.clone(), to.clone()))
    });
    edges
}
