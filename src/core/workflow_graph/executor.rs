//! Runs records through a compiled pipeline with per-node failure isolation.

use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, NodeStatus};
use crate::core::workflow_graph::pipeline::CompiledPipeline;
use crate::core::workflow_graph::plan::PipelineStep;
use crate::core::workflow_graph::record::Record;
use serde_json::Value;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Result of one node over one record.
#[derive(Debug)]
pub enum NodeResult {
    /// The node returned an updated record.
    Applied(Record),
    /// The node failed; `record` is the value from before it ran.
    Failed { record: Record, error: AppError },
}

impl NodeResult {
    pub fn status(&self) -> NodeStatus {
        match self {
            NodeResult::Applied(_) => NodeStatus::Applied,
            NodeResult::Failed { .. } => NodeStatus::Failed,
        }
    }

    pub fn into_record(self) -> Record {
        match self {
            NodeResult::Applied(record) => record,
            NodeResult::Failed { record, .. } => record,
        }
    }
}

/// Diagnostic entry for one node of a run.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub node: String,
    pub status: NodeStatus,
    pub error: Option<String>,
    pub duration: Duration,
}

/// Final record plus per-node outcomes.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub record: Record,
    pub outcomes: Vec<NodeOutcome>,
}

impl PipelineRun {
    pub fn failed_nodes(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == NodeStatus::Failed)
            .map(|outcome| outcome.node.as_str())
            .collect()
    }
}

/// Run one node on a copy of `record`; errors and panics keep the original.
pub fn run_node(step: &PipelineStep, record: Record) -> NodeResult {
    let attempt = record.clone();
    let result = catch_unwind(AssertUnwindSafe(|| step.transform.apply(attempt)));
    match result {
        Ok(Ok(updated)) => NodeResult::Applied(updated),
        Ok(Err(error)) => NodeResult::Failed {
            record,
            error: error.with_context("node", step.name.as_str()),
        },
        Err(payload) => NodeResult::Failed {
            record,
            error: AppError::new(
                ErrorCategory::NodeExecutionFailure,
                format!("rule panicked: {}", panic_message(payload.as_ref())),
            )
            .with_code("SFL-NODE-PANIC")
            .with_context("node", step.name.as_str()),
        },
    }
}

/// Run `record` through every step and report each node's outcome.
pub fn run_with_report(pipeline: &CompiledPipeline, record: Record) -> PipelineRun {
    let mut current = record;
    let mut outcomes = Vec::with_capacity(pipeline.len());
    for step in pipeline.steps() {
        let started = Instant::now();
        let result = run_node(step, current);
        let duration = started.elapsed();
        let status = result.status();
        let error = match &result {
            NodeResult::Applied(_) => {
                match &step.description {
                    Some(description) => {
                        tracing::info!(node = %step.name, description = %description, "node completed")
                    }
                    None => tracing::info!(node = %step.name, "node completed"),
                }
                None
            }
            NodeResult::Failed { error, .. } => {
                tracing::error!(
                    node = %step.name,
                    rule = %step.transform.name(),
                    error = %error.message,
                    "node failed, keeping record from before the node"
                );
                Some(error.message.clone())
            }
        };
        outcomes.push(NodeOutcome {
            node: step.name.clone(),
            status,
            error,
            duration,
        });
        current = result.into_record();
    }
    PipelineRun {
        record: current,
        outcomes,
    }
}

/// Run `record` through `pipeline` and return the final record.
pub fn run(pipeline: &CompiledPipeline, record: Record) -> Record {
    run_with_report(pipeline, record).record
}

/// Run the record held under the pipeline's state key of an outer state object.
///
/// A state without an object under that key is returned unchanged.
pub fn invoke(pipeline: &CompiledPipeline, state: Value) -> Value {
    let key = pipeline.state_key();
    let mut state = match state {
        Value::Object(map) => map,
        other => {
            tracing::warn!(state_key = key, "execution state is not an object, returning it unchanged");
            return other;
        }
    };
    match state.get_mut(key) {
        Some(Value::Object(record)) => {
            let input = std::mem::take(record);
            *record = run(pipeline, input);
        }
        Some(_) => {
            tracing::warn!(state_key = key, "state entry is not an object, returning state unchanged");
        }
        None => {
            tracing::warn!(state_key = key, "execution state has no record under the state key");
        }
    }
    Value::Object(state)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
