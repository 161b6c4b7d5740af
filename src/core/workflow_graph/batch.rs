//! Runs many records through one compiled pipeline on a bounded worker pool.

use crate::core::workflow_graph::executor;
use crate::core::workflow_graph::pipeline::CompiledPipeline;
use crate::core::workflow_graph::record::Record;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Fans records out over blocking worker tasks, preserving input order.
#[derive(Clone)]
pub struct BatchRunner {
    pipeline: Arc<CompiledPipeline>,
    parallel_limit: usize,
}

impl BatchRunner {
    /// `parallel_limit` below one is treated as one.
    pub fn new(pipeline: Arc<CompiledPipeline>, parallel_limit: usize) -> Self {
        Self {
            pipeline,
            parallel_limit: parallel_limit.max(1),
        }
    }

    pub fn pipeline(&self) -> &CompiledPipeline {
        &self.pipeline
    }

    pub fn parallel_limit(&self) -> usize {
        self.parallel_limit
    }

    /// Transform every record; output position `i` corresponds to input `i`.
    pub async fn run(&self, records: Vec<Record>) -> Vec<Record> {
        let total = records.len();
        let permits = Arc::new(Semaphore::new(self.parallel_limit));
        let mut handles = Vec::with_capacity(total);
        for (index, record) in records.into_iter().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let permits = Arc::clone(&permits);
            let fallback = record.clone();
            handles.push(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return fallback,
                };
                tracing::debug!(record = index + 1, total, "processing record");
                let task = tokio::task::spawn_blocking(move || executor::run(&pipeline, record));
                match task.await {
                    Ok(processed) => processed,
                    Err(err) => {
                        tracing::error!(record = index + 1, error = %err, "record worker failed, keeping input record");
                        fallback
                    }
                }
            });
        }
        let processed = join_all(handles).await;
        tracing::info!(records = processed.len(), "batch completed");
        processed
    }

    /// Like [`BatchRunner::run`] for raw JSON items; non-object items are skipped.
    pub async fn run_values(&self, items: Vec<Value>) -> Vec<Record> {
        let records = items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match item {
                Value::Object(record) => Some(record),
                _ => {
                    tracing::warn!(index, "skipping batch item that is not an object");
                    None
                }
            })
            .collect();
        self.run(records).await
    }
}
