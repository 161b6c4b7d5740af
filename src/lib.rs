//! Configurable rule pipelines for tabular shipment records.
//!
//! A [`core::workflow_graph::WorkflowDescription`] names rules and their order;
//! the assembler resolves each rule through a trusted registry or rule directory
//! and the executor applies the resulting pipeline to one record at a time.

pub mod core;
pub mod logging;

/// Current crate version string exposed for embedding applications and tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub type Result<T> = std::result::Result<T, anyhow::Error>;
