pub mod config;
pub mod error;
pub mod types;
pub mod workflow_graph;

pub use config::{ConfigLoader, SheetflowConfig};
pub use error::AppError;
pub use types::*;
