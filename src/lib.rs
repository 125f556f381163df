//! Orchestration core for point cloud map tooling.
//!
//! Sequences external converters, the grid divider and the enhancer into
//! single operations, batches and a guided pipeline, streaming their output
//! as progress events. Header metadata is read through a structured query
//! tool with a text-report fallback.

pub mod config;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod model;
pub mod naming;
pub mod orchestrator;
pub mod text_summary;

pub use config::Config;
pub use error::{Result, WorkflowError};
pub use metadata::MetadataExtractor;
pub use model::{Operation, RunOutcome, WorkflowEvent};
pub use orchestrator::TaskManager;
