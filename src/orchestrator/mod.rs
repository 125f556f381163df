//! Application-level orchestration utilities.
//!
//! This module owns operation lifecycle control (single active operation,
//! event routing) and post-run processing for presentation layers. The CLI
//! calls into this module to keep responsibilities separated.

mod controller;
mod post_process;

pub use controller::{OperationHandle, TaskManager};
pub use post_process::{process_run_completion, OperationReport};
