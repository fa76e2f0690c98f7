//! Application-level orchestration utilities.
//!
//! This module owns run lifecycle control (start/cancel/supersede) and post-run
//! processing such as saving to history and exports. CLI layers call into this module
//! to keep responsibilities separated.

mod controller;
mod post_process;

pub use controller::{RunController, RunHandle, DEFAULT_RUN_TIMEOUT};
pub use post_process::{process_run_completion, PostRunOptions, ProcessedRun};
