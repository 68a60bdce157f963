//! Slideshow job processing.
//!
//! This crate provides:
//! - The job orchestrator driving each job through its state machine
//! - Job submission (record, intake, enqueue)
//! - A bounded worker pool with per-job cancellation
//! - Startup recovery and graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod orchestrator;
pub mod service;

#[cfg(test)]
mod testing;

pub use config::WorkerConfig;
pub use error::{JobFailure, WorkerError, WorkerResult};
pub use executor::{CancelOutcome, WorkerPool};
pub use logging::JobLogger;
pub use orchestrator::{JobOutcome, Orchestrator};
pub use service::{JobService, SubmitOutcome};
