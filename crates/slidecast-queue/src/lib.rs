//! In-process job queue.
//!
//! This crate provides:
//! - FIFO hand-off of job ids from submission to workers
//! - Duplicate suppression for ids that are still waiting
//! - Optional capacity bound and graceful close

pub mod error;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use queue::{JobQueue, QueueConfig};
