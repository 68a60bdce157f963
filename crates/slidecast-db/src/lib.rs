//! Job persistence.
//!
//! This crate provides:
//! - The [`JobStore`] trait: create, read and status-transition job records
//! - [`InMemoryJobStore`] for tests and single-process runs
//! - [`SqliteJobStore`], a SQLite-backed store that bootstraps its schema
//! - Store operation metrics
//!
//! Every store validates status writes against the job state machine
//! atomically, so two writers racing from the same state never both win.

pub mod config;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod sqlite;
pub mod store;

pub use config::DbConfig;
pub use error::{DbError, DbResult};
pub use memory::InMemoryJobStore;
pub use sqlite::SqliteJobStore;
pub use store::{check_update, JobStore, StatusUpdate};
