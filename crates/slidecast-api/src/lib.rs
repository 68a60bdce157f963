//! Axum HTTP API server.
//!
//! This crate provides:
//! - Multipart job submission, job polling and cancellation
//! - Download of finished slideshows with range support
//! - Security headers, request ids and request logging
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
