//! HTTP surface of the controller
//!
//! - `GET /metrics` - Prometheus text exposition of controller and HAProxy metrics

pub mod errors;
pub mod handlers;
pub mod server;

pub use errors::ApiError;
pub use server::MetricsServer;
