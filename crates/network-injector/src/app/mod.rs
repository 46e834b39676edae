//! Application module
//!
//! Wiring of the OpenStack client, namespace and HAProxy collaborators into
//! the reconciler, and the lifecycle of its background tasks.

pub mod builder;
pub mod core;
pub mod scheduler;
pub mod services;
pub mod tasks;

pub use builder::ApplicationBuilder;
pub use core::Application;
pub use scheduler::Scheduler;
pub use services::ApplicationServices;
