//! Reconciliation core.
//!
//! The controller keeps one traffic-injection endpoint per tagged network:
//! - [`port_manager::PortManager`] finds or creates the injector port
//! - [`activator::Activator`] drives the enable and disable sequences
//! - [`reconciler::Reconciler`] diffs tagged networks against running instances
//!
//! All external systems are reached through the capability traits in [`traits`].

pub mod activator;
pub mod device_owner;
pub mod errors;
#[cfg(test)]
pub(crate) mod mock;
pub mod port_manager;
pub mod reconciler;
pub mod traits;
pub mod types;

pub use activator::Activator;
pub use activator::EnableOutcome;
pub use device_owner::device_owner;
pub use port_manager::PortManager;
pub use port_manager::PortSettings;
pub use reconciler::Reconciler;
pub use reconciler::ScanReport;
