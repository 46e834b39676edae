//! Capability traits for the external collaborators of the reconciliation core.

use error_stack::Report;

use super::errors::CloudError;
use super::errors::InstanceError;
use super::errors::NamespaceError;
use super::types::InjectorPort;
use super::types::PortFilter;
use super::types::PortSpec;
use super::types::Subnet;
use super::types::TaggedNetwork;

/// Cloud networking API: list/create/delete against networks and ports.
///
/// Listing methods return every page.
#[async_trait::async_trait]
pub trait NetworkApi: Send + Sync {
    /// List networks carrying `tag` (server-side filter).
    async fn list_tagged_networks(&self, tag: &str)
        -> Result<Vec<TaggedNetwork>, Report<CloudError>>;

    async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<InjectorPort>, Report<CloudError>>;

    async fn create_port(&self, spec: &PortSpec) -> Result<InjectorPort, Report<CloudError>>;

    /// Delete a port. Deleting a port that no longer exists succeeds.
    async fn delete_port(&self, port_id: &str) -> Result<(), Report<CloudError>>;

    async fn get_subnet(&self, subnet_id: &str) -> Result<Subnet, Report<CloudError>>;
}

/// Live handle to an OS network namespace. Released on drop.
pub trait NamespaceHandle: Send + Sync {
    fn name(&self) -> &str;

    fn is_active(&self) -> bool;
}

/// OS network namespace primitive.
#[async_trait::async_trait]
pub trait NamespaceOps: Send + Sync {
    type Handle: NamespaceHandle;

    /// Create the namespace for the port's network if needed and return a
    /// handle bound to the port's address. Does not activate it.
    async fn ensure(&self, port: &InjectorPort) -> Result<Self::Handle, Report<NamespaceError>>;

    /// Bring the namespace's network-side configuration up.
    async fn activate(&self, handle: &mut Self::Handle) -> Result<(), Report<NamespaceError>>;

    async fn deactivate(&self, handle: &mut Self::Handle) -> Result<(), Report<NamespaceError>>;

    /// Remove the namespace of a network. Succeeds if it does not exist.
    async fn destroy(&self, network_id: &str) -> Result<(), Report<NamespaceError>>;
}

/// Supervisor of load-balancer instances, one per network.
#[async_trait::async_trait]
pub trait InstanceSupervisor: Send + Sync {
    /// Start the instance of `network_id` inside `namespace`.
    async fn start(&self, network_id: &str, namespace: &str) -> Result<(), Report<InstanceError>>;

    async fn stop(&self, network_id: &str) -> Result<(), Report<InstanceError>>;

    /// Collect statistics of the given instances. Failures are logged.
    ///
    /// Returns the networks whose instance has exited; the supervisor forgets
    /// those so they can be started again.
    async fn collect_stats(&self, network_ids: &[String]) -> Vec<String>;
}
