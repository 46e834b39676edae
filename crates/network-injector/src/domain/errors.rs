//! Error contexts for the reconciliation core and its collaborators.
//!
//! Each layer reports failures as an `error_stack::Report` of its own context
//! and changes context at the boundary to the layer above.

use core::error::Error;

/// Failures talking to the cloud networking API.
#[derive(Debug, derive_more::Display)]
pub enum CloudError {
    #[display("invalid cloud configuration: {message}")]
    Configuration { message: String },
    #[display("authentication failed: {message}")]
    Authentication { message: String },
    #[display("service catalog has no {interface} endpoint for '{service_type}'")]
    EndpointNotFound {
        service_type: String,
        interface: String,
    },
    #[display("request to {url} failed")]
    Request { url: String },
    #[display("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[display("failed to decode response from {url}")]
    Decode { url: String },
}

impl Error for CloudError {}

/// Failures resolving or changing the injector port of a network.
#[derive(Debug, derive_more::Display)]
pub enum PortError {
    #[display("failed to list injector ports of network {network_id}")]
    Lookup { network_id: String },
    #[display("network {network_id} has {} injector ports: {port_ids:?}", port_ids.len())]
    Ambiguous {
        network_id: String,
        port_ids: Vec<String>,
    },
    #[display("failed to create injector port on network {network_id}")]
    Create { network_id: String },
    #[display("failed to delete injector port {port_id}")]
    Delete { port_id: String },
}

impl Error for PortError {}

/// Failures of the OS network namespace primitive.
#[derive(Debug, derive_more::Display)]
pub enum NamespaceError {
    #[display("failed to prepare namespace {name}")]
    Setup { name: String },
    #[display("failed to activate namespace {name}")]
    Activate { name: String },
    #[display("failed to deactivate namespace {name}")]
    Deactivate { name: String },
    #[display("failed to destroy namespace {name}")]
    Destroy { name: String },
    #[display("command `{command}` failed: {message}")]
    Command { command: String, message: String },
}

impl Error for NamespaceError {}

/// Failures of the load-balancer instance supervisor.
#[derive(Debug, derive_more::Display)]
pub enum InstanceError {
    #[display("instance for network {network_id} is already running")]
    AlreadyRunning { network_id: String },
    #[display("no instance running for network {network_id}")]
    NotRunning { network_id: String },
    #[display("failed to start instance for network {network_id}")]
    Start { network_id: String },
    #[display("failed to stop instance for network {network_id}")]
    Stop { network_id: String },
    #[display("failed to query statistics of network {network_id}")]
    Stats { network_id: String },
}

impl Error for InstanceError {}

/// Failures of one network's enable or disable sequence.
#[derive(Debug, derive_more::Display)]
pub enum ActivationError {
    #[display("port handling failed for network {network_id}")]
    Port { network_id: String },
    #[display("namespace handling failed for network {network_id}")]
    Namespace { network_id: String },
    #[display("instance handling failed for network {network_id}")]
    Instance { network_id: String },
}

impl Error for ActivationError {}

/// Failures that abort a whole reconciliation cycle.
#[derive(Debug, derive_more::Display)]
pub enum ReconcileError {
    #[display("failed to list networks tagged '{tag}'")]
    ListNetworks { tag: String },
    #[display("failed to list injector ports for recovery")]
    Recovery,
}

impl Error for ReconcileError {}
