//! Enable and disable sequences around one network's load-balancer instance.
//!
//! Enable: ensure port, acquire namespace handle, activate, start, deactivate.
//! Disable: stop instance, destroy namespace, delete port.

use std::sync::Arc;

use error_stack::Report;
use error_stack::ResultExt;
use tracing::debug;
use tracing::info;

use super::errors::ActivationError;
use super::port_manager::PortManager;
use super::traits::InstanceSupervisor;
use super::traits::NamespaceHandle;
use super::traits::NamespaceOps;
use super::traits::NetworkApi;
use super::types::InstanceRegistry;
use super::types::TaggedNetwork;

/// Result of a successful enable sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableOutcome {
    Started,
    AlreadyRunning,
}

pub struct Activator<N, S, I> {
    ports: PortManager<N>,
    namespaces: Arc<S>,
    supervisor: Arc<I>,
}

impl<N, S, I> Activator<N, S, I>
where
    N: NetworkApi,
    S: NamespaceOps,
    I: InstanceSupervisor,
{
    pub fn new(ports: PortManager<N>, namespaces: Arc<S>, supervisor: Arc<I>) -> Self {
        Self {
            ports,
            namespaces,
            supervisor,
        }
    }

    pub fn ports(&self) -> &PortManager<N> {
        &self.ports
    }

    pub fn namespaces(&self) -> &S {
        &self.namespaces
    }

    pub fn supervisor(&self) -> &I {
        &self.supervisor
    }

    /// Make sure the network has a port, a namespace and a running instance.
    ///
    /// Safe to call every cycle: once the instance is recorded as running only
    /// the existence checks are repeated. Completed steps are not rolled back
    /// on failure; the namespace handle is always released.
    pub async fn enable_network(
        &self,
        network: &TaggedNetwork,
        registry: &mut InstanceRegistry,
    ) -> Result<EnableOutcome, Report<ActivationError>> {
        let port = self
            .ports
            .ensure_port(network)
            .await
            .change_context(ActivationError::Port {
                network_id: network.id.clone(),
            })?;

        let namespace_failed = || ActivationError::Namespace {
            network_id: network.id.clone(),
        };

        let mut handle = self
            .namespaces
            .ensure(&port)
            .await
            .change_context_lazy(namespace_failed)?;

        if registry.is_running(&port.network_id) {
            debug!("Instance for network {} already running", network.id);
            return Ok(EnableOutcome::AlreadyRunning);
        }

        self.namespaces
            .activate(&mut handle)
            .await
            .change_context_lazy(namespace_failed)?;

        self.supervisor
            .start(&port.network_id, handle.name())
            .await
            .change_context(ActivationError::Instance {
                network_id: network.id.clone(),
            })?;
        registry.mark_running(&port.network_id);
        info!(
            "Instance for network {} ({}) started in namespace {}",
            network.name,
            network.id,
            handle.name()
        );

        self.namespaces
            .deactivate(&mut handle)
            .await
            .change_context_lazy(namespace_failed)?;

        Ok(EnableOutcome::Started)
    }

    /// Tear down instance, namespace and port of a network.
    ///
    /// The first failing step aborts the remaining ones.
    pub async fn disable_network(
        &self,
        network_id: &str,
        registry: &mut InstanceRegistry,
    ) -> Result<(), Report<ActivationError>> {
        info!("Disabling network {network_id}");
        let port_failed = || ActivationError::Port {
            network_id: network_id.to_string(),
        };

        // every matching port is removed so a duplicate cannot outlive the network
        let ports = self
            .ports
            .list_injector_ports(network_id)
            .await
            .change_context_lazy(port_failed)?;

        if registry.is_running(network_id) {
            self.supervisor
                .stop(network_id)
                .await
                .change_context(ActivationError::Instance {
                    network_id: network_id.to_string(),
                })?;
            registry.mark_stopped(network_id);
        }

        self.namespaces
            .destroy(network_id)
            .await
            .change_context(ActivationError::Namespace {
                network_id: network_id.to_string(),
            })?;

        for port in &ports {
            self.ports
                .delete_port(port)
                .await
                .change_context_lazy(port_failed)?;
        }

        Ok(())
    }
}
