//! Periodic desired/actual diff over tagged networks.

use std::collections::BTreeSet;
use std::sync::Arc;

use error_stack::Report;
use error_stack::ResultExt;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::activator::Activator;
use super::activator::EnableOutcome;
use super::errors::ReconcileError;
use super::traits::InstanceSupervisor;
use super::traits::NamespaceOps;
use super::traits::NetworkApi;
use super::types::InstanceRegistry;
use super::types::PortFilter;
use super::types::TaggedNetwork;

/// Which half of a scan a per-network failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Operation {
    #[display("enable")]
    Enable,
    #[display("disable")]
    Disable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkFailure {
    pub network_id: String,
    pub operation: Operation,
    pub message: String,
}

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Tagged networks found, in listing order.
    pub desired: Vec<String>,
    /// Networks whose instance was started during this scan.
    pub started: Vec<String>,
    /// Networks torn down during this scan.
    pub disabled: Vec<String>,
    pub failures: Vec<NetworkFailure>,
}

impl ScanReport {
    pub fn failure_count(&self, operation: Operation) -> usize {
        self.failures
            .iter()
            .filter(|f| f.operation == operation)
            .count()
    }
}

pub struct Reconciler<N, S, I> {
    api: Arc<N>,
    activator: Activator<N, S, I>,
    registry: InstanceRegistry,
    /// Networks with an injector port left behind by a previous process.
    orphans: BTreeSet<String>,
    network_tag: String,
}

impl<N, S, I> Reconciler<N, S, I>
where
    N: NetworkApi,
    S: NamespaceOps,
    I: InstanceSupervisor,
{
    pub fn new(api: Arc<N>, activator: Activator<N, S, I>) -> Self {
        let network_tag = activator.ports().settings().network_tag.clone();
        Self {
            api,
            activator,
            registry: InstanceRegistry::new(),
            orphans: BTreeSet::new(),
            network_tag,
        }
    }

    pub fn running(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn orphans(&self) -> &BTreeSet<String> {
        &self.orphans
    }

    /// Rebuild knowledge about endpoints created before a restart.
    ///
    /// Every network with an injector port gets its namespace destroyed, which
    /// also ends instances of the previous process, and is remembered as an
    /// orphan. The next scan re-enables or disables it. Returns the number of
    /// orphaned networks.
    pub async fn recover(&mut self) -> Result<usize, Report<ReconcileError>> {
        let filter = PortFilter {
            network_id: None,
            device_owner: self.activator.ports().settings().device_owner(),
        };
        let ports = self
            .api
            .list_ports(&filter)
            .await
            .change_context(ReconcileError::Recovery)?;

        let network_ids: BTreeSet<String> = ports.into_iter().map(|p| p.network_id).collect();
        for network_id in network_ids {
            if let Err(e) = self.activator.namespaces().destroy(&network_id).await {
                warn!("Failed to clear namespace of network {network_id}: {e:?}");
            }
            self.orphans.insert(network_id);
        }

        info!(
            "Recovered {} network(s) with existing injector ports",
            self.orphans.len()
        );
        Ok(self.orphans.len())
    }

    async fn list_desired(&self) -> Result<Vec<TaggedNetwork>, Report<ReconcileError>> {
        let networks = self
            .api
            .list_tagged_networks(&self.network_tag)
            .await
            .change_context(ReconcileError::ListNetworks {
                tag: self.network_tag.clone(),
            })?;

        // the server-side filter is re-checked
        Ok(networks
            .into_iter()
            .filter(|n| n.has_tag(&self.network_tag))
            .collect())
    }

    /// Run one reconciliation cycle.
    ///
    /// All tagged networks are enabled first, then every network with a
    /// running instance (or orphaned port) that is no longer tagged is
    /// disabled. A failure of one network never stops the others.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::ListNetworks`] if the tagged networks cannot be
    ///   listed; no network is touched in that case
    pub async fn scan(&mut self) -> Result<ScanReport, Report<ReconcileError>> {
        let desired = self.list_desired().await?;
        info!("Found {} tagged networks", desired.len());

        let mut report = ScanReport {
            desired: desired.iter().map(|n| n.id.clone()).collect(),
            ..Default::default()
        };

        for network in &desired {
            match self
                .activator
                .enable_network(network, &mut self.registry)
                .await
            {
                Ok(EnableOutcome::Started) => {
                    self.orphans.remove(&network.id);
                    report.started.push(network.id.clone());
                }
                Ok(EnableOutcome::AlreadyRunning) => {
                    self.orphans.remove(&network.id);
                }
                Err(e) => {
                    error!("Failed to enable network {}: {e:?}", network.id);
                    report.failures.push(NetworkFailure {
                        network_id: network.id.clone(),
                        operation: Operation::Enable,
                        message: e.to_string(),
                    });
                }
            }
        }

        let desired_ids: BTreeSet<&str> = report.desired.iter().map(String::as_str).collect();
        let stale: Vec<String> = self
            .registry
            .iter()
            .chain(self.orphans.iter())
            .filter(|id| !desired_ids.contains(id.as_str()))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        for network_id in stale {
            match self
                .activator
                .disable_network(&network_id, &mut self.registry)
                .await
            {
                Ok(()) => {
                    self.orphans.remove(&network_id);
                    report.disabled.push(network_id);
                }
                Err(e) => {
                    error!("Failed to disable network {network_id}: {e:?}");
                    report.failures.push(NetworkFailure {
                        network_id,
                        operation: Operation::Disable,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Forward a stats collection request for all running instances.
    ///
    /// Networks whose instance has exited leave the running set, so the next
    /// scan starts them again.
    pub async fn collect_stats(&mut self) {
        let network_ids = self.registry.network_ids();
        let exited = self.activator.supervisor().collect_stats(&network_ids).await;
        for network_id in exited {
            warn!("Instance of network {network_id} exited, restarting it on the next scan");
            self.registry.mark_stopped(&network_id);
        }
    }
}
