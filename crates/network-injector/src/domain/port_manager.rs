//! Find-or-create handling of the single injector port per network.

use std::sync::Arc;

use error_stack::Report;
use error_stack::ResultExt;
use tracing::info;

use super::device_owner::device_owner;
use super::errors::PortError;
use super::traits::NetworkApi;
use super::types::InjectorPort;
use super::types::PortFilter;
use super::types::PortSpec;
use super::types::TaggedNetwork;

/// Device id stamped on every injector port.
pub const INJECTOR_DEVICE_ID: &str = "network-injector";

/// Static attributes of the ports this controller creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    pub network_tag: String,
    pub host_id: String,
    pub dns_name: String,
}

impl PortSettings {
    pub fn device_owner(&self) -> String {
        device_owner(&self.network_tag)
    }
}

pub struct PortManager<N> {
    api: Arc<N>,
    settings: PortSettings,
}

impl<N> PortManager<N> {
    pub fn new(api: Arc<N>, settings: PortSettings) -> Self {
        Self { api, settings }
    }

    pub fn settings(&self) -> &PortSettings {
        &self.settings
    }

    fn spec_for(&self, network: &TaggedNetwork) -> PortSpec {
        PortSpec {
            name: format!("{} injection port", self.settings.network_tag),
            network_id: network.id.clone(),
            tenant_id: network.tenant_id.clone(),
            device_owner: self.settings.device_owner(),
            device_id: INJECTOR_DEVICE_ID.to_string(),
            host_id: self.settings.host_id.clone(),
            dns_name: self.settings.dns_name.clone(),
        }
    }
}

impl<N> PortManager<N>
where
    N: NetworkApi,
{
    /// All ports on the network carrying the device owner.
    pub async fn list_injector_ports(
        &self,
        network_id: &str,
    ) -> Result<Vec<InjectorPort>, Report<PortError>> {
        let filter = PortFilter {
            network_id: Some(network_id.to_string()),
            device_owner: self.settings.device_owner(),
        };
        self.api
            .list_ports(&filter)
            .await
            .change_context(PortError::Lookup {
                network_id: network_id.to_string(),
            })
    }

    /// The injector port of a network, if any.
    ///
    /// # Errors
    ///
    /// - [`PortError::Lookup`] if listing fails
    /// - [`PortError::Ambiguous`] if more than one port carries the device owner
    pub async fn find_injector_port(
        &self,
        network_id: &str,
    ) -> Result<Option<InjectorPort>, Report<PortError>> {
        let mut ports = self.list_injector_ports(network_id).await?;
        match ports.len() {
            0 => Ok(None),
            1 => Ok(ports.pop()),
            _ => Err(Report::new(PortError::Ambiguous {
                network_id: network_id.to_string(),
                port_ids: ports.into_iter().map(|p| p.id).collect(),
            })),
        }
    }

    /// Reuse the network's injector port or create it.
    pub async fn ensure_port(
        &self,
        network: &TaggedNetwork,
    ) -> Result<InjectorPort, Report<PortError>> {
        if let Some(port) = self.find_injector_port(&network.id).await? {
            return Ok(port);
        }

        info!("Creating port for network {} ({})", network.name, network.id);
        let port = self
            .api
            .create_port(&self.spec_for(network))
            .await
            .change_context(PortError::Create {
                network_id: network.id.clone(),
            })?;
        info!("Port '{}' created", port.id);
        Ok(port)
    }

    pub async fn delete_port(&self, port: &InjectorPort) -> Result<(), Report<PortError>> {
        self.api
            .delete_port(&port.id)
            .await
            .change_context(PortError::Delete {
                port_id: port.id.clone(),
            })?;
        info!("Port '{}' of network {} deleted", port.id, port.network_id);
        Ok(())
    }
}
