//! Data model shared by the reconciliation core and its collaborators.

use std::collections::BTreeSet;

/// A Neutron network carrying the configured tag. Snapshot of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedNetwork {
    pub id: String,
    pub name: String,
    pub tenant_id: String,
    pub tags: Vec<String>,
}

impl TaggedNetwork {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Address assigned to a port on one subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedIp {
    pub subnet_id: String,
    pub ip_address: String,
}

/// The port owned by this controller on a tagged network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectorPort {
    pub id: String,
    pub network_id: String,
    pub device_owner: String,
    pub device_id: String,
    pub host_id: String,
    pub dns_name: String,
    pub tenant_id: String,
    pub mac_address: String,
    pub fixed_ips: Vec<FixedIp>,
}

/// Attributes of a port to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub name: String,
    pub network_id: String,
    pub tenant_id: String,
    pub device_owner: String,
    pub device_id: String,
    pub host_id: String,
    pub dns_name: String,
}

/// Port listing filter. `network_id: None` lists across all networks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortFilter {
    pub network_id: Option<String>,
    pub device_owner: String,
}

/// Subnet details needed to configure an address inside a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    pub id: String,
    pub cidr: String,
    pub gateway_ip: Option<String>,
}

impl Subnet {
    /// Prefix length of the subnet CIDR, e.g. `24` for `10.0.0.0/24`.
    pub fn prefix_len(&self) -> Option<u8> {
        self.cidr.rsplit_once('/')?.1.parse().ok()
    }
}

/// Network ids with a running load-balancer instance.
///
/// This is the controller's only record of actual state between scans. It is
/// owned by the [`Reconciler`](super::Reconciler) and mutated only from the
/// scan that owns it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstanceRegistry {
    running: BTreeSet<String>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, network_id: &str) -> bool {
        self.running.contains(network_id)
    }

    /// Returns `false` if the network was already recorded.
    pub fn mark_running(&mut self, network_id: &str) -> bool {
        self.running.insert(network_id.to_string())
    }

    /// Returns `false` if the network was not recorded.
    pub fn mark_stopped(&mut self, network_id: &str) -> bool {
        self.running.remove(network_id)
    }

    pub fn network_ids(&self) -> Vec<String> {
        self.running.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.running.iter()
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }
}
