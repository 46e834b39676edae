//! Wire types of the Keystone v3 and Neutron v2.0 APIs.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::domain::types::FixedIp;
use crate::domain::types::InjectorPort;
use crate::domain::types::PortSpec;
use crate::domain::types::Subnet;
use crate::domain::types::TaggedNetwork;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: TokenBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenBody {
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEndpoint {
    pub interface: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    pub url: String,
}

impl CatalogEndpoint {
    pub fn in_region(&self, region: &str) -> bool {
        self.region.as_deref() == Some(region) || self.region_id.as_deref() == Some(region)
    }
}

/// Pagination link of a Neutron collection.
#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkBody {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<NetworkBody> for TaggedNetwork {
    fn from(body: NetworkBody) -> Self {
        Self {
            id: body.id,
            name: body.name.unwrap_or_default(),
            tenant_id: body.tenant_id.or(body.project_id).unwrap_or_default(),
            tags: body.tags,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedIpBody {
    pub subnet_id: String,
    pub ip_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortBody {
    pub id: String,
    pub network_id: String,
    #[serde(default)]
    pub device_owner: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(rename = "binding:host_id", default)]
    pub host_id: Option<String>,
    #[serde(default)]
    pub dns_name: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIpBody>,
}

impl From<PortBody> for InjectorPort {
    fn from(body: PortBody) -> Self {
        Self {
            id: body.id,
            network_id: body.network_id,
            device_owner: body.device_owner.unwrap_or_default(),
            device_id: body.device_id.unwrap_or_default(),
            host_id: body.host_id.unwrap_or_default(),
            dns_name: body.dns_name.unwrap_or_default(),
            tenant_id: body.tenant_id.or(body.project_id).unwrap_or_default(),
            mac_address: body.mac_address.unwrap_or_default(),
            fixed_ips: body
                .fixed_ips
                .into_iter()
                .map(|ip| FixedIp {
                    subnet_id: ip.subnet_id,
                    ip_address: ip.ip_address,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortEnvelope {
    pub port: PortBody,
}

/// Body of `POST /v2.0/ports`. Empty optional attributes are left out.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePortRequest<'a> {
    pub port: CreatePort<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePort<'a> {
    pub name: &'a str,
    pub network_id: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub tenant_id: &'a str,
    pub device_owner: &'a str,
    pub device_id: &'a str,
    #[serde(rename = "binding:host_id", skip_serializing_if = "str::is_empty")]
    pub host_id: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub dns_name: &'a str,
}

impl<'a> From<&'a PortSpec> for CreatePortRequest<'a> {
    fn from(spec: &'a PortSpec) -> Self {
        Self {
            port: CreatePort {
                name: &spec.name,
                network_id: &spec.network_id,
                tenant_id: &spec.tenant_id,
                device_owner: &spec.device_owner,
                device_id: &spec.device_id,
                host_id: &spec.host_id,
                dns_name: &spec.dns_name,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubnetBody {
    pub id: String,
    pub cidr: String,
    #[serde(default)]
    pub gateway_ip: Option<String>,
}

impl From<SubnetBody> for Subnet {
    fn from(body: SubnetBody) -> Self {
        Self {
            id: body.id,
            cidr: body.cidr,
            gateway_ip: body.gateway_ip.filter(|gw| !gw.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubnetEnvelope {
    pub subnet: SubnetBody,
}
