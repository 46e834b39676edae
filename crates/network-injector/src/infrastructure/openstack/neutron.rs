//! Neutron v2.0 client implementing [`NetworkApi`].

use std::collections::HashSet;
use std::sync::Arc;

use error_stack::Report;
use error_stack::ResultExt;
use reqwest::header::ACCEPT;
use reqwest::Method;
use reqwest::Response;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use tracing::warn;
use url::Url;

use super::keystone::Session;
use super::types::CreatePortRequest;
use super::types::Link;
use super::types::NetworkBody;
use super::types::PortBody;
use super::types::PortEnvelope;
use super::types::SubnetEnvelope;
use crate::domain::errors::CloudError;
use crate::domain::traits::NetworkApi;
use crate::domain::types::InjectorPort;
use crate::domain::types::PortFilter;
use crate::domain::types::PortSpec;
use crate::domain::types::Subnet;
use crate::domain::types::TaggedNetwork;

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Base URL ending in `v2.0/`, whether or not the catalog URL names the version.
pub fn api_base(endpoint: &str) -> Result<Url, Report<CloudError>> {
    let trimmed = endpoint.trim_end_matches('/');
    let base = if trimmed.ends_with("/v2.0") {
        format!("{trimmed}/")
    } else {
        format!("{trimmed}/v2.0/")
    };
    Url::parse(&base).change_context_lazy(|| CloudError::Configuration {
        message: format!("invalid network endpoint '{endpoint}'"),
    })
}

pub struct NeutronClient {
    session: Arc<Session>,
    base: Url,
}

impl NeutronClient {
    /// Client for the network endpoint of the session's catalog.
    pub async fn new(session: Arc<Session>) -> Result<Self, Report<CloudError>> {
        let endpoint = session.endpoint("network").await?;
        Self::with_endpoint(session, &endpoint)
    }

    pub fn with_endpoint(session: Arc<Session>, endpoint: &str) -> Result<Self, Report<CloudError>> {
        let base = api_base(endpoint)?;
        debug!("Using network endpoint {base}");
        Ok(Self { session, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, Report<CloudError>> {
        self.base
            .join(path)
            .change_context_lazy(|| CloudError::Configuration {
                message: format!("invalid resource path '{path}'"),
            })
    }

    async fn request(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
        token: &str,
    ) -> Result<Response, Report<CloudError>> {
        let mut builder = self
            .session
            .http()
            .request(method, url.clone())
            .header(AUTH_TOKEN_HEADER, token)
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
            .send()
            .await
            .change_context_lazy(|| CloudError::Request {
                url: url.to_string(),
            })
    }

    /// Send a request, re-authenticating once if the token is rejected.
    async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<Response, Report<CloudError>> {
        let token = self.session.token().await?;
        let response = self.request(method.clone(), url, body, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("Token rejected by {url}, re-authenticating");
        let token = self.session.reauthenticate(&token).await?;
        self.request(method, url, body, &token).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, Report<CloudError>> {
        let response = ensure_success(self.send(Method::GET, url, None).await?).await?;
        response
            .json()
            .await
            .change_context_lazy(|| CloudError::Decode {
                url: url.to_string(),
            })
    }

    /// Fetch every page of a collection by following its `next` links.
    async fn list_all<T: DeserializeOwned>(
        &self,
        first: Url,
        collection: &str,
    ) -> Result<Vec<T>, Report<CloudError>> {
        let links_key = format!("{collection}_links");
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            visited.insert(url.clone());
            let decode_failed = || CloudError::Decode {
                url: url.to_string(),
            };
            let mut page: Value = self.get_json(&url).await?;

            let collection_value = page.get_mut(collection).map(Value::take).unwrap_or_default();
            let page_items: Vec<T> = serde_json::from_value(collection_value)
                .change_context_lazy(decode_failed)
                .attach_printable_lazy(|| format!("collection '{collection}'"))?;
            items.extend(page_items);

            let links: Vec<Link> = match page.get_mut(&links_key) {
                Some(links) => {
                    serde_json::from_value(links.take()).change_context_lazy(decode_failed)?
                }
                None => Vec::new(),
            };
            next = match links.into_iter().find(|link| link.rel == "next") {
                Some(link) => {
                    let href = Url::parse(&link.href).change_context_lazy(decode_failed)?;
                    if visited.contains(&href) {
                        warn!("Stopping pagination of {collection}: {href} was already fetched");
                        None
                    } else {
                        Some(href)
                    }
                }
                None => None,
            };
        }

        Ok(items)
    }
}

async fn ensure_success(response: Response) -> Result<Response, Report<CloudError>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(Report::new(CloudError::Status {
        status: status.as_u16(),
        url,
    })
    .attach_printable(body))
}

#[async_trait::async_trait]
impl NetworkApi for NeutronClient {
    async fn list_tagged_networks(
        &self,
        tag: &str,
    ) -> Result<Vec<TaggedNetwork>, Report<CloudError>> {
        let mut url = self.url("networks")?;
        url.query_pairs_mut().append_pair("tags", tag);
        let networks: Vec<NetworkBody> = self.list_all(url, "networks").await?;
        Ok(networks.into_iter().map(TaggedNetwork::from).collect())
    }

    async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<InjectorPort>, Report<CloudError>> {
        let mut url = self.url("ports")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("device_owner", &filter.device_owner);
            if let Some(network_id) = &filter.network_id {
                query.append_pair("network_id", network_id);
            }
        }
        let ports: Vec<PortBody> = self.list_all(url, "ports").await?;
        Ok(ports.into_iter().map(InjectorPort::from).collect())
    }

    async fn create_port(&self, spec: &PortSpec) -> Result<InjectorPort, Report<CloudError>> {
        let url = self.url("ports")?;
        let body = serde_json::to_value(CreatePortRequest::from(spec)).change_context_lazy(|| {
            CloudError::Request {
                url: url.to_string(),
            }
        })?;

        let response = ensure_success(self.send(Method::POST, &url, Some(&body)).await?).await?;
        let envelope: PortEnvelope =
            response
                .json()
                .await
                .change_context_lazy(|| CloudError::Decode {
                    url: url.to_string(),
                })?;
        Ok(envelope.port.into())
    }

    async fn delete_port(&self, port_id: &str) -> Result<(), Report<CloudError>> {
        let url = self.url(&format!("ports/{port_id}"))?;
        let response = self.send(Method::DELETE, &url, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Port {port_id} already gone");
            return Ok(());
        }
        ensure_success(response).await?;
        Ok(())
    }

    async fn get_subnet(&self, subnet_id: &str) -> Result<Subnet, Report<CloudError>> {
        let url = self.url(&format!("subnets/{subnet_id}"))?;
        let envelope: SubnetEnvelope = self.get_json(&url).await?;
        Ok(envelope.subnet.into())
    }
}
