//! Keystone v3 token session.
//!
//! A [`Session`] holds the current scoped token and its service catalog and
//! re-issues the token shortly before it expires or when a service rejects it.

use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use error_stack::Report;
use error_stack::ResultExt;
use serde_json::json;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;

use super::credentials::AuthMethod;
use super::credentials::AuthOptions;
use super::credentials::ProjectScope;
use super::types::CatalogEntry;
use super::types::TokenResponse;
use crate::domain::errors::CloudError;

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Tokens closer to expiry than this are re-issued before use.
const REFRESH_MARGIN_MINUTES: i64 = 5;

#[derive(Debug, Clone)]
pub struct Token {
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub catalog: Vec<CatalogEntry>,
}

impl Token {
    pub fn expires_soon(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now <= TimeDelta::minutes(REFRESH_MARGIN_MINUTES)
    }

    /// URL of the first catalog endpoint of `service_type` on `interface`.
    pub fn endpoint(
        &self,
        service_type: &str,
        interface: &str,
        region: Option<&str>,
    ) -> Option<&str> {
        self.catalog
            .iter()
            .filter(|entry| entry.service_type == service_type)
            .flat_map(|entry| entry.endpoints.iter())
            .find(|ep| ep.interface == interface && region.map_or(true, |r| ep.in_region(r)))
            .map(|ep| ep.url.as_str())
    }
}

/// `<auth_url>/v3/auth/tokens`, tolerating an auth URL that already names v3.
pub fn tokens_url(auth_url: &str) -> String {
    let base = auth_url.trim_end_matches('/');
    if base.ends_with("/v3") {
        format!("{base}/auth/tokens")
    } else {
        format!("{base}/v3/auth/tokens")
    }
}

fn auth_request(options: &AuthOptions) -> Value {
    let identity = match &options.method {
        AuthMethod::Password {
            username,
            password,
            user_domain_name,
        } => json!({
            "methods": ["password"],
            "password": {
                "user": {
                    "name": username,
                    "domain": { "name": user_domain_name },
                    "password": password,
                }
            }
        }),
        AuthMethod::ApplicationCredential { id, secret } => json!({
            "methods": ["application_credential"],
            "application_credential": { "id": id, "secret": secret }
        }),
    };

    let mut auth = json!({ "identity": identity });
    match &options.project {
        Some(ProjectScope::Id(id)) => {
            auth["scope"] = json!({ "project": { "id": id } });
        }
        Some(ProjectScope::Name { name, domain_name }) => {
            auth["scope"] = json!({
                "project": { "name": name, "domain": { "name": domain_name } }
            });
        }
        None => {}
    }
    json!({ "auth": auth })
}

async fn issue_token(
    http: &reqwest::Client,
    options: &AuthOptions,
) -> Result<Token, Report<CloudError>> {
    let url = tokens_url(&options.auth_url);
    let response = http
        .post(&url)
        .json(&auth_request(options))
        .send()
        .await
        .change_context_lazy(|| CloudError::Request { url: url.clone() })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Report::new(CloudError::Authentication {
            message: format!("keystone answered {status}"),
        })
        .attach_printable(body));
    }

    let value = response
        .headers()
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            Report::new(CloudError::Authentication {
                message: format!("response has no {SUBJECT_TOKEN_HEADER} header"),
            })
        })?;

    let body: TokenResponse = response
        .json()
        .await
        .change_context_lazy(|| CloudError::Decode { url: url.clone() })?;

    debug!("Issued token valid until {}", body.token.expires_at);
    Ok(Token {
        value,
        expires_at: body.token.expires_at,
        catalog: body.token.catalog,
    })
}

pub struct Session {
    http: reqwest::Client,
    options: AuthOptions,
    token: Mutex<Token>,
}

impl Session {
    /// Issue the first token. Fails if Keystone rejects the credentials.
    pub async fn authenticate(
        http: reqwest::Client,
        options: AuthOptions,
    ) -> Result<Self, Report<CloudError>> {
        let token = issue_token(&http, &options).await?;
        info!("Authenticated against {}", options.auth_url);
        Ok(Self {
            http,
            options,
            token: Mutex::new(token),
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// A token valid for at least the refresh margin.
    pub async fn token(&self) -> Result<String, Report<CloudError>> {
        let mut current = self.token.lock().await;
        if current.expires_soon(Utc::now()) {
            debug!("Token expires at {}, re-issuing", current.expires_at);
            *current = issue_token(&self.http, &self.options).await?;
        }
        Ok(current.value.clone())
    }

    /// Replace a token a service rejected. A token already replaced by a
    /// concurrent caller is reused.
    pub async fn reauthenticate(&self, rejected: &str) -> Result<String, Report<CloudError>> {
        let mut current = self.token.lock().await;
        if current.value == rejected {
            *current = issue_token(&self.http, &self.options).await?;
        }
        Ok(current.value.clone())
    }

    /// Catalog URL of `service_type` for the configured interface and region.
    pub async fn endpoint(&self, service_type: &str) -> Result<String, Report<CloudError>> {
        let current = self.token.lock().await;
        current
            .endpoint(
                service_type,
                &self.options.interface,
                self.options.region.as_deref(),
            )
            .map(str::to_string)
            .ok_or_else(|| {
                Report::new(CloudError::EndpointNotFound {
                    service_type: service_type.to_string(),
                    interface: self.options.interface.clone(),
                })
            })
    }
}
