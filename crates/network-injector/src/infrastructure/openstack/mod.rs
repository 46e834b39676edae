//! OpenStack (Keystone v3, Neutron v2.0) client.

pub mod credentials;
pub mod keystone;
pub mod neutron;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;

pub use self::credentials::AuthOptions;
pub use self::keystone::Session;
pub use self::neutron::NeutronClient;
use crate::domain::errors::CloudError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticate with credentials from the environment and build a Neutron
/// client on the catalog's network endpoint.
pub async fn connect_from_env() -> Result<NeutronClient, Report<CloudError>> {
    let options = AuthOptions::from_env()?;
    let http = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .change_context(CloudError::Configuration {
            message: "failed to create HTTP client".into(),
        })?;
    let session = Arc::new(Session::authenticate(http, options).await?);
    NeutronClient::new(session).await
}
