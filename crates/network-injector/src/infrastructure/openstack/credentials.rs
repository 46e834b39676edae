//! Resolution of OpenStack credentials from the process environment.
//!
//! `OS_CLOUD` selects an entry of a `clouds.yaml` file; without it the
//! classic `OS_*` variables are used.

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;

use crate::domain::errors::CloudError;

const DEFAULT_DOMAIN: &str = "Default";
const DEFAULT_INTERFACE: &str = "public";

#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Password {
        username: String,
        password: String,
        user_domain_name: String,
    },
    ApplicationCredential {
        id: String,
        secret: String,
    },
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password {
                username,
                user_domain_name,
                ..
            } => f
                .debug_struct("Password")
                .field("username", username)
                .field("user_domain_name", user_domain_name)
                .finish_non_exhaustive(),
            Self::ApplicationCredential { id, .. } => f
                .debug_struct("ApplicationCredential")
                .field("id", id)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectScope {
    Id(String),
    Name { name: String, domain_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOptions {
    pub auth_url: String,
    pub method: AuthMethod,
    /// Application credentials carry their own scope.
    pub project: Option<ProjectScope>,
    pub region: Option<String>,
    pub interface: String,
}

#[derive(Debug, Deserialize)]
struct CloudsFile {
    #[serde(default)]
    clouds: HashMap<String, CloudEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CloudEntry {
    auth: CloudAuth,
    region_name: Option<String>,
    interface: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CloudAuth {
    auth_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    user_domain_name: Option<String>,
    project_id: Option<String>,
    project_name: Option<String>,
    project_domain_name: Option<String>,
    application_credential_id: Option<String>,
    application_credential_secret: Option<String>,
}

fn config_error(message: impl Into<String>) -> Report<CloudError> {
    Report::new(CloudError::Configuration {
        message: message.into(),
    })
}

/// `publicURL` style endpoint types are accepted as well.
fn normalize_interface(interface: Option<String>) -> String {
    interface
        .filter(|i| !i.is_empty())
        .map(|i| i.trim_end_matches("URL").to_string())
        .unwrap_or_else(|| DEFAULT_INTERFACE.to_string())
}

/// Locations searched for `clouds.yaml`, most specific first.
pub fn clouds_yaml_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(file) = env::var("OS_CLIENT_CONFIG_FILE") {
        paths.push(PathBuf::from(file));
    }
    paths.push(PathBuf::from("clouds.yaml"));
    if let Ok(home) = env::var("HOME") {
        paths.push(Path::new(&home).join(".config/openstack/clouds.yaml"));
    }
    paths.push(PathBuf::from("/etc/openstack/clouds.yaml"));
    paths
}

impl AuthOptions {
    /// Resolve credentials from the process environment.
    pub fn from_env() -> Result<Self, Report<CloudError>> {
        Self::resolve(|key| env::var(key).ok(), &clouds_yaml_search_paths())
    }

    /// Resolve credentials from `lookup` (an environment) and the given
    /// `clouds.yaml` candidates.
    pub fn resolve<F>(lookup: F, clouds_yaml: &[PathBuf]) -> Result<Self, Report<CloudError>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(cloud) = var("OS_CLOUD") {
            return Self::from_clouds_yaml(&cloud, clouds_yaml, var("OS_PASSWORD"));
        }

        let auth_url = var("OS_AUTH_URL").ok_or_else(|| config_error("OS_AUTH_URL is not set"))?;

        let (method, project) = match (
            var("OS_APPLICATION_CREDENTIAL_ID"),
            var("OS_APPLICATION_CREDENTIAL_SECRET"),
        ) {
            (Some(id), Some(secret)) => (AuthMethod::ApplicationCredential { id, secret }, None),
            _ => {
                let username =
                    var("OS_USERNAME").ok_or_else(|| config_error("OS_USERNAME is not set"))?;
                let password =
                    var("OS_PASSWORD").ok_or_else(|| config_error("OS_PASSWORD is not set"))?;
                let method = AuthMethod::Password {
                    username,
                    password,
                    user_domain_name: var("OS_USER_DOMAIN_NAME")
                        .unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
                };
                let project = match (
                    var("OS_PROJECT_ID").or_else(|| var("OS_TENANT_ID")),
                    var("OS_PROJECT_NAME").or_else(|| var("OS_TENANT_NAME")),
                ) {
                    (Some(id), _) => Some(ProjectScope::Id(id)),
                    (None, Some(name)) => Some(ProjectScope::Name {
                        name,
                        domain_name: var("OS_PROJECT_DOMAIN_NAME")
                            .unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
                    }),
                    (None, None) => None,
                };
                (method, project)
            }
        };

        Ok(Self {
            auth_url,
            method,
            project,
            region: var("OS_REGION_NAME"),
            interface: normalize_interface(var("OS_INTERFACE").or_else(|| var("OS_ENDPOINT_TYPE"))),
        })
    }

    fn from_clouds_yaml(
        cloud: &str,
        candidates: &[PathBuf],
        password_override: Option<String>,
    ) -> Result<Self, Report<CloudError>> {
        let path = candidates
            .iter()
            .find(|p| p.is_file())
            .ok_or_else(|| config_error(format!("OS_CLOUD={cloud} but no clouds.yaml found")))?;

        let content = std::fs::read_to_string(path)
            .change_context_lazy(|| CloudError::Configuration {
                message: format!("failed to read {}", path.display()),
            })?;
        let mut file: CloudsFile =
            serde_yaml::from_str(&content).change_context_lazy(|| CloudError::Configuration {
                message: format!("failed to parse {}", path.display()),
            })?;

        let entry = file.clouds.remove(cloud).ok_or_else(|| {
            config_error(format!("cloud '{cloud}' not found in {}", path.display()))
        })?;
        let auth = entry.auth;

        let auth_url = auth
            .auth_url
            .ok_or_else(|| config_error(format!("cloud '{cloud}' has no auth_url")))?;

        let (method, project) = match (
            auth.application_credential_id,
            auth.application_credential_secret,
        ) {
            (Some(id), Some(secret)) => (AuthMethod::ApplicationCredential { id, secret }, None),
            _ => {
                let username = auth
                    .username
                    .ok_or_else(|| config_error(format!("cloud '{cloud}' has no username")))?;
                let password = auth.password.or(password_override).ok_or_else(|| {
                    config_error(format!("cloud '{cloud}' has no password and OS_PASSWORD is not set"))
                })?;
                let method = AuthMethod::Password {
                    username,
                    password,
                    user_domain_name: auth
                        .user_domain_name
                        .unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
                };
                let project = match (auth.project_id, auth.project_name) {
                    (Some(id), _) => Some(ProjectScope::Id(id)),
                    (None, Some(name)) => Some(ProjectScope::Name {
                        name,
                        domain_name: auth
                            .project_domain_name
                            .unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
                    }),
                    (None, None) => None,
                };
                (method, project)
            }
        };

        Ok(Self {
            auth_url,
            method,
            project,
            region: entry.region_name,
            interface: normalize_interface(entry.interface),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use similar_asserts::assert_eq;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn password_credentials_from_env() {
        let options = AuthOptions::resolve(
            env_of(&[
                ("OS_AUTH_URL", "https://keystone:5000/v3"),
                ("OS_USERNAME", "injector"),
                ("OS_PASSWORD", "secret"),
                ("OS_PROJECT_NAME", "service"),
                ("OS_PROJECT_DOMAIN_NAME", "ccadmin"),
                ("OS_REGION_NAME", "eu-de-1"),
                ("OS_ENDPOINT_TYPE", "internalURL"),
            ]),
            &[],
        )
        .expect("should resolve credentials");

        assert_eq!(options.auth_url, "https://keystone:5000/v3");
        assert_eq!(
            options.method,
            AuthMethod::Password {
                username: "injector".to_string(),
                password: "secret".to_string(),
                user_domain_name: "Default".to_string(),
            }
        );
        assert_eq!(
            options.project,
            Some(ProjectScope::Name {
                name: "service".to_string(),
                domain_name: "ccadmin".to_string(),
            })
        );
        assert_eq!(options.region.as_deref(), Some("eu-de-1"));
        assert_eq!(options.interface, "internal");
    }

    #[test]
    fn application_credentials_take_precedence() {
        let options = AuthOptions::resolve(
            env_of(&[
                ("OS_AUTH_URL", "https://keystone:5000"),
                ("OS_APPLICATION_CREDENTIAL_ID", "app-id"),
                ("OS_APPLICATION_CREDENTIAL_SECRET", "app-secret"),
                ("OS_USERNAME", "ignored"),
            ]),
            &[],
        )
        .expect("should resolve credentials");

        assert_eq!(
            options.method,
            AuthMethod::ApplicationCredential {
                id: "app-id".to_string(),
                secret: "app-secret".to_string(),
            }
        );
        assert_eq!(options.project, None);
        assert_eq!(options.interface, "public");
    }

    #[test]
    fn missing_auth_url_is_a_configuration_error() {
        let err = AuthOptions::resolve(env_of(&[("OS_USERNAME", "injector")]), &[])
            .expect_err("should fail without OS_AUTH_URL");
        assert!(matches!(
            err.current_context(),
            CloudError::Configuration { .. }
        ));
    }

    #[test]
    fn clouds_yaml_entry_is_selected_by_os_cloud() {
        let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
        write!(
            file,
            r#"
clouds:
  other:
    auth:
      auth_url: https://other:5000/v3
  injector:
    region_name: qa-de-1
    interface: internal
    auth:
      auth_url: https://keystone:5000/v3
      username: injector
      user_domain_name: Default
      project_id: 0123456789abcdef
"#
        )
        .expect("should write clouds.yaml");

        let options = AuthOptions::resolve(
            env_of(&[("OS_CLOUD", "injector"), ("OS_PASSWORD", "from-env")]),
            &[PathBuf::from("/nonexistent/clouds.yaml"), file.path().to_path_buf()],
        )
        .expect("should resolve clouds.yaml entry");

        assert_eq!(options.auth_url, "https://keystone:5000/v3");
        assert_eq!(
            options.method,
            AuthMethod::Password {
                username: "injector".to_string(),
                password: "from-env".to_string(),
                user_domain_name: "Default".to_string(),
            }
        );
        assert_eq!(
            options.project,
            Some(ProjectScope::Id("0123456789abcdef".to_string()))
        );
        assert_eq!(options.region.as_deref(), Some("qa-de-1"));
        assert_eq!(options.interface, "internal");
    }

    #[test]
    fn unknown_cloud_is_reported() {
        let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
        write!(file, "clouds: {{}}\n").expect("should write clouds.yaml");

        let err = AuthOptions::resolve(
            env_of(&[("OS_CLOUD", "missing")]),
            &[file.path().to_path_buf()],
        )
        .expect_err("unknown cloud should fail");
        assert!(err.to_string().contains("cloud 'missing' not found"));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let method = AuthMethod::Password {
            username: "injector".to_string(),
            password: "hunter2".to_string(),
            user_domain_name: "Default".to_string(),
        };
        assert!(!format!("{method:?}").contains("hunter2"));
    }
}
