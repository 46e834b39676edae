use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use thiserror::Error;

use crate::domain::PortSettings;
use crate::infrastructure::haproxy::HaproxySettings;

#[derive(Args, Debug, Clone)]
pub struct InjectorArgs {
    #[arg(
        long,
        env = "METRICS_BIND_ADDRESS",
        default_value = ":8080",
        help = "Address the /metrics endpoint binds to, e.g. :8080 or 127.0.0.1:9100"
    )]
    pub metrics_bind_address: String,

    #[arg(
        long,
        env = "INJECTOR_HOST",
        help = "Host id bound to created ports (defaults to the system hostname)"
    )]
    pub host: Option<String>,

    #[arg(
        long,
        env = "PROXY_PATH",
        value_hint = clap::ValueHint::FilePath,
        default_value = "/var/run/socat-proxy/proxy.sock",
        help = "Unix socket of the local proxy HAProxy forwards to"
    )]
    pub proxy_path: PathBuf,

    #[arg(
        long,
        env = "UPSTREAM_HOST",
        default_value = "localhost",
        help = "Host header sent upstream"
    )]
    pub upstream_host: String,

    #[arg(
        long,
        env = "INJECTOR_DNS",
        default_value = "",
        help = "DNS name assigned to created ports"
    )]
    pub injector_dns: String,

    #[arg(
        long,
        env = "NETWORK_TAG",
        help = "Neutron tag selecting the networks to inject into"
    )]
    pub network_tag: String,

    #[arg(
        long,
        env = "SCAN_INTERVAL",
        default_value_t = 60,
        help = "Seconds between reconciliation cycles"
    )]
    pub interval: u64,

    #[arg(
        long,
        env = "INJECTOR_RUN_DIR",
        value_hint = clap::ValueHint::DirPath,
        default_value = "/var/run/network-injector",
        help = "Directory for per-network HAProxy configs and stats sockets"
    )]
    pub run_dir: PathBuf,

    #[arg(
        long,
        env = "HAPROXY_BINARY",
        default_value = "haproxy",
        help = "HAProxy executable"
    )]
    pub haproxy_binary: PathBuf,

    #[arg(
        long,
        env = "INJECTOR_LISTEN_PORT",
        default_value_t = 80,
        help = "Port HAProxy listens on inside each namespace"
    )]
    pub listen_port: u16,

    #[arg(
        long,
        env = "INJECTOR_ONCE",
        help = "Run recovery and a single cycle, then exit"
    )]
    pub once: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("network tag must not be empty")]
    EmptyNetworkTag,
    #[error("scan interval must be greater than zero")]
    ZeroInterval,
    #[error("failed to determine hostname")]
    Hostname(#[source] std::io::Error),
    #[error("hostname {0:?} is not valid UTF-8")]
    HostnameEncoding(String),
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub metrics_bind_address: String,
    pub ports: PortSettings,
    pub haproxy: HaproxySettings,
    pub interval: Duration,
    pub once: bool,
}

/// `:8080` style addresses bind all interfaces.
pub fn normalize_bind_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    }
}

fn system_hostname() -> Result<String, ConfigError> {
    let name = hostname::get().map_err(ConfigError::Hostname)?;
    name.into_string()
        .map_err(|raw| ConfigError::HostnameEncoding(raw.to_string_lossy().into_owned()))
}

impl InjectorArgs {
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        if self.network_tag.trim().is_empty() {
            return Err(ConfigError::EmptyNetworkTag);
        }
        if self.interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        let host_id = match self.host.filter(|h| !h.is_empty()) {
            Some(host) => host,
            None => system_hostname()?,
        };

        Ok(Settings {
            metrics_bind_address: normalize_bind_address(&self.metrics_bind_address),
            ports: PortSettings {
                network_tag: self.network_tag,
                host_id,
                dns_name: self.injector_dns,
            },
            haproxy: HaproxySettings {
                run_dir: self.run_dir,
                haproxy_binary: self.haproxy_binary,
                ip_binary: PathBuf::from("ip"),
                proxy_path: self.proxy_path,
                upstream_host: self.upstream_host,
                listen_port: self.listen_port,
            },
            interval: Duration::from_secs(self.interval),
            once: self.once,
        })
    }
}
