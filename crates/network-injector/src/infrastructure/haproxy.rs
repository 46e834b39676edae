//! HAProxy instances, one per network, spawned inside the network's namespace.
//!
//! Each instance listens on the injector port's address and forwards HTTP
//! to the local proxy socket with the `Host` header set to the upstream host.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::info;
use tracing::warn;

use super::metrics::Metrics;
use super::metrics::ProxyStats;
use crate::domain::errors::InstanceError;
use crate::domain::traits::InstanceSupervisor;

const CONFIG_FILE: &str = "haproxy.cfg";
const STATS_SOCKET: &str = "stats.sock";
const STATS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct HaproxySettings {
    /// Parent of the per-network directories holding config and stats socket.
    pub run_dir: PathBuf,
    pub haproxy_binary: PathBuf,
    pub ip_binary: PathBuf,
    /// Unix socket of the host-side proxy every instance forwards to.
    pub proxy_path: PathBuf,
    pub upstream_host: String,
    pub listen_port: u16,
}

pub fn render_config(settings: &HaproxySettings, network_id: &str, stats_socket: &Path) -> String {
    format!(
        "global
    maxconn 1024
    stats socket {stats} mode 600 level user

defaults
    mode http
    timeout connect 5s
    timeout client 30s
    timeout server 30s
    option http-server-close

frontend injector
    bind :{port}
    default_backend proxy

backend proxy
    http-request set-header Host {host}
    http-request set-header X-Neutron-Network-ID {network_id}
    server proxy unix@{proxy}
",
        stats = stats_socket.display(),
        port = settings.listen_port,
        host = settings.upstream_host,
        proxy = settings.proxy_path.display(),
    )
}

fn parse_counter(field: Option<&&str>) -> i64 {
    field.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Parse the CSV output of `show stat`.
///
/// Columns are located through the `# pxname,svname,...` header line.
/// Missing or empty counters read as zero.
pub fn parse_stats(csv: &str) -> Vec<ProxyStats> {
    let mut lines = csv.lines();
    let Some(header) = lines.find_map(|line| line.strip_prefix("# ")) else {
        return Vec::new();
    };
    let columns: Vec<&str> = header.split(',').collect();
    let column = |name: &str| columns.iter().position(|c| *c == name);
    let (Some(pxname), Some(svname)) = (column("pxname"), column("svname")) else {
        return Vec::new();
    };
    let (scur, bin, bout) = (column("scur"), column("bin"), column("bout"));

    lines
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').collect();
            Some(ProxyStats {
                proxy: fields.get(pxname)?.to_string(),
                server: fields.get(svname)?.to_string(),
                current_sessions: parse_counter(scur.and_then(|i| fields.get(i))),
                bytes_in: parse_counter(bin.and_then(|i| fields.get(i))),
                bytes_out: parse_counter(bout.and_then(|i| fields.get(i))),
            })
        })
        .collect()
}

async fn query_stats(socket: &Path) -> std::io::Result<String> {
    let mut stream = UnixStream::connect(socket).await?;
    stream.write_all(b"show stat\n").await?;
    let mut output = String::new();
    stream.read_to_string(&mut output).await?;
    Ok(output)
}

struct Instance {
    child: Child,
    directory: PathBuf,
    stats_socket: PathBuf,
}

pub struct HaproxySupervisor {
    settings: HaproxySettings,
    metrics: Arc<Metrics>,
    instances: Mutex<HashMap<String, Instance>>,
}

impl HaproxySupervisor {
    pub fn new(settings: HaproxySettings, metrics: Arc<Metrics>) -> Self {
        Self {
            settings,
            metrics,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &HaproxySettings {
        &self.settings
    }

    pub fn instance_dir(&self, network_id: &str) -> PathBuf {
        self.settings.run_dir.join(network_id)
    }

    /// Stop every supervised instance, used on controller shutdown.
    pub async fn stop_all(&self) {
        let network_ids: Vec<String> = self.instances.lock().await.keys().cloned().collect();
        for network_id in network_ids {
            if let Err(e) = self.stop(&network_id).await {
                warn!("Failed to stop haproxy of network {network_id}: {e:?}");
            }
        }
    }

    async fn stats_of(
        network_id: &str,
        instance: &Instance,
    ) -> Result<Vec<ProxyStats>, Report<InstanceError>> {
        let output = tokio::time::timeout(STATS_TIMEOUT, query_stats(&instance.stats_socket))
            .await
            .change_context_lazy(|| InstanceError::Stats {
                network_id: network_id.to_string(),
            })
            .attach_printable("stats socket timed out")?
            .change_context_lazy(|| InstanceError::Stats {
                network_id: network_id.to_string(),
            })
            .attach_printable_lazy(|| format!("socket {}", instance.stats_socket.display()))?;
        Ok(parse_stats(&output))
    }
}

#[async_trait::async_trait]
impl InstanceSupervisor for HaproxySupervisor {
    async fn start(&self, network_id: &str, namespace: &str) -> Result<(), Report<InstanceError>> {
        let mut instances = self.instances.lock().await;
        if instances.contains_key(network_id) {
            return Err(Report::new(InstanceError::AlreadyRunning {
                network_id: network_id.to_string(),
            }));
        }
        let start_failed = || InstanceError::Start {
            network_id: network_id.to_string(),
        };

        let directory = self.instance_dir(network_id);
        tokio::fs::create_dir_all(&directory)
            .await
            .change_context_lazy(start_failed)
            .attach_printable_lazy(|| format!("directory {}", directory.display()))?;

        let stats_socket = directory.join(STATS_SOCKET);
        let config_path = directory.join(CONFIG_FILE);
        tokio::fs::write(
            &config_path,
            render_config(&self.settings, network_id, &stats_socket),
        )
        .await
        .change_context_lazy(start_failed)
        .attach_printable_lazy(|| format!("config {}", config_path.display()))?;

        let child = Command::new(&self.settings.ip_binary)
            .args(["netns", "exec", namespace])
            .arg(&self.settings.haproxy_binary)
            .args(["-W", "-db", "-f"])
            .arg(&config_path)
            .kill_on_drop(true)
            .spawn()
            .change_context_lazy(start_failed)
            .attach_printable_lazy(|| {
                format!("binary {}", self.settings.haproxy_binary.display())
            })?;

        info!(
            "Started haproxy for network {network_id} in {namespace} (pid {:?})",
            child.id()
        );
        instances.insert(
            network_id.to_string(),
            Instance {
                child,
                directory,
                stats_socket,
            },
        );
        Ok(())
    }

    async fn stop(&self, network_id: &str) -> Result<(), Report<InstanceError>> {
        let mut instance = self
            .instances
            .lock()
            .await
            .remove(network_id)
            .ok_or_else(|| {
                Report::new(InstanceError::NotRunning {
                    network_id: network_id.to_string(),
                })
            })?;

        instance
            .child
            .kill()
            .await
            .change_context(InstanceError::Stop {
                network_id: network_id.to_string(),
            })?;

        if let Err(e) = tokio::fs::remove_dir_all(&instance.directory).await {
            warn!(
                "Failed to remove {} of network {network_id}: {e}",
                instance.directory.display()
            );
        }
        info!("Stopped haproxy for network {network_id}");
        Ok(())
    }

    async fn collect_stats(&self, network_ids: &[String]) -> Vec<String> {
        self.metrics.reset_instance_stats();
        let mut instances = self.instances.lock().await;
        let mut exited = Vec::new();

        for network_id in network_ids {
            let Some(instance) = instances.get_mut(network_id) else {
                warn!("No haproxy instance known for network {network_id}");
                continue;
            };

            match instance.child.try_wait() {
                Ok(Some(status)) => {
                    warn!("haproxy for network {network_id} exited with {status}");
                    self.metrics.set_instance_up(network_id, false);
                    exited.push(network_id.clone());
                    continue;
                }
                Ok(None) => self.metrics.set_instance_up(network_id, true),
                Err(e) => {
                    warn!("Failed to check haproxy of network {network_id}: {e}");
                    continue;
                }
            }

            match Self::stats_of(network_id, instance).await {
                Ok(rows) => self.metrics.record_proxy_stats(network_id, &rows),
                Err(e) => warn!("{e:?}"),
            }
        }

        for network_id in &exited {
            instances.remove(network_id);
        }
        exited
    }
}
