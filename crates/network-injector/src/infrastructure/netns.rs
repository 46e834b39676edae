//! Network namespaces managed with the `ip` tool.
//!
//! Each tagged network gets a namespace `qinjector-<network_id>` holding one
//! end of a veth pair that carries the injector port's MAC and addresses.

use std::fs::File;
use std::path::Path;
use std::path::PathBuf;
use std::process::Output;
use std::sync::Arc;

use error_stack::Report;
use error_stack::ResultExt;
use tokio::process::Command;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::domain::errors::NamespaceError;
use crate::domain::traits::NamespaceHandle;
use crate::domain::traits::NamespaceOps;
use crate::domain::traits::NetworkApi;
use crate::domain::types::InjectorPort;

pub const NETNS_DIR: &str = "/var/run/netns";

/// Linux interface names are limited to 15 bytes.
const ID_PREFIX_LEN: usize = 11;

fn short_id(id: &str) -> String {
    id.chars().take(ID_PREFIX_LEN).collect()
}

pub fn namespace_name(network_id: &str) -> String {
    format!("qinjector-{network_id}")
}

/// Interface inside the namespace, named after the port.
pub fn inside_interface(port_id: &str) -> String {
    format!("tap{}", short_id(port_id))
}

/// Host end of the veth pair, named after the network so teardown needs no port.
pub fn host_interface(network_id: &str) -> String {
    format!("inj{}", short_id(network_id))
}

pub struct NetnsHandle {
    name: String,
    interface: String,
    host_interface: String,
    mac_address: String,
    /// Addresses in CIDR notation, e.g. `10.0.0.5/24`.
    addresses: Vec<String>,
    gateway: Option<String>,
    active: bool,
    _file: File,
}

impl NetnsHandle {
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn gateway(&self) -> Option<&str> {
        self.gateway.as_deref()
    }
}

impl NamespaceHandle for NetnsHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for NetnsHandle {
    fn drop(&mut self) {
        debug!("Released handle of namespace {}", self.name);
    }
}

pub struct IpNetns<N> {
    api: Arc<N>,
    ip_binary: PathBuf,
    netns_dir: PathBuf,
}

impl<N> IpNetns<N> {
    pub fn new(api: Arc<N>) -> Self {
        Self::with_paths(api, PathBuf::from("ip"), PathBuf::from(NETNS_DIR))
    }

    pub fn with_paths(api: Arc<N>, ip_binary: PathBuf, netns_dir: PathBuf) -> Self {
        Self {
            api,
            ip_binary,
            netns_dir,
        }
    }

    fn namespace_path(&self, name: &str) -> PathBuf {
        self.netns_dir.join(name)
    }

    fn command_line(&self, args: &[&str]) -> String {
        format!("{} {}", self.ip_binary.display(), args.join(" "))
    }

    async fn output(&self, args: &[&str]) -> Result<Output, Report<NamespaceError>> {
        Command::new(&self.ip_binary)
            .args(args)
            .output()
            .await
            .change_context_lazy(|| NamespaceError::Command {
                command: self.command_line(args),
                message: "failed to execute".to_string(),
            })
    }

    /// Run `ip` and return its stdout. Non-zero exit is an error.
    async fn ip(&self, args: &[&str]) -> Result<String, Report<NamespaceError>> {
        let command = self.command_line(args);
        let output = self.output(args).await?;

        if !output.status.success() {
            return Err(Report::new(NamespaceError::Command {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Only a non-zero exit of `link show` means absent; `ip` failing to run
    /// is an error.
    async fn link_exists(
        &self,
        namespace: Option<&str>,
        interface: &str,
    ) -> Result<bool, Report<NamespaceError>> {
        let mut args = Vec::with_capacity(6);
        if let Some(ns) = namespace {
            args.extend(["-n", ns]);
        }
        args.extend(["link", "show", "dev", interface]);
        Ok(self.output(&args).await?.status.success())
    }

    async fn activate_links(&self, handle: &NetnsHandle) -> Result<(), Report<NamespaceError>> {
        let ns = handle.name.as_str();
        let inside = handle.interface.as_str();
        let host = handle.host_interface.as_str();

        if !self.link_exists(Some(ns), inside).await? {
            if self.link_exists(None, host).await? {
                // stale pair whose inside end is gone
                self.ip(&["link", "del", host]).await?;
            }
            self.ip(&["link", "add", host, "type", "veth", "peer", "name", inside])
                .await?;
            self.ip(&["link", "set", inside, "netns", ns]).await?;
        }
        self.ip(&["link", "set", host, "up"]).await?;

        if !handle.mac_address.is_empty() {
            self.ip(&["-n", ns, "link", "set", inside, "address", &handle.mac_address])
                .await?;
        }
        for address in &handle.addresses {
            self.ip(&["-n", ns, "addr", "replace", address, "dev", inside])
                .await?;
        }
        self.ip(&["-n", ns, "link", "set", "lo", "up"]).await?;
        self.ip(&["-n", ns, "link", "set", inside, "up"]).await?;
        if let Some(gateway) = &handle.gateway {
            self.ip(&["-n", ns, "route", "replace", "default", "via", gateway, "dev", inside])
                .await?;
        }
        Ok(())
    }

    /// Send SIGTERM to every process left in the namespace.
    async fn kill_processes(&self, name: &str) -> Result<(), Report<NamespaceError>> {
        let pids = self.ip(&["netns", "pids", name]).await?;
        for pid in pids.lines().filter_map(|line| line.trim().parse::<i32>().ok()) {
            debug!("Terminating process {pid} in namespace {name}");
            let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
            if rc != 0 {
                warn!("Failed to terminate process {pid} in namespace {name}");
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<N> NamespaceOps for IpNetns<N>
where
    N: NetworkApi,
{
    type Handle = NetnsHandle;

    async fn ensure(&self, port: &InjectorPort) -> Result<NetnsHandle, Report<NamespaceError>> {
        let name = namespace_name(&port.network_id);
        let setup_failed = || NamespaceError::Setup { name: name.clone() };
        let path = self.namespace_path(&name);

        if !path.exists() {
            self.ip(&["netns", "add", &name])
                .await
                .change_context_lazy(setup_failed)?;
            info!("Created namespace {name}");
        }

        let file = open_namespace(&path)
            .await
            .change_context_lazy(setup_failed)?;

        let mut addresses = Vec::with_capacity(port.fixed_ips.len());
        let mut gateway = None;
        for fixed_ip in &port.fixed_ips {
            let subnet = self
                .api
                .get_subnet(&fixed_ip.subnet_id)
                .await
                .change_context_lazy(setup_failed)?;
            let prefix = subnet.prefix_len().ok_or_else(|| {
                Report::new(setup_failed())
                    .attach_printable(format!("subnet {} has invalid cidr {}", subnet.id, subnet.cidr))
            })?;
            addresses.push(format!("{}/{prefix}", fixed_ip.ip_address));
            if gateway.is_none() {
                gateway = subnet.gateway_ip;
            }
        }

        Ok(NetnsHandle {
            interface: inside_interface(&port.id),
            host_interface: host_interface(&port.network_id),
            mac_address: port.mac_address.clone(),
            addresses,
            gateway,
            active: false,
            _file: file,
            name,
        })
    }

    async fn activate(&self, handle: &mut NetnsHandle) -> Result<(), Report<NamespaceError>> {
        self.activate_links(handle)
            .await
            .change_context_lazy(|| NamespaceError::Activate {
                name: handle.name.clone(),
            })?;
        handle.active = true;
        debug!("Namespace {} active", handle.name);
        Ok(())
    }

    async fn deactivate(&self, handle: &mut NetnsHandle) -> Result<(), Report<NamespaceError>> {
        handle.active = false;
        debug!("Left namespace {}", handle.name);
        Ok(())
    }

    async fn destroy(&self, network_id: &str) -> Result<(), Report<NamespaceError>> {
        let name = namespace_name(network_id);
        let destroy_failed = || NamespaceError::Destroy { name: name.clone() };
        let exists = self.namespace_path(&name).exists();

        if exists {
            self.kill_processes(&name)
                .await
                .change_context_lazy(destroy_failed)?;
        }

        let host = host_interface(network_id);
        if self
            .link_exists(None, &host)
            .await
            .change_context_lazy(destroy_failed)?
        {
            self.ip(&["link", "del", &host])
                .await
                .change_context_lazy(destroy_failed)?;
        }

        if exists {
            self.ip(&["netns", "delete", &name])
                .await
                .change_context_lazy(destroy_failed)?;
            info!("Deleted namespace {name}");
        }
        Ok(())
    }
}

async fn open_namespace(path: &Path) -> Result<File, Report<NamespaceError>> {
    let file = tokio::fs::File::open(path)
        .await
        .change_context_lazy(|| NamespaceError::Command {
            command: format!("open {}", path.display()),
            message: "namespace file not accessible".to_string(),
        })?;
    Ok(file.into_std().await)
}
