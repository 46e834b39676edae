//! Test adapters implementing the collaborator traits
//!
//! Every mutating call is appended to a shared [`Journal`] so tests can check
//! the relative order of port, namespace and instance operations.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use error_stack::Report;

use super::activator::Activator;
use super::errors::CloudError;
use super::errors::InstanceError;
use super::errors::NamespaceError;
use super::port_manager::PortManager;
use super::port_manager::PortSettings;
use super::reconciler::Reconciler;
use super::traits::InstanceSupervisor;
use super::traits::NamespaceHandle;
use super::traits::NamespaceOps;
use super::traits::NetworkApi;
use super::types::FixedIp;
use super::types::InjectorPort;
use super::types::PortFilter;
use super::types::PortSpec;
use super::types::Subnet;
use super::types::TaggedNetwork;

/// Ordered log of collaborator calls shared by all fakes of a test.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| *e == entry)
            .count()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

pub fn network(id: &str, tag: &str) -> TaggedNetwork {
    TaggedNetwork {
        id: id.to_string(),
        name: format!("{id}-name"),
        tenant_id: format!("tenant-{id}"),
        tags: vec![tag.to_string()],
    }
}

#[derive(Default)]
struct CloudState {
    /// network plus whether it bypasses the server-side tag filter
    networks: Vec<(TaggedNetwork, bool)>,
    ports: Vec<InjectorPort>,
    created: Vec<PortSpec>,
    deleted: Vec<String>,
    fail_create: HashSet<String>,
    fail_list_networks: bool,
    next_port: u32,
    subnets: HashMap<String, Subnet>,
}

/// In-memory cloud networking API.
pub struct FakeCloud {
    journal: Journal,
    state: Mutex<CloudState>,
}

impl FakeCloud {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            state: Mutex::new(CloudState::default()),
        }
    }

    pub fn add_network(&self, network: TaggedNetwork) {
        self.state.lock().unwrap().networks.push((network, false));
    }

    /// Add a network the server returns for any tag filter.
    pub fn add_network_unfiltered(&self, network: TaggedNetwork) {
        self.state.lock().unwrap().networks.push((network, true));
    }

    pub fn remove_network(&self, network_id: &str) {
        self.state
            .lock()
            .unwrap()
            .networks
            .retain(|(n, _)| n.id != network_id);
    }

    /// Add a port directly, returning its id.
    pub fn add_port(&self, network_id: &str, device_owner: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let port = new_port(
            &mut state.next_port,
            network_id,
            device_owner,
            "preexisting",
            "",
            "",
        );
        let id = port.id.clone();
        state.ports.push(port);
        id
    }

    pub fn add_subnet(&self, subnet: Subnet) {
        self.state
            .lock()
            .unwrap()
            .subnets
            .insert(subnet.id.clone(), subnet);
    }

    pub fn fail_create_on(&self, network_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_create
            .insert(network_id.to_string());
    }

    pub fn fail_list_networks(&self, enabled: bool) {
        self.state.lock().unwrap().fail_list_networks = enabled;
    }

    pub fn created_specs(&self) -> Vec<PortSpec> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted_ports(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Ports on the network owned by any injector.
    pub fn injector_ports(&self, network_id: &str) -> Vec<InjectorPort> {
        self.state
            .lock()
            .unwrap()
            .ports
            .iter()
            .filter(|p| p.network_id == network_id && p.device_owner.ends_with("-injector"))
            .cloned()
            .collect()
    }
}

fn new_port(
    counter: &mut u32,
    network_id: &str,
    device_owner: &str,
    tenant_id: &str,
    host_id: &str,
    dns_name: &str,
) -> InjectorPort {
    *counter += 1;
    InjectorPort {
        id: format!("port-{counter}"),
        network_id: network_id.to_string(),
        device_owner: device_owner.to_string(),
        device_id: "network-injector".to_string(),
        host_id: host_id.to_string(),
        dns_name: dns_name.to_string(),
        tenant_id: tenant_id.to_string(),
        mac_address: format!("fa:16:3e:00:00:{:02x}", *counter % 256),
        fixed_ips: vec![FixedIp {
            subnet_id: format!("subnet-{network_id}"),
            ip_address: format!("10.0.0.{}", *counter % 250 + 2),
        }],
    }
}

#[async_trait::async_trait]
impl NetworkApi for FakeCloud {
    async fn list_tagged_networks(
        &self,
        tag: &str,
    ) -> Result<Vec<TaggedNetwork>, Report<CloudError>> {
        let state = self.state.lock().unwrap();
        if state.fail_list_networks {
            return Err(Report::new(CloudError::Request {
                url: "fake://networks".to_string(),
            }));
        }
        Ok(state
            .networks
            .iter()
            .filter(|(n, unfiltered)| *unfiltered || n.has_tag(tag))
            .map(|(n, _)| n.clone())
            .collect())
    }

    async fn list_ports(
        &self,
        filter: &PortFilter,
    ) -> Result<Vec<InjectorPort>, Report<CloudError>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .ports
            .iter()
            .filter(|p| p.device_owner == filter.device_owner)
            .filter(|p| {
                filter
                    .network_id
                    .as_ref()
                    .map_or(true, |id| *id == p.network_id)
            })
            .cloned()
            .collect())
    }

    async fn create_port(&self, spec: &PortSpec) -> Result<InjectorPort, Report<CloudError>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create.contains(&spec.network_id) {
            return Err(Report::new(CloudError::Status {
                status: 500,
                url: "fake://ports".to_string(),
            }));
        }
        let port = new_port(
            &mut state.next_port,
            &spec.network_id,
            &spec.device_owner,
            &spec.tenant_id,
            &spec.host_id,
            &spec.dns_name,
        );
        state.created.push(spec.clone());
        state.ports.push(port.clone());
        self.journal.push(format!("create_port {}", spec.network_id));
        Ok(port)
    }

    async fn delete_port(&self, port_id: &str) -> Result<(), Report<CloudError>> {
        let mut state = self.state.lock().unwrap();
        state.ports.retain(|p| p.id != port_id);
        state.deleted.push(port_id.to_string());
        self.journal.push(format!("delete_port {port_id}"));
        Ok(())
    }

    async fn get_subnet(&self, subnet_id: &str) -> Result<Subnet, Report<CloudError>> {
        self.state
            .lock()
            .unwrap()
            .subnets
            .get(subnet_id)
            .cloned()
            .ok_or_else(|| {
                Report::new(CloudError::Status {
                    status: 404,
                    url: format!("fake://subnets/{subnet_id}"),
                })
            })
    }
}

pub struct FakeNamespaceHandle {
    name: String,
    network_id: String,
    active: bool,
    journal: Journal,
}

impl NamespaceHandle for FakeNamespaceHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for FakeNamespaceHandle {
    fn drop(&mut self) {
        self.journal.push(format!("release_ns {}", self.network_id));
    }
}

/// In-memory namespace primitive keyed by network id.
pub struct FakeNamespaces {
    journal: Journal,
    existing: Mutex<BTreeSet<String>>,
    fail_activate: Mutex<HashSet<String>>,
}

impl FakeNamespaces {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            existing: Mutex::new(BTreeSet::new()),
            fail_activate: Mutex::new(HashSet::new()),
        }
    }

    pub fn exists(&self, network_id: &str) -> bool {
        self.existing.lock().unwrap().contains(network_id)
    }

    /// Simulate a namespace left over by an earlier process.
    pub fn preexisting(&self, network_id: &str) {
        self.existing.lock().unwrap().insert(network_id.to_string());
    }

    pub fn fail_activate_on(&self, network_id: &str) {
        self.fail_activate
            .lock()
            .unwrap()
            .insert(network_id.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_activate.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl NamespaceOps for FakeNamespaces {
    type Handle = FakeNamespaceHandle;

    async fn ensure(
        &self,
        port: &InjectorPort,
    ) -> Result<FakeNamespaceHandle, Report<NamespaceError>> {
        self.existing
            .lock()
            .unwrap()
            .insert(port.network_id.clone());
        self.journal.push(format!("ensure_ns {}", port.network_id));
        Ok(FakeNamespaceHandle {
            name: format!("qinjector-{}", port.network_id),
            network_id: port.network_id.clone(),
            active: false,
            journal: self.journal.clone(),
        })
    }

    async fn activate(
        &self,
        handle: &mut FakeNamespaceHandle,
    ) -> Result<(), Report<NamespaceError>> {
        if self.fail_activate.lock().unwrap().contains(&handle.network_id) {
            return Err(Report::new(NamespaceError::Activate {
                name: handle.name.clone(),
            }));
        }
        handle.active = true;
        self.journal.push(format!("activate_ns {}", handle.network_id));
        Ok(())
    }

    async fn deactivate(
        &self,
        handle: &mut FakeNamespaceHandle,
    ) -> Result<(), Report<NamespaceError>> {
        handle.active = false;
        self.journal
            .push(format!("deactivate_ns {}", handle.network_id));
        Ok(())
    }

    async fn destroy(&self, network_id: &str) -> Result<(), Report<NamespaceError>> {
        self.existing.lock().unwrap().remove(network_id);
        self.journal.push(format!("destroy_ns {network_id}"));
        Ok(())
    }
}

#[derive(Default)]
struct SupervisorState {
    running: BTreeSet<String>,
    starts: HashMap<String, usize>,
    stops: HashMap<String, usize>,
    fail_start: HashSet<String>,
    fail_stop: HashSet<String>,
    stats_requests: Vec<Vec<String>>,
    exited: BTreeSet<String>,
}

/// In-memory instance supervisor.
pub struct FakeSupervisor {
    journal: Journal,
    state: Mutex<SupervisorState>,
}

impl FakeSupervisor {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            state: Mutex::new(SupervisorState::default()),
        }
    }

    pub fn start_count(&self, network_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .starts
            .get(network_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn stop_count(&self, network_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .stops
            .get(network_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn fail_start_on(&self, network_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_start
            .insert(network_id.to_string());
    }

    pub fn fail_stop_on(&self, network_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_stop
            .insert(network_id.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_start.clear();
        state.fail_stop.clear();
    }

    pub fn stats_requests(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().stats_requests.clone()
    }

    /// Simulate the instance of a network dying on its own.
    pub fn exit_instance(&self, network_id: &str) {
        self.state
            .lock()
            .unwrap()
            .exited
            .insert(network_id.to_string());
    }
}

#[async_trait::async_trait]
impl InstanceSupervisor for FakeSupervisor {
    async fn start(&self, network_id: &str, _namespace: &str) -> Result<(), Report<InstanceError>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_start.contains(network_id) {
            return Err(Report::new(InstanceError::Start {
                network_id: network_id.to_string(),
            }));
        }
        if !state.running.insert(network_id.to_string()) {
            return Err(Report::new(InstanceError::AlreadyRunning {
                network_id: network_id.to_string(),
            }));
        }
        *state.starts.entry(network_id.to_string()).or_default() += 1;
        self.journal.push(format!("start {network_id}"));
        Ok(())
    }

    async fn stop(&self, network_id: &str) -> Result<(), Report<InstanceError>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_stop.contains(network_id) {
            return Err(Report::new(InstanceError::Stop {
                network_id: network_id.to_string(),
            }));
        }
        if !state.running.remove(network_id) {
            return Err(Report::new(InstanceError::NotRunning {
                network_id: network_id.to_string(),
            }));
        }
        *state.stops.entry(network_id.to_string()).or_default() += 1;
        self.journal.push(format!("stop {network_id}"));
        Ok(())
    }

    async fn collect_stats(&self, network_ids: &[String]) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        state.stats_requests.push(network_ids.to_vec());
        let exited: Vec<String> = network_ids
            .iter()
            .filter(|id| state.exited.contains(*id))
            .cloned()
            .collect();
        for network_id in &exited {
            state.exited.remove(network_id);
            state.running.remove(network_id);
        }
        exited
    }
}

/// Fakes wired together the way the application wires the real collaborators.
pub struct TestBed {
    pub journal: Journal,
    pub cloud: Arc<FakeCloud>,
    pub namespaces: Arc<FakeNamespaces>,
    pub supervisor: Arc<FakeSupervisor>,
    network_tag: String,
}

impl TestBed {
    pub fn new(network_tag: &str) -> Self {
        let journal = Journal::default();
        Self {
            cloud: Arc::new(FakeCloud::new(journal.clone())),
            namespaces: Arc::new(FakeNamespaces::new(journal.clone())),
            supervisor: Arc::new(FakeSupervisor::new(journal.clone())),
            journal,
            network_tag: network_tag.to_string(),
        }
    }

    pub fn port_settings(&self) -> PortSettings {
        PortSettings {
            network_tag: self.network_tag.clone(),
            host_id: "node-1".to_string(),
            dns_name: "injector".to_string(),
        }
    }

    pub fn activator(&self) -> Activator<FakeCloud, FakeNamespaces, FakeSupervisor> {
        Activator::new(
            PortManager::new(self.cloud.clone(), self.port_settings()),
            self.namespaces.clone(),
            self.supervisor.clone(),
        )
    }

    pub fn reconciler(&self) -> Reconciler<FakeCloud, FakeNamespaces, FakeSupervisor> {
        Reconciler::new(self.cloud.clone(), self.activator())
    }
}
