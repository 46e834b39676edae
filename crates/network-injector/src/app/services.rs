use std::sync::Arc;

use tokio::sync::Mutex;

use crate::app::scheduler::Scheduler;
use crate::infrastructure::haproxy::HaproxySupervisor;
use crate::infrastructure::metrics::Metrics;
use crate::infrastructure::netns::IpNetns;
use crate::infrastructure::openstack::NeutronClient;

pub type InjectorScheduler = Scheduler<NeutronClient, IpNetns<NeutronClient>, HaproxySupervisor>;

/// Application services container
pub struct ApplicationServices {
    pub scheduler: Arc<Mutex<InjectorScheduler>>,
    pub supervisor: Arc<HaproxySupervisor>,
    pub metrics: Arc<Metrics>,
}
