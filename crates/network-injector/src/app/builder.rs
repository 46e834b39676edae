use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use tokio::sync::Mutex;

use crate::app::scheduler::Scheduler;
use crate::app::services::ApplicationServices;
use crate::app::Application;
use crate::config::Settings;
use crate::domain::Activator;
use crate::domain::PortManager;
use crate::domain::Reconciler;
use crate::infrastructure::haproxy::HaproxySupervisor;
use crate::infrastructure::metrics::Metrics;
use crate::infrastructure::netns::IpNetns;
use crate::infrastructure::netns::NETNS_DIR;
use crate::infrastructure::openstack;

/// Application builder
pub struct ApplicationBuilder {
    settings: Settings,
}

impl ApplicationBuilder {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Authenticate against the cloud and wire all collaborators.
    ///
    /// Fails before any network is touched when the metrics registry or the
    /// cloud connection cannot be set up.
    pub async fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");

        let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);

        let api = Arc::new(
            openstack::connect_from_env()
                .await
                .map_err(|e| anyhow::anyhow!("failed to connect to OpenStack: {e:?}"))?,
        );
        tracing::info!("Using network endpoint {}", api.base());

        let namespaces = Arc::new(IpNetns::with_paths(
            api.clone(),
            self.settings.haproxy.ip_binary.clone(),
            PathBuf::from(NETNS_DIR),
        ));
        let supervisor = Arc::new(HaproxySupervisor::new(
            self.settings.haproxy.clone(),
            metrics.clone(),
        ));
        let activator = Activator::new(
            PortManager::new(api.clone(), self.settings.ports.clone()),
            namespaces,
            supervisor.clone(),
        );
        let reconciler = Reconciler::new(api, activator);
        let scheduler = Scheduler::new(reconciler, metrics.clone(), self.settings.interval);

        let services = ApplicationServices {
            scheduler: Arc::new(Mutex::new(scheduler)),
            supervisor,
            metrics,
        };
        Ok(Application::new(services, self.settings))
    }
}
