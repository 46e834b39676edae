use anyhow::Result;

use crate::app::services::ApplicationServices;
use crate::app::tasks::Tasks;
use crate::config::Settings;

/// Application core structure with explicit dependencies
pub struct Application {
    services: ApplicationServices,
    settings: Settings,
}

impl Application {
    pub fn new(services: ApplicationServices, settings: Settings) -> Self {
        Self { services, settings }
    }

    pub fn services(&self) -> &ApplicationServices {
        &self.services
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run a single cycle when `--once` is set, otherwise start all tasks and
    /// wait for a shutdown signal.
    pub async fn run(&self) -> Result<()> {
        if self.settings.once {
            tracing::info!("Running a single reconciliation cycle");
            self.services.scheduler.lock().await.run_once().await;
            return Ok(());
        }

        tracing::info!("Starting all application tasks...");
        let mut tasks = Tasks::new();

        if let Err(e) = tasks.spawn_all_tasks(self) {
            tracing::error!("Failed to spawn application tasks: {}", e);
            return Err(e);
        }

        if let Err(e) = tasks.wait_for_completion().await {
            tracing::error!("Error during task execution: {}", e);
            return Err(e);
        }

        tracing::info!("Application run completed");
        Ok(())
    }

    /// Stop the HAProxy instances this process spawned.
    ///
    /// Ports and namespaces stay in place; the next start adopts them.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down application...");
        self.services.supervisor.stop_all().await;
        tracing::info!("Application shutdown completed");
        Ok(())
    }
}
