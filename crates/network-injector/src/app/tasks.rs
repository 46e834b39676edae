use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::MetricsServer;
use crate::app::core::Application;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Task manager, responsible for starting and managing all background tasks
pub struct Tasks {
    pub tasks: Vec<JoinHandle<Result<()>>>,
    cancellation_token: CancellationToken,
}

impl Default for Tasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Tasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start all background tasks
    pub fn spawn_all_tasks(&mut self, app: &Application) -> Result<()> {
        let scheduler_task = self.spawn_scheduler_task(app);
        self.tasks.push(scheduler_task);

        let metrics_server_task = self.spawn_metrics_server_task(app);
        self.tasks.push(metrics_server_task);

        Ok(())
    }

    /// wait for tasks to complete or receive shutdown signal
    ///
    /// A task ending before a shutdown signal is an error, even when it
    /// returned `Ok`. The remaining tasks are cancelled and awaited first.
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        let signal_handler = {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                let mut sigint = signal(SignalKind::interrupt())?;

                tokio::spawn(async move {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating graceful shutdown");
                        }
                        _ = sigint.recv() => {
                            tracing::info!("Received SIGINT, initiating graceful shutdown");
                        }
                    }
                })
            }
            #[cfg(not(unix))]
            {
                tokio::spawn(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl+C: {e}");
                    }
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                })
            }
        };

        let finished = tokio::select! {
            _ = signal_handler => None,
            (result, index, _) = futures::future::select_all(self.tasks.iter_mut()) => {
                Some((index, result))
            }
        };

        self.cancellation_token.cancel();
        let Some((index, result)) = finished else {
            tracing::info!("Shutdown signal received, cancelling all tasks");
            self.wait_for_tasks_with_timeout(SHUTDOWN_TIMEOUT).await;
            return Ok(());
        };

        // a finished handle must not be polled again
        self.tasks.swap_remove(index);
        tracing::warn!("A task ended before shutdown, cancelling the others");
        self.wait_for_tasks_with_timeout(SHUTDOWN_TIMEOUT).await;

        match result {
            Ok(Ok(())) => Err(anyhow::anyhow!("task completed unexpectedly")),
            Ok(Err(e)) => Err(e.context("task failed")),
            Err(e) => Err(anyhow::Error::new(e).context("task panicked or was aborted")),
        }
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for task in &mut self.tasks {
                match task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!("Task failed during shutdown: {e:?}"),
                    Err(e) => tracing::error!("Task failed during shutdown: {e}"),
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }

    fn spawn_scheduler_task(&self, app: &Application) -> JoinHandle<Result<()>> {
        let scheduler = app.services().scheduler.clone();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting scheduler task");
            scheduler.lock().await.run(token).await;
            tracing::info!("Scheduler task completed");
            Ok(())
        })
    }

    fn spawn_metrics_server_task(&self, app: &Application) -> JoinHandle<Result<()>> {
        let server = MetricsServer::new(
            app.services().metrics.clone(),
            app.settings().metrics_bind_address.clone(),
        );
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting metrics server task");
            server
                .run(token)
                .await
                .map_err(|e| anyhow::anyhow!("metrics server failed: {e:?}"))?;
            tracing::info!("Metrics server task completed");
            Ok(())
        })
    }
}
