//! Fixed-interval driver of the reconciler.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::traits::InstanceSupervisor;
use crate::domain::traits::NamespaceOps;
use crate::domain::traits::NetworkApi;
use crate::domain::Reconciler;
use crate::infrastructure::metrics::Metrics;

pub struct Scheduler<N, S, I> {
    reconciler: Reconciler<N, S, I>,
    metrics: Arc<Metrics>,
    interval: Duration,
}

impl<N, S, I> Scheduler<N, S, I>
where
    N: NetworkApi,
    S: NamespaceOps,
    I: InstanceSupervisor,
{
    pub fn new(reconciler: Reconciler<N, S, I>, metrics: Arc<Metrics>, interval: Duration) -> Self {
        Self {
            reconciler,
            metrics,
            interval,
        }
    }

    pub fn reconciler(&self) -> &Reconciler<N, S, I> {
        &self.reconciler
    }

    /// Adopt endpoints left by a previous process. Failures are only logged.
    pub async fn recover(&mut self) {
        if let Err(e) = self.reconciler.recover().await {
            warn!("Recovery of existing injector ports failed: {e:?}");
        }
    }

    /// One scan, optionally followed by a stats round.
    pub async fn run_cycle(&mut self, collect_stats: bool) {
        let started = Instant::now();
        match self.reconciler.scan().await {
            Ok(report) => {
                info!(
                    desired = report.desired.len(),
                    started = report.started.len(),
                    disabled = report.disabled.len(),
                    failures = report.failures.len(),
                    "Scan completed"
                );
                self.metrics.record_scan(
                    &report,
                    self.reconciler.running().len(),
                    started.elapsed(),
                );
            }
            Err(e) => {
                error!("Scan failed: {e:?}");
                self.metrics.record_scan_failure();
            }
        }

        if collect_stats {
            self.reconciler.collect_stats().await;
        }
    }

    /// Recover, then run one full cycle.
    pub async fn run_once(&mut self) {
        self.recover().await;
        self.run_cycle(true).await;
    }

    /// Recover, scan immediately, then scan and collect stats on every tick
    /// until cancelled. Cancellation is observed between cycles.
    pub async fn run(&mut self, cancellation_token: CancellationToken) {
        self.recover().await;
        self.run_cycle(false).await;

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Scheduler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle(true).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::domain::mock::network;
    use crate::domain::mock::FakeCloud;
    use crate::domain::mock::FakeNamespaces;
    use crate::domain::mock::FakeSupervisor;
    use crate::domain::mock::TestBed;

    const INTERVAL: Duration = Duration::from_secs(60);

    type FakeScheduler = Scheduler<FakeCloud, FakeNamespaces, FakeSupervisor>;

    fn scheduler(bed: &TestBed) -> (FakeScheduler, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new().expect("metrics should register"));
        (
            Scheduler::new(bed.reconciler(), metrics.clone(), INTERVAL),
            metrics,
        )
    }

    #[test(tokio::test(start_paused = true))]
    async fn scans_immediately_then_on_every_tick() {
        let bed = TestBed::new("injected");
        bed.cloud.add_network(network("A", "injected"));
        let (mut scheduler, metrics) = scheduler(&bed);
        let token = CancellationToken::new();

        let task_token = token.clone();
        let handle = tokio::spawn(async move { scheduler.run(task_token).await });

        tokio::time::sleep(INTERVAL * 2 + INTERVAL / 2).await;
        token.cancel();
        handle.await.expect("scheduler task should finish");

        let text = metrics.encode().expect("should encode");
        assert!(text.contains("network_injector_scans_total 3"), "{text}");
        assert_eq!(
            bed.supervisor.stats_requests(),
            vec![vec!["A".to_string()], vec!["A".to_string()]],
            "the immediate scan collects no stats"
        );
        assert_eq!(bed.supervisor.start_count("A"), 1);
    }

    #[test(tokio::test(start_paused = true))]
    async fn cancellation_before_first_tick_stops_the_loop() {
        let bed = TestBed::new("injected");
        let (mut scheduler, metrics) = scheduler(&bed);
        let token = CancellationToken::new();

        let task_token = token.clone();
        let handle = tokio::spawn(async move { scheduler.run(task_token).await });
        tokio::time::sleep(INTERVAL / 2).await;
        token.cancel();
        handle.await.expect("scheduler task should finish");

        let text = metrics.encode().expect("should encode");
        assert!(text.contains("network_injector_scans_total 1"), "{text}");
        assert!(bed.supervisor.stats_requests().is_empty());
    }

    #[test(tokio::test)]
    async fn listing_failure_is_counted_and_not_fatal() {
        let bed = TestBed::new("injected");
        bed.cloud.add_network(network("A", "injected"));
        bed.cloud.fail_list_networks(true);
        let (mut scheduler, metrics) = scheduler(&bed);

        scheduler.run_cycle(true).await;
        assert!(scheduler.reconciler().running().is_empty());

        bed.cloud.fail_list_networks(false);
        scheduler.run_cycle(true).await;
        assert!(scheduler.reconciler().running().is_running("A"));

        let text = metrics.encode().expect("should encode");
        assert!(text.contains("network_injector_scan_failures_total 1"), "{text}");
        assert!(text.contains("network_injector_scans_total 1"), "{text}");
    }

    #[test(tokio::test)]
    async fn run_once_recovers_before_scanning() {
        let bed = TestBed::new("injected");
        bed.cloud.add_port("stale", "network:injected-injector");
        let (mut scheduler, _metrics) = scheduler(&bed);

        scheduler.run_once().await;

        assert!(bed.cloud.injector_ports("stale").is_empty());
        assert!(scheduler.reconciler().orphans().is_empty());
    }
}
