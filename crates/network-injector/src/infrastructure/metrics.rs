//! Prometheus metrics of the controller and its HAProxy instances.

use std::time::Duration;

use prometheus::Encoder;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;

use crate::domain::reconciler::Operation;
use crate::domain::ScanReport;

const PREFIX: &str = "network_injector";

/// One snapshot row of `show stat` for a proxy/server pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyStats {
    pub proxy: String,
    pub server: String,
    pub current_sessions: i64,
    pub bytes_in: i64,
    pub bytes_out: i64,
}

pub struct Metrics {
    registry: Registry,
    scans_total: IntCounter,
    scan_failures_total: IntCounter,
    scan_duration_seconds: Histogram,
    network_errors_total: IntCounterVec,
    tagged_networks: IntGauge,
    running_instances: IntGauge,
    instance_up: IntGaugeVec,
    current_sessions: IntGaugeVec,
    bytes_in: IntGaugeVec,
    bytes_out: IntGaugeVec,
}

fn name(suffix: &str) -> String {
    format!("{PREFIX}_{suffix}")
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let stat_labels = ["network", "proxy", "server"];

        let metrics = Self {
            scans_total: IntCounter::new(name("scans_total"), "Completed reconciliation cycles")?,
            scan_failures_total: IntCounter::new(
                name("scan_failures_total"),
                "Cycles aborted because tagged networks could not be listed",
            )?,
            scan_duration_seconds: Histogram::with_opts(HistogramOpts::new(
                name("scan_duration_seconds"),
                "Duration of reconciliation cycles",
            ))?,
            network_errors_total: IntCounterVec::new(
                Opts::new(
                    name("network_errors_total"),
                    "Failed enable or disable sequences of single networks",
                ),
                &["operation"],
            )?,
            tagged_networks: IntGauge::new(
                name("tagged_networks"),
                "Networks carrying the tag in the last scan",
            )?,
            running_instances: IntGauge::new(
                name("running_instances"),
                "Networks with a running HAProxy instance",
            )?,
            instance_up: IntGaugeVec::new(
                Opts::new(name("haproxy_up"), "Whether the HAProxy instance is alive"),
                &["network"],
            )?,
            current_sessions: IntGaugeVec::new(
                Opts::new(name("haproxy_current_sessions"), "Current sessions"),
                &stat_labels,
            )?,
            bytes_in: IntGaugeVec::new(
                Opts::new(name("haproxy_bytes_in"), "Bytes received"),
                &stat_labels,
            )?,
            bytes_out: IntGaugeVec::new(
                Opts::new(name("haproxy_bytes_out"), "Bytes sent"),
                &stat_labels,
            )?,
            registry,
        };

        metrics
            .registry
            .register(Box::new(metrics.scans_total.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.scan_failures_total.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.scan_duration_seconds.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.network_errors_total.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.tagged_networks.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.running_instances.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.instance_up.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.current_sessions.clone()))?;
        metrics.registry.register(Box::new(metrics.bytes_in.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.bytes_out.clone()))?;

        // series exist from the start so rates work before the first failure
        for operation in [Operation::Enable, Operation::Disable] {
            metrics
                .network_errors_total
                .with_label_values(&[operation.to_string().as_str()]);
        }

        Ok(metrics)
    }

    pub fn record_scan(&self, report: &ScanReport, running: usize, elapsed: Duration) {
        self.scans_total.inc();
        self.scan_duration_seconds.observe(elapsed.as_secs_f64());
        self.tagged_networks.set(report.desired.len() as i64);
        self.running_instances.set(running as i64);
        for operation in [Operation::Enable, Operation::Disable] {
            let failed = report.failure_count(operation) as u64;
            if failed > 0 {
                self.network_errors_total
                    .with_label_values(&[operation.to_string().as_str()])
                    .inc_by(failed);
            }
        }
    }

    pub fn record_scan_failure(&self) {
        self.scan_failures_total.inc();
    }

    /// Drop all per-instance series before a stats round.
    pub fn reset_instance_stats(&self) {
        self.instance_up.reset();
        self.current_sessions.reset();
        self.bytes_in.reset();
        self.bytes_out.reset();
    }

    pub fn set_instance_up(&self, network_id: &str, up: bool) {
        self.instance_up
            .with_label_values(&[network_id])
            .set(i64::from(up));
    }

    pub fn record_proxy_stats(&self, network_id: &str, stats: &[ProxyStats]) {
        for row in stats {
            let labels = [network_id, row.proxy.as_str(), row.server.as_str()];
            self.current_sessions
                .with_label_values(&labels)
                .set(row.current_sessions);
            self.bytes_in.with_label_values(&labels).set(row.bytes_in);
            self.bytes_out.with_label_values(&labels).set(row.bytes_out);
        }
    }

    /// Registry contents in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
