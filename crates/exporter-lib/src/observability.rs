//! Observability infrastructure for the exporter
//!
//! Provides:
//! - Prometheus self-metrics (cycle latency, cycle and sample failures, containers listed)
//! - Structured JSON logging with tracing

use crate::models::CycleReport;
use anyhow::{Context, Result};
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use tracing::{debug, info, warn};

/// Histogram buckets for cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Exporter self-metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    cycle_duration_seconds: Histogram,
    cycles_total: IntCounter,
    cycle_failures_total: IntCounter,
    sample_failures_total: IntCounter,
    containers_listed: IntGauge,
}

impl ExporterMetrics {
    /// Create the self-metrics and register them with `registry`
    pub fn register(registry: &Registry) -> Result<Self> {
        let metrics = Self {
            cycle_duration_seconds: Histogram::with_opts(
                HistogramOpts::new(
                    "docker_exporter_cycle_duration_seconds",
                    "Time spent running one full poll cycle",
                )
                .buckets(CYCLE_BUCKETS.to_vec()),
            )
            .context("Failed to create cycle_duration_seconds")?,

            cycles_total: IntCounter::new(
                "docker_exporter_cycles_total",
                "Total number of completed poll cycles",
            )
            .context("Failed to create cycles_total")?,

            cycle_failures_total: IntCounter::new(
                "docker_exporter_cycle_failures_total",
                "Total number of poll cycles aborted because containers could not be listed",
            )
            .context("Failed to create cycle_failures_total")?,

            sample_failures_total: IntCounter::new(
                "docker_exporter_sample_failures_total",
                "Total number of per-container stats fetches that failed",
            )
            .context("Failed to create sample_failures_total")?,

            containers_listed: IntGauge::new(
                "docker_exporter_containers_listed",
                "Number of containers listed in the last completed cycle",
            )
            .context("Failed to create containers_listed")?,
        };

        registry.register(Box::new(metrics.cycle_duration_seconds.clone()))?;
        registry.register(Box::new(metrics.cycles_total.clone()))?;
        registry.register(Box::new(metrics.cycle_failures_total.clone()))?;
        registry.register(Box::new(metrics.sample_failures_total.clone()))?;
        registry.register(Box::new(metrics.containers_listed.clone()))?;

        Ok(metrics)
    }

    /// Record a completed cycle
    pub fn record_cycle(&self, report: &CycleReport) {
        self.cycle_duration_seconds
            .observe(report.elapsed_ms as f64 / 1000.0);
        self.cycles_total.inc();
        self.sample_failures_total.inc_by(report.failed_samples as u64);
        self.containers_listed.set(report.containers_listed as i64);
    }

    /// Record a cycle aborted at the listing phase
    pub fn inc_cycle_failures(&self) {
        self.cycle_failures_total.inc();
    }

    pub fn cycles_total(&self) -> u64 {
        self.cycles_total.get()
    }

    pub fn cycle_failures_total(&self) -> u64 {
        self.cycle_failures_total.get()
    }

    pub fn sample_failures_total(&self) -> u64 {
        self.sample_failures_total.get()
    }
}

/// Structured logger for exporter lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    engine_host: String,
}

impl StructuredLogger {
    pub fn new(engine_host: impl Into<String>) -> Self {
        Self {
            engine_host: engine_host.into(),
        }
    }

    /// Log exporter startup
    pub fn log_startup(&self, version: &str, listen_port: u16) {
        info!(
            event = "exporter_started",
            engine = %self.engine_host,
            exporter_version = %version,
            listen_port = listen_port,
            "Docker exporter started"
        );
    }

    /// Log exporter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            engine = %self.engine_host,
            reason = %reason,
            "Docker exporter shutting down"
        );
    }

    /// Log a completed cycle
    pub fn log_cycle(&self, report: &CycleReport) {
        debug!(
            event = "cycle_complete",
            engine = %self.engine_host,
            containers = report.containers_listed,
            total_cpu_percent = report.total_cpu_percent,
            cpu_percent_available = report.capacity.cpu_percent_available,
            total_memory_mb = report.total_memory_mb,
            memory_mb_available = report.capacity.memory_mb_available,
            failed_samples = report.failed_samples,
            elapsed_ms = report.elapsed_ms,
            "Poll cycle complete"
        );
    }

    /// Log a cycle aborted because the engine could not be reached
    pub fn log_cycle_aborted(&self, error: &str) {
        warn!(
            event = "cycle_aborted",
            engine = %self.engine_host,
            error = %error,
            "Poll cycle aborted, keeping previous values"
        );
    }
}
