//! Poll loop
//!
//! Runs one full cycle per tick, strictly sequentially:
//! list containers, probe host capacity, collect CPU, collect memory,
//! reconcile the registry, publish aggregates. A slow cycle delays the next
//! tick instead of overlapping with it.

use super::capacity::probe_capacity;
use super::fanout::fan_out;
use crate::engine::{ContainerEngine, EngineError};
use crate::health::HealthRegistry;
use crate::models::{CycleReport, MetricKind};
use crate::observability::{ExporterMetrics, StructuredLogger};
use crate::registry::MetricRegistry;
use anyhow::Result;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Time between cycle starts (default: 1 second)
    pub interval: Duration,
    /// Concurrent stats requests while collecting CPU (default: 50)
    pub cpu_workers: usize,
    /// Concurrent stats requests while collecting memory (default: 10)
    pub memory_workers: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            cpu_workers: 50,
            memory_workers: 10,
        }
    }
}

/// Phases of one poll cycle, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    ListContainers,
    ProbeCapacity,
    CollectCpu,
    CollectMemory,
    Reconcile,
    Publish,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::ListContainers => "list_containers",
            CyclePhase::ProbeCapacity => "probe_capacity",
            CyclePhase::CollectCpu => "collect_cpu",
            CyclePhase::CollectMemory => "collect_memory",
            CyclePhase::Reconcile => "reconcile",
            CyclePhase::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// A cycle that produced no output
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("failed to list containers: {0}")]
    ListContainers(#[source] EngineError),
}

/// Samples the engine on a fixed interval and keeps the registry current
pub struct PollLoop {
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<MetricRegistry>,
    config: PollConfig,
    metrics: Option<ExporterMetrics>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl PollLoop {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        registry: Arc<MetricRegistry>,
        config: PollConfig,
    ) -> Self {
        Self {
            engine,
            registry,
            config,
            metrics: None,
            health: None,
            logger: None,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Run cycles until a shutdown signal arrives.
    ///
    /// Shutdown is only observed between cycles.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            cpu_workers = self.config.cpu_workers,
            memory_workers = self.config.memory_workers,
            "Starting poll loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down poll loop");
                    break;
                }
            }
        }
    }

    /// Run one cycle and report its outcome
    async fn tick(&self) {
        match self.run_cycle().await {
            Ok(report) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_cycle(&report);
                }
                if let Some(health) = &self.health {
                    health.record_cycle_success(report.failed_samples).await;
                }
                if let Some(logger) = &self.logger {
                    logger.log_cycle(&report);
                }
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_cycle_failures();
                }
                if let Some(health) = &self.health {
                    health.record_cycle_failure(e.to_string()).await;
                }
                match &self.logger {
                    Some(logger) => logger.log_cycle_aborted(&e.to_string()),
                    None => warn!(error = %e, "Poll cycle aborted"),
                }
            }
        }
    }

    /// Run every phase of one cycle.
    ///
    /// Only a listing failure aborts the cycle; in that case the registry is
    /// left exactly as the previous cycle published it.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let start = Instant::now();

        enter(CyclePhase::ListContainers);
        let containers = self
            .engine
            .list_containers()
            .await
            .map_err(CycleError::ListContainers)?;

        enter(CyclePhase::ProbeCapacity);
        let capacity = probe_capacity(self.engine.as_ref(), &containers).await;

        enter(CyclePhase::CollectCpu);
        let cpu = fan_out(
            Arc::clone(&self.engine),
            &containers,
            MetricKind::Cpu,
            capacity,
            self.config.cpu_workers,
        )
        .await;

        enter(CyclePhase::CollectMemory);
        let memory = fan_out(
            Arc::clone(&self.engine),
            &containers,
            MetricKind::Memory,
            capacity,
            self.config.memory_workers,
        )
        .await;

        enter(CyclePhase::Reconcile);
        self.registry.replace_states(&containers);
        let removed = self
            .registry
            .reconcile(MetricKind::Cpu, &cpu.samples, &containers)
            + self
                .registry
                .reconcile(MetricKind::Memory, &memory.samples, &containers);

        enter(CyclePhase::Publish);
        self.registry
            .publish_totals(capacity, cpu.total, memory.total);

        let report = CycleReport {
            containers_listed: containers.len(),
            capacity,
            total_cpu_percent: cpu.total,
            total_memory_mb: memory.total,
            failed_samples: cpu.failed + memory.failed,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            containers = report.containers_listed,
            removed_series = removed,
            elapsed_ms = report.elapsed_ms,
            "Cycle complete"
        );

        Ok(report)
    }
}

fn enter(phase: CyclePhase) {
    debug!(phase = %phase, "Entering cycle phase");
}

/// Builder for creating the poll loop
pub struct PollLoopBuilder {
    engine: Option<Arc<dyn ContainerEngine>>,
    registry: Option<Arc<MetricRegistry>>,
    config: PollConfig,
    metrics: Option<ExporterMetrics>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl PollLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            engine: None,
            registry: None,
            config: PollConfig::default(),
            metrics: None,
            health: None,
            logger: None,
        }
    }

    /// Set the container engine
    pub fn engine(mut self, engine: Arc<dyn ContainerEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the metric registry
    pub fn registry(mut self, registry: Arc<MetricRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the poll interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the worker limit for CPU collection
    pub fn cpu_workers(mut self, workers: usize) -> Self {
        self.config.cpu_workers = workers;
        self
    }

    /// Set the worker limit for memory collection
    pub fn memory_workers(mut self, workers: usize) -> Self {
        self.config.memory_workers = workers;
        self
    }

    pub fn metrics(mut self, metrics: ExporterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the poll loop
    pub fn build(self) -> Result<PollLoop> {
        let engine = self
            .engine
            .ok_or_else(|| anyhow::anyhow!("Container engine is required"))?;
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("Metric registry is required"))?;

        if self.config.interval.is_zero() {
            anyhow::bail!("Poll interval must be greater than zero");
        }
        if self.config.cpu_workers == 0 || self.config.memory_workers == 0 {
            anyhow::bail!("Worker limits must be greater than zero");
        }

        Ok(PollLoop {
            engine,
            registry,
            config: self.config,
            metrics: self.metrics,
            health: self.health,
            logger: self.logger,
        })
    }
}

impl Default for PollLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
