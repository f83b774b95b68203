//! Published metric state
//!
//! Holds the last value published per (metric kind, container name) and the
//! Prometheus gauges that mirror it. The orchestrator is the only writer;
//! the HTTP handler gathers from the same registry at any time. Each gauge
//! write is atomic on its own, but a reconciliation pass is not atomic as a
//! whole.

use crate::models::{ContainerHandle, HostCapacity, MetricKind, MetricSample};
use anyhow::{Context, Result};
use dashmap::DashMap;
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashSet;
use tracing::debug;

const NAME_LABEL: &str = "name";

/// Aggregate gauge values
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub cpu_used_percent: f64,
    pub cpu_available_percent: f64,
    pub memory_used_mb: f64,
    pub memory_available_mb: f64,
}

/// Process-wide metric registry, constructed at startup and shared by `Arc`
pub struct MetricRegistry {
    registry: Registry,
    entries: DashMap<(MetricKind, String), f64>,
    container_state: GaugeVec,
    container_cpu_percent: GaugeVec,
    container_memory_used_mb: GaugeVec,
    total_cpu_used_percent: Gauge,
    total_cpu_available_percent: Gauge,
    total_memory_used_mb: Gauge,
    total_memory_available_mb: Gauge,
}

impl MetricRegistry {
    /// Create the registry and register every exported gauge
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let container_state = register_gauge_vec(
            &registry,
            "docker_container_state",
            "State of Docker containers (1=running, 0.5=created, 0=other)",
        )?;
        let container_cpu_percent = register_gauge_vec(
            &registry,
            "docker_container_cpu_percent",
            "CPU usage percentage per container",
        )?;
        let container_memory_used_mb = register_gauge_vec(
            &registry,
            "docker_container_memory_used_mb",
            "Memory usage in megabytes per container",
        )?;
        let total_cpu_used_percent = register_gauge(
            &registry,
            "docker_total_cpu_used_percent",
            "Total CPU usage percentage for all running containers",
        )?;
        let total_cpu_available_percent = register_gauge(
            &registry,
            "docker_total_cpu_available_percent",
            "Total available CPU percentage on the Docker host (100% * nb_cores)",
        )?;
        let total_memory_used_mb = register_gauge(
            &registry,
            "docker_total_memory_used_mb",
            "Total memory usage in megabytes for all running containers",
        )?;
        let total_memory_available_mb = register_gauge(
            &registry,
            "docker_total_memory_available_mb",
            "Total memory available in megabytes on the Docker host",
        )?;

        Ok(Self {
            registry,
            entries: DashMap::new(),
            container_state,
            container_cpu_percent,
            container_memory_used_mb,
            total_cpu_used_percent,
            total_cpu_available_percent,
            total_memory_used_mb,
            total_memory_available_mb,
        })
    }

    /// Underlying Prometheus registry, for registering extra collectors
    pub fn prometheus(&self) -> &Registry {
        &self.registry
    }

    fn gauge_vec(&self, kind: MetricKind) -> &GaugeVec {
        match kind {
            MetricKind::State => &self.container_state,
            MetricKind::Cpu => &self.container_cpu_percent,
            MetricKind::Memory => &self.container_memory_used_mb,
        }
    }

    fn set(&self, kind: MetricKind, name: &str, value: f64) {
        self.gauge_vec(kind).with_label_values(&[name]).set(value);
        self.entries.insert((kind, name.to_string()), value);
    }

    fn remove(&self, kind: MetricKind, name: &str) {
        if let Err(e) = self.gauge_vec(kind).remove_label_values(&[name]) {
            debug!(kind = %kind, container = %name, error = %e, "Series already absent");
        }
        self.entries.remove(&(kind, name.to_string()));
    }

    /// Clear the container state gauge and rewrite it from `containers`
    pub fn replace_states(&self, containers: &[ContainerHandle]) {
        self.container_state.reset();
        self.entries.retain(|(kind, _), _| *kind != MetricKind::State);

        for container in containers {
            self.set(MetricKind::State, &container.name, container.status.gauge_value());
        }
    }

    /// Upsert this cycle's samples for `kind` and delete entries for
    /// containers that are no longer eligible or no longer listed.
    ///
    /// Returns the number of removed series.
    pub fn reconcile(
        &self,
        kind: MetricKind,
        samples: &[MetricSample],
        containers: &[ContainerHandle],
    ) -> usize {
        if kind == MetricKind::State {
            self.replace_states(containers);
            return 0;
        }

        for sample in samples {
            if let Some(value) = sample.value(kind) {
                self.set(kind, &sample.name, value);
            }
        }

        let eligible: HashSet<&str> = containers
            .iter()
            .filter(|c| c.status.is_eligible(kind))
            .map(|c| c.name.as_str())
            .collect();

        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == kind && !eligible.contains(entry.key().1.as_str()))
            .map(|entry| entry.key().1.clone())
            .collect();

        for name in &stale {
            debug!(kind = %kind, container = %name, "Removing stale series");
            self.remove(kind, name);
        }

        stale.len()
    }

    /// Set the aggregate gauges for this cycle
    pub fn publish_totals(&self, capacity: HostCapacity, cpu_used: f64, memory_used: f64) {
        self.total_cpu_used_percent.set(cpu_used);
        self.total_cpu_available_percent
            .set(capacity.cpu_percent_available);
        self.total_memory_used_mb.set(memory_used);
        self.total_memory_available_mb
            .set(capacity.memory_mb_available);
    }

    /// Last published value for a container
    pub fn value(&self, kind: MetricKind, name: &str) -> Option<f64> {
        self.entries
            .get(&(kind, name.to_string()))
            .map(|entry| *entry.value())
    }

    /// Container names that currently have a series for `kind`, sorted
    pub fn names(&self, kind: MetricKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| entry.key().1.clone())
            .collect();
        names.sort();
        names
    }

    pub fn totals(&self) -> Totals {
        Totals {
            cpu_used_percent: self.total_cpu_used_percent.get(),
            cpu_available_percent: self.total_cpu_available_percent.get(),
            memory_used_mb: self.total_memory_used_mb.get(),
            memory_available_mb: self.total_memory_available_mb.get(),
        }
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not valid UTF-8")
    }
}

fn register_gauge_vec(registry: &Registry, name: &str, help: &str) -> Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), &[NAME_LABEL])
        .with_context(|| format!("Failed to create {}", name))?;
    registry
        .register(Box::new(gauge.clone()))
        .with_context(|| format!("Failed to register {}", name))?;
    Ok(gauge)
}

fn register_gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge> {
    let gauge = Gauge::with_opts(Opts::new(name, help))
        .with_context(|| format!("Failed to create {}", name))?;
    registry
        .register(Box::new(gauge.clone()))
        .with_context(|| format!("Failed to register {}", name))?;
    Ok(gauge)
}
