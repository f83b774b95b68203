//! Core data models for the exporter

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes per megabyte used for all memory conversions
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Lifecycle status of a container as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Running,
    Created,
    Exited,
    Other(String),
}

impl ContainerStatus {
    /// Parse the engine's `State` string
    pub fn from_state(state: &str) -> Self {
        match state {
            "running" => ContainerStatus::Running,
            "created" => ContainerStatus::Created,
            "exited" => ContainerStatus::Exited,
            other => ContainerStatus::Other(other.to_string()),
        }
    }

    /// Value published on the container state gauge
    pub fn gauge_value(&self) -> f64 {
        match self {
            ContainerStatus::Running => 1.0,
            ContainerStatus::Created => 0.5,
            _ => 0.0,
        }
    }

    /// Whether a container in this state has a value for the given metric kind
    pub fn is_eligible(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::State => true,
            MetricKind::Cpu => {
                matches!(self, ContainerStatus::Running | ContainerStatus::Created)
            }
            MetricKind::Memory => matches!(self, ContainerStatus::Running),
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerStatus::Running => f.write_str("running"),
            ContainerStatus::Created => f.write_str("created"),
            ContainerStatus::Exited => f.write_str("exited"),
            ContainerStatus::Other(state) => f.write_str(state),
        }
    }
}

/// A container as listed at the start of a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    pub status: ContainerStatus,
}

impl ContainerHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: ContainerStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
        }
    }
}

/// One stats read for one container.
///
/// The `prev_*` counters come from the same engine call as the current ones,
/// paired by the engine's own sampling window. Memory counters are absent
/// for containers that are not running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub cpu_usage_ns: u64,
    pub prev_cpu_usage_ns: u64,
    pub system_cpu_ns: u64,
    pub prev_system_cpu_ns: u64,
    pub online_cpus: u32,
    pub mem_usage_bytes: Option<u64>,
    pub mem_limit_bytes: Option<u64>,
}

/// Host resource ceiling as seen through one container's cgroup.
///
/// Only valid for the cycle that produced it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HostCapacity {
    pub cpu_percent_available: f64,
    pub memory_mb_available: f64,
}

impl HostCapacity {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: &CounterSnapshot) -> Self {
        Self {
            cpu_percent_available: f64::from(snapshot.online_cpus) * 100.0,
            memory_mb_available: crate::collector::round2(
                snapshot.mem_limit_bytes.unwrap_or(0) as f64 / BYTES_PER_MB,
            ),
        }
    }
}

/// Metric families maintained per container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    State,
    Cpu,
    Memory,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::State => f.write_str("state"),
            MetricKind::Cpu => f.write_str("cpu"),
            MetricKind::Memory => f.write_str("memory"),
        }
    }
}

/// Output of one per-container sampler run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub cpu_percent: Option<f64>,
    pub mem_used_mb: Option<f64>,
    /// The stats fetch failed and the populated value is a sentinel
    pub fetch_failed: bool,
}

impl MetricSample {
    pub fn cpu(name: impl Into<String>, cpu_percent: f64) -> Self {
        Self {
            name: name.into(),
            cpu_percent: Some(cpu_percent),
            mem_used_mb: None,
            fetch_failed: false,
        }
    }

    pub fn memory(name: impl Into<String>, mem_used_mb: f64) -> Self {
        Self {
            name: name.into(),
            cpu_percent: None,
            mem_used_mb: Some(mem_used_mb),
            fetch_failed: false,
        }
    }

    /// Sample carrying the sentinel for `kind`
    pub fn failed(name: impl Into<String>, kind: MetricKind) -> Self {
        let name = name.into();
        let mut sample = match kind {
            MetricKind::Memory => Self::memory(name, crate::collector::MEMORY_SENTINEL),
            _ => Self::cpu(name, crate::collector::CPU_SENTINEL),
        };
        sample.fetch_failed = true;
        sample
    }

    pub fn value(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::Cpu => self.cpu_percent,
            MetricKind::Memory => self.mem_used_mb,
            MetricKind::State => None,
        }
    }
}

/// Summary of one completed poll cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleReport {
    pub containers_listed: usize,
    pub capacity: HostCapacity,
    pub total_cpu_percent: f64,
    pub total_memory_mb: f64,
    pub failed_samples: usize,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(ContainerStatus::from_state("running"), ContainerStatus::Running);
        assert_eq!(ContainerStatus::from_state("created"), ContainerStatus::Created);
        assert_eq!(ContainerStatus::from_state("exited"), ContainerStatus::Exited);
        assert_eq!(
            ContainerStatus::from_state("paused"),
            ContainerStatus::Other("paused".to_string())
        );
    }

    #[test]
    fn test_status_gauge_values() {
        assert_eq!(ContainerStatus::Running.gauge_value(), 1.0);
        assert_eq!(ContainerStatus::Created.gauge_value(), 0.5);
        assert_eq!(ContainerStatus::Exited.gauge_value(), 0.0);
        assert_eq!(ContainerStatus::Other("dead".into()).gauge_value(), 0.0);
    }

    #[test]
    fn test_eligibility() {
        assert!(ContainerStatus::Running.is_eligible(MetricKind::Cpu));
        assert!(ContainerStatus::Created.is_eligible(MetricKind::Cpu));
        assert!(!ContainerStatus::Exited.is_eligible(MetricKind::Cpu));

        assert!(ContainerStatus::Running.is_eligible(MetricKind::Memory));
        assert!(!ContainerStatus::Created.is_eligible(MetricKind::Memory));
    }

    #[test]
    fn test_host_capacity_from_snapshot() {
        let snapshot = CounterSnapshot {
            online_cpus: 6,
            mem_limit_bytes: Some(8 * 1024 * 1024 * 1024),
            ..Default::default()
        };
        let capacity = HostCapacity::from_snapshot(&snapshot);
        assert_eq!(capacity.cpu_percent_available, 600.0);
        assert_eq!(capacity.memory_mb_available, 8192.0);
    }

    #[test]
    fn test_host_capacity_without_memory_limit() {
        let snapshot = CounterSnapshot {
            online_cpus: 2,
            ..Default::default()
        };
        let capacity = HostCapacity::from_snapshot(&snapshot);
        assert_eq!(capacity.cpu_percent_available, 200.0);
        assert_eq!(capacity.memory_mb_available, 0.0);
    }

    #[test]
    fn test_failed_sample_sentinels() {
        let cpu = MetricSample::failed("web", MetricKind::Cpu);
        assert!(cpu.fetch_failed);
        assert_eq!(cpu.value(MetricKind::Cpu), Some(0.0));
        assert_eq!(cpu.value(MetricKind::Memory), None);

        let mem = MetricSample::failed("web", MetricKind::Memory);
        assert_eq!(mem.value(MetricKind::Memory), Some(-1.0));
    }
}
