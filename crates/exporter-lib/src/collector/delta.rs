//! CPU and memory figures from a counter snapshot

use crate::models::{CounterSnapshot, BYTES_PER_MB};

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// CPU usage as a share of host capacity (e.g. 0..=600 on a 6-core host).
///
/// Returns 0.0 whenever either counter did not advance inside the snapshot,
/// which is normal right after a container starts.
pub fn cpu_percent(snapshot: &CounterSnapshot, host_cpu_percent_available: f64) -> f64 {
    let container_delta = snapshot.cpu_usage_ns.saturating_sub(snapshot.prev_cpu_usage_ns);
    let system_delta = snapshot.system_cpu_ns.saturating_sub(snapshot.prev_system_cpu_ns);

    if container_delta == 0 || system_delta == 0 || host_cpu_percent_available <= 0.0 {
        return 0.0;
    }

    round2((container_delta as f64 / system_delta as f64) * host_cpu_percent_available)
}

/// Instantaneous memory usage in megabytes, `None` if the engine reported none
pub fn memory_mb(snapshot: &CounterSnapshot) -> Option<f64> {
    snapshot
        .mem_usage_bytes
        .map(|bytes| round2(bytes as f64 / BYTES_PER_MB))
}
