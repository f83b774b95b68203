//! Per-container sampling

use super::delta::{cpu_percent, memory_mb};
use crate::engine::ContainerEngine;
use crate::models::{ContainerHandle, HostCapacity, MetricKind, MetricSample};
use tracing::{debug, warn};

/// Published CPU value when the stats fetch fails
pub const CPU_SENTINEL: f64 = 0.0;

/// Published memory value when the stats fetch fails
pub const MEMORY_SENTINEL: f64 = -1.0;

/// Fetch one snapshot for `container` and derive the value for `kind`.
///
/// Never fails: a fetch error produces a sentinel sample for that kind only.
pub async fn sample_container(
    engine: &dyn ContainerEngine,
    container: &ContainerHandle,
    kind: MetricKind,
    capacity: HostCapacity,
) -> MetricSample {
    let snapshot = match engine.stats(container).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(
                container = %container.name,
                kind = %kind,
                error = %e,
                "Failed to fetch container stats"
            );
            return MetricSample::failed(&container.name, kind);
        }
    };

    match kind {
        MetricKind::Memory => {
            let Some(used) = memory_mb(&snapshot) else {
                warn!(
                    container = %container.name,
                    "Engine returned no memory usage for container"
                );
                return MetricSample::failed(&container.name, kind);
            };
            debug!(
                container = %container.name,
                used_mb = used,
                available_mb = capacity.memory_mb_available,
                "Memory sampled"
            );
            MetricSample::memory(&container.name, used)
        }
        _ => {
            let percent = cpu_percent(&snapshot, capacity.cpu_percent_available);
            debug!(
                container = %container.name,
                cpu_percent = percent,
                available_percent = capacity.cpu_percent_available,
                "CPU sampled"
            );
            MetricSample::cpu(&container.name, percent)
        }
    }
}
