//! Host capacity probe
//!
//! The engine only exposes host limits through a container's cgroup view, so
//! one listed container stands in for the host. The engine lists newest
//! first, and a created or exited container reports no CPU count or memory
//! limit, so the first running container is preferred.

use crate::engine::ContainerEngine;
use crate::models::{ContainerHandle, ContainerStatus, HostCapacity};
use tracing::{debug, warn};

/// Derive this cycle's host capacity from one container's stats.
///
/// An empty list or a failed fetch yields zero capacity. With no running
/// container the first listed one is used, which reads as zero capacity.
pub async fn probe_capacity(
    engine: &dyn ContainerEngine,
    containers: &[ContainerHandle],
) -> HostCapacity {
    let representative = containers
        .iter()
        .find(|c| c.status == ContainerStatus::Running)
        .or_else(|| containers.first());

    let Some(representative) = representative else {
        debug!("No containers listed, host capacity is zero");
        return HostCapacity::zero();
    };

    match engine.stats(representative).await {
        Ok(snapshot) => {
            let capacity = HostCapacity::from_snapshot(&snapshot);
            debug!(
                container = %representative.name,
                cpu_percent_available = capacity.cpu_percent_available,
                memory_mb_available = capacity.memory_mb_available,
                "Host capacity probed"
            );
            capacity
        }
        Err(e) => {
            warn!(
                container = %representative.name,
                error = %e,
                "Host capacity probe failed, using zero capacity for this cycle"
            );
            HostCapacity::zero()
        }
    }
}
