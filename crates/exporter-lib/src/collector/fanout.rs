//! Bounded fan-out of per-container samplers
//!
//! Every eligible container gets its own task, but at most `max_workers`
//! stats requests are in flight at once. All tasks are joined before the
//! aggregate is computed.

use super::delta::round2;
use super::sampler::sample_container;
use crate::engine::ContainerEngine;
use crate::models::{ContainerHandle, HostCapacity, MetricKind, MetricSample};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Samples and aggregate for one metric kind
#[derive(Debug, Clone, Default)]
pub struct FanOutResult {
    pub samples: Vec<MetricSample>,
    pub total: f64,
    pub failed: usize,
}

/// Sample every container eligible for `kind` and wait for all of them
pub async fn fan_out(
    engine: Arc<dyn ContainerEngine>,
    containers: &[ContainerHandle],
    kind: MetricKind,
    capacity: HostCapacity,
    max_workers: usize,
) -> FanOutResult {
    let permits = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut tasks = JoinSet::new();

    for container in containers.iter().filter(|c| c.status.is_eligible(kind)) {
        let engine = Arc::clone(&engine);
        let permits = Arc::clone(&permits);
        let container = container.clone();

        tasks.spawn(async move {
            // The semaphore is never closed, so the permit is always granted
            let _permit = permits.acquire_owned().await.ok();
            sample_container(engine.as_ref(), &container, kind, capacity).await
        });
    }

    let mut samples = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(sample) => samples.push(sample),
            Err(e) => warn!(kind = %kind, error = %e, "Sampler task did not complete"),
        }
    }

    // A sampler that panicked still owes its container a sentinel
    let reported: HashSet<String> = samples.iter().map(|s| s.name.clone()).collect();
    for container in containers.iter().filter(|c| c.status.is_eligible(kind)) {
        if !reported.contains(&container.name) {
            samples.push(MetricSample::failed(&container.name, kind));
        }
    }
    samples.sort_by(|a, b| a.name.cmp(&b.name));

    let failed = samples.iter().filter(|s| s.fetch_failed).count();
    let total = aggregate(&samples, kind);
    debug!(
        kind = %kind,
        sampled = samples.len(),
        failed = failed,
        total = total,
        "Fan-out complete"
    );

    FanOutResult {
        samples,
        total,
        failed,
    }
}

/// Sum of the values of samples whose fetch succeeded, rounded to 2 places
pub fn aggregate(samples: &[MetricSample], kind: MetricKind) -> f64 {
    let sum: f64 = samples
        .iter()
        .filter(|s| !s.fetch_failed)
        .filter_map(|s| s.value(kind))
        .sum();
    round2(sum)
}
