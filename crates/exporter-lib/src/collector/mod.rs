//! Snapshot-diff sampling of container counters
//!
//! This module turns per-container stats readings into CPU and memory
//! figures, fans the readings out over the container set under a worker
//! limit, and drives the fixed-interval poll cycle that publishes them.

mod capacity;
mod delta;
mod fanout;
mod r#loop;
mod sampler;


pub use capacity::probe_capacity;
pub use delta::{cpu_percent, memory_mb, round2};
pub use fanout::{aggregate, fan_out, FanOutResult};
pub use r#loop::{CycleError, CyclePhase, PollConfig, PollLoop, PollLoopBuilder};
pub use sampler::{sample_container, CPU_SENTINEL, MEMORY_SENTINEL};
