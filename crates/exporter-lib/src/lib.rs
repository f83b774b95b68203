//! Docker host exporter library
//!
//! This crate provides the core functionality for:
//! - Listing containers and reading their stats from the Docker Engine API
//! - Turning cumulative CPU counters into host-relative percentages
//! - Sampling every container under a worker limit on a fixed interval
//! - Publishing per-container and aggregate gauges for Prometheus
//! - Health checks and observability

pub mod api;
pub mod collector;
pub mod engine;
pub mod health;
pub mod models;
pub mod observability;
pub mod registry;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ExporterMetrics, StructuredLogger};
pub use registry::{MetricRegistry, Totals};
