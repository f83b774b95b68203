//! Container engine access
//!
//! The exporter only needs two calls from the engine: list every container
//! (any state) and take a single-shot stats reading for one of them.

mod docker;

pub use docker::{normalize_host, DockerClient, StatsResponse};

use crate::models::{ContainerHandle, CounterSnapshot};
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a container engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("request to container engine failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("container engine returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed stats response: {0}")]
    MalformedStats(String),

    #[error("invalid engine host: {0}")]
    InvalidHost(String),
}

/// Source of container inventory and per-container counters
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// List all containers, including stopped ones
    async fn list_containers(&self) -> Result<Vec<ContainerHandle>, EngineError>;

    /// Take one stats reading for a container
    async fn stats(&self, container: &ContainerHandle) -> Result<CounterSnapshot, EngineError>;
}
