//! Exporter configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Exporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Docker Engine API address (tcp:// or http://)
    #[serde(default = "default_docker_host")]
    pub docker_host: String,

    /// Port serving /metrics, /healthz and /readyz
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Concurrent stats requests during CPU collection
    #[serde(default = "default_cpu_workers")]
    pub cpu_workers: usize,

    /// Concurrent stats requests during memory collection
    #[serde(default = "default_memory_workers")]
    pub memory_workers: usize,

    /// Timeout for a single engine request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_docker_host() -> String {
    "tcp://host.docker.internal:2375".to_string()
}

fn default_listen_port() -> u16 {
    8000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_cpu_workers() -> usize {
    50
}

fn default_memory_workers() -> usize {
    10
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            docker_host: default_docker_host(),
            listen_port: default_listen_port(),
            poll_interval_ms: default_poll_interval_ms(),
            cpu_workers: default_cpu_workers(),
            memory_workers: default_memory_workers(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from an optional `docker-exporter` file and
    /// `EXPORTER_*` environment variables (environment wins)
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("docker-exporter").required(false))
            .add_source(config::Environment::with_prefix("EXPORTER"))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid exporter configuration")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
