//! Docker Engine HTTP API client
//!
//! Talks to a Docker daemon exposed over TCP (e.g. `tcp://host.docker.internal:2375`):
//! - `GET /containers/json?all=true` for the inventory
//! - `GET /containers/{id}/stats?stream=false` for one stats reading

use super::{ContainerEngine, EngineError};
use crate::models::{ContainerHandle, ContainerStatus, CounterSnapshot};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Client for the Docker Engine API
pub struct DockerClient {
    client: Client,
    base_url: Url,
}

impl DockerClient {
    /// Create a new client for `host` with a per-request timeout
    pub fn new(host: &str, timeout: Duration) -> Result<Self, EngineError> {
        let base_url = normalize_host(host)?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, EngineError> {
        self.base_url
            .join(path)
            .map_err(|e| EngineError::InvalidHost(format!("{}: {}", path, e)))
    }

    async fn get(&self, url: Url) -> Result<Response, EngineError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Status {
                status,
                body: body.trim().to_string(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ContainerEngine for DockerClient {
    async fn list_containers(&self) -> Result<Vec<ContainerHandle>, EngineError> {
        let mut url = self.endpoint("containers/json")?;
        url.query_pairs_mut().append_pair("all", "true");

        let summaries: Vec<ContainerSummary> = self.get(url).await?.json().await?;
        debug!(count = summaries.len(), "Listed containers");

        Ok(summaries.into_iter().map(ContainerSummary::into_handle).collect())
    }

    async fn stats(&self, container: &ContainerHandle) -> Result<CounterSnapshot, EngineError> {
        let mut url = self.endpoint(&format!("containers/{}/stats", container.id))?;
        url.query_pairs_mut().append_pair("stream", "false");

        let body = self.get(url).await?.bytes().await?;
        let stats: StatsResponse = serde_json::from_slice(&body)
            .map_err(|e| EngineError::MalformedStats(e.to_string()))?;

        stats.into_snapshot()
    }
}

/// Turn a configured engine host into an HTTP base URL.
///
/// `tcp://` is rewritten to `http://`; unix sockets are rejected.
pub fn normalize_host(host: &str) -> Result<Url, EngineError> {
    let host = host.trim();
    let rewritten = if let Some(rest) = host.strip_prefix("tcp://") {
        format!("http://{}", rest)
    } else if host.starts_with("unix://") {
        return Err(EngineError::InvalidHost(format!(
            "{} (only tcp:// and http(s):// hosts are supported)",
            host
        )));
    } else if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    };

    let rewritten = if rewritten.ends_with('/') {
        rewritten
    } else {
        format!("{}/", rewritten)
    };

    Url::parse(&rewritten).map_err(|e| EngineError::InvalidHost(format!("{}: {}", host, e)))
}

/// Entry of `GET /containers/json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerSummary {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    state: String,
}

impl ContainerSummary {
    fn into_handle(self) -> ContainerHandle {
        // Docker prefixes names with '/'
        let name = self
            .names
            .first()
            .map(|n| n.trim_start_matches('/').to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.id.chars().take(12).collect());

        ContainerHandle::new(self.id, name, ContainerStatus::from_state(&self.state))
    }
}

/// Body of `GET /containers/{id}/stats?stream=false`
#[derive(Debug, Default, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    cpu_stats: CpuStats,
    #[serde(default)]
    precpu_stats: CpuStats,
    #[serde(default)]
    memory_stats: MemoryStats,
}

#[derive(Debug, Default, Deserialize)]
struct CpuStats {
    #[serde(default)]
    cpu_usage: CpuUsage,
    system_cpu_usage: Option<u64>,
    online_cpus: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CpuUsage {
    total_usage: Option<u64>,
    percpu_usage: Option<Vec<u64>>,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryStats {
    usage: Option<u64>,
    limit: Option<u64>,
}

impl StatsResponse {
    /// Convert the engine document into a counter snapshot.
    ///
    /// Only the container CPU counter is required. The engine omits the system
    /// counter and memory figures for containers that are not running; a
    /// missing system counter reads as zero, and missing memory is left for
    /// the memory sampler to reject. Previous-sample counters fall back to the
    /// current ones when the engine has no earlier reading, which yields a
    /// zero delta.
    pub fn into_snapshot(self) -> Result<CounterSnapshot, EngineError> {
        let cpu_usage_ns = self
            .cpu_stats
            .cpu_usage
            .total_usage
            .ok_or_else(|| missing("cpu_stats.cpu_usage.total_usage"))?;
        let system_cpu_ns = self.cpu_stats.system_cpu_usage.unwrap_or(0);

        let online_cpus = match self.cpu_stats.online_cpus {
            Some(n) => n,
            None => self
                .cpu_stats
                .cpu_usage
                .percpu_usage
                .as_ref()
                .map(|per_cpu| per_cpu.len() as u32)
                .unwrap_or(0),
        };

        Ok(CounterSnapshot {
            cpu_usage_ns,
            prev_cpu_usage_ns: self.precpu_stats.cpu_usage.total_usage.unwrap_or(cpu_usage_ns),
            system_cpu_ns,
            prev_system_cpu_ns: self.precpu_stats.system_cpu_usage.unwrap_or(system_cpu_ns),
            online_cpus,
            mem_usage_bytes: self.memory_stats.usage,
            mem_limit_bytes: self.memory_stats.limit,
        })
    }
}

fn missing(field: &str) -> EngineError {
    EngineError::MalformedStats(format!("missing {}", field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::sample_container;
    use crate::models::{HostCapacity, MetricKind};
    use mockito::Matcher;

    const STATS_BODY: &str = r#"{
        "read": "2024-05-01T10:00:01Z",
        "cpu_stats": {
            "cpu_usage": { "total_usage": 2000000000, "percpu_usage": [1000000000, 1000000000] },
            "system_cpu_usage": 10000000000,
            "online_cpus": 4
        },
        "precpu_stats": {
            "cpu_usage": { "total_usage": 1000000000 },
            "system_cpu_usage": 5000000000,
            "online_cpus": 4
        },
        "memory_stats": { "usage": 1572864, "limit": 8589934592 }
    }"#;

    /// What the engine returns for a created or exited container
    const IDLE_STATS_BODY: &str = r#"{
        "read": "0001-01-01T00:00:00Z",
        "preread": "0001-01-01T00:00:00Z",
        "pids_stats": {},
        "blkio_stats": {},
        "num_procs": 0,
        "storage_stats": {},
        "cpu_stats": { "cpu_usage": { "total_usage": 0, "usage_in_kernelmode": 0, "usage_in_usermode": 0 }, "throttling_data": {} },
        "precpu_stats": { "cpu_usage": { "total_usage": 0, "usage_in_kernelmode": 0, "usage_in_usermode": 0 }, "throttling_data": {} },
        "memory_stats": {}
    }"#;

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("tcp://host.docker.internal:2375").unwrap().as_str(),
            "http://host.docker.internal:2375/"
        );
        assert_eq!(
            normalize_host("http://localhost:2375/").unwrap().as_str(),
            "http://localhost:2375/"
        );
        assert_eq!(
            normalize_host("localhost:2375").unwrap().as_str(),
            "http://localhost:2375/"
        );
        assert!(matches!(
            normalize_host("unix:///var/run/docker.sock"),
            Err(EngineError::InvalidHost(_))
        ));
    }

    #[test]
    fn test_stats_into_snapshot() {
        let stats: StatsResponse = serde_json::from_str(STATS_BODY).unwrap();
        let snapshot = stats.into_snapshot().unwrap();

        assert_eq!(snapshot.cpu_usage_ns, 2_000_000_000);
        assert_eq!(snapshot.prev_cpu_usage_ns, 1_000_000_000);
        assert_eq!(snapshot.system_cpu_ns, 10_000_000_000);
        assert_eq!(snapshot.prev_system_cpu_ns, 5_000_000_000);
        assert_eq!(snapshot.online_cpus, 4);
        assert_eq!(snapshot.mem_usage_bytes, Some(1_572_864));
        assert_eq!(snapshot.mem_limit_bytes, Some(8_589_934_592));
    }

    #[test]
    fn test_online_cpus_falls_back_to_percpu() {
        let body = r#"{
            "cpu_stats": {
                "cpu_usage": { "total_usage": 10, "percpu_usage": [4, 3, 2, 1] },
                "system_cpu_usage": 100
            },
            "memory_stats": { "usage": 1, "limit": 2 }
        }"#;
        let stats: StatsResponse = serde_json::from_str(body).unwrap();
        let snapshot = stats.into_snapshot().unwrap();
        assert_eq!(snapshot.online_cpus, 4);
    }

    #[test]
    fn test_missing_precpu_yields_zero_delta() {
        let body = r#"{
            "cpu_stats": {
                "cpu_usage": { "total_usage": 500 },
                "system_cpu_usage": 9000,
                "online_cpus": 2
            },
            "precpu_stats": { "cpu_usage": {} },
            "memory_stats": { "usage": 1, "limit": 2 }
        }"#;
        let stats: StatsResponse = serde_json::from_str(body).unwrap();
        let snapshot = stats.into_snapshot().unwrap();
        assert_eq!(snapshot.prev_cpu_usage_ns, snapshot.cpu_usage_ns);
        assert_eq!(snapshot.prev_system_cpu_ns, snapshot.system_cpu_ns);
    }

    #[test]
    fn test_stopped_container_stats_have_no_memory() {
        // Non-running containers come back with the system counter and memory omitted
        let stats: StatsResponse = serde_json::from_str(IDLE_STATS_BODY).unwrap();
        let snapshot = stats.into_snapshot().unwrap();

        assert_eq!(snapshot.system_cpu_ns, 0);
        assert_eq!(snapshot.mem_usage_bytes, None);
        assert_eq!(snapshot.mem_limit_bytes, None);
    }

    #[test]
    fn test_cpu_counters_without_memory_stats() {
        let body = r#"{
            "cpu_stats": {
                "cpu_usage": { "total_usage": 2000 },
                "system_cpu_usage": 10000,
                "online_cpus": 2
            },
            "precpu_stats": {
                "cpu_usage": { "total_usage": 1000 },
                "system_cpu_usage": 5000
            },
            "memory_stats": {}
        }"#;
        let stats: StatsResponse = serde_json::from_str(body).unwrap();
        let snapshot = stats.into_snapshot().unwrap();

        assert_eq!(snapshot.cpu_usage_ns, 2000);
        assert_eq!(snapshot.system_cpu_ns, 10000);
        assert_eq!(snapshot.mem_usage_bytes, None);
    }

    #[test]
    fn test_missing_cpu_total_is_malformed() {
        let body = r#"{ "cpu_stats": {}, "memory_stats": { "usage": 1, "limit": 2 } }"#;
        let stats: StatsResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(
            stats.into_snapshot(),
            Err(EngineError::MalformedStats(_))
        ));
    }

    #[test]
    fn test_summary_name_strips_slash() {
        let summary = ContainerSummary {
            id: "0123456789abcdef0123".to_string(),
            names: vec!["/web".to_string()],
            state: "running".to_string(),
        };
        let handle = summary.into_handle();
        assert_eq!(handle.name, "web");
        assert_eq!(handle.status, ContainerStatus::Running);

        let unnamed = ContainerSummary {
            id: "0123456789abcdef0123".to_string(),
            names: vec![],
            state: "created".to_string(),
        };
        assert_eq!(unnamed.into_handle().name, "0123456789ab");
    }

    #[tokio::test]
    async fn test_list_containers_over_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/containers/json")
            .match_query(Matcher::UrlEncoded("all".into(), "true".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"Id": "aaa", "Names": ["/web"], "State": "running"},
                    {"Id": "bbb", "Names": ["/db"], "State": "exited"}
                ]"#,
            )
            .create_async()
            .await;

        let client = DockerClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let containers = client.list_containers().await.unwrap();

        mock.assert_async().await;
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "web");
        assert_eq!(containers[1].status, ContainerStatus::Exited);
    }

    #[tokio::test]
    async fn test_stats_over_http() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/containers/aaa/stats")
            .match_query(Matcher::UrlEncoded("stream".into(), "false".into()))
            .with_status(200)
            .with_body(STATS_BODY)
            .create_async()
            .await;

        let client = DockerClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let handle = ContainerHandle::new("aaa", "web", ContainerStatus::Running);
        let snapshot = client.stats(&handle).await.unwrap();

        assert_eq!(snapshot.online_cpus, 4);
    }

    #[tokio::test]
    async fn test_stats_for_removed_container() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/containers/gone/stats")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"message":"No such container: gone"}"#)
            .create_async()
            .await;

        let client = DockerClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let handle = ContainerHandle::new("gone", "gone", ContainerStatus::Running);

        match client.stats(&handle).await {
            Err(EngineError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_created_container_cpu_sample_over_http() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/containers/fresh-id/stats")
            .match_query(Matcher::UrlEncoded("stream".into(), "false".into()))
            .with_status(200)
            .with_body(IDLE_STATS_BODY)
            .expect(2)
            .create_async()
            .await;

        let client = DockerClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let handle = ContainerHandle::new("fresh-id", "fresh", ContainerStatus::Created);
        let capacity = HostCapacity {
            cpu_percent_available: 400.0,
            memory_mb_available: 8192.0,
        };

        let cpu = sample_container(&client, &handle, MetricKind::Cpu, capacity).await;
        assert!(!cpu.fetch_failed);
        assert_eq!(cpu.cpu_percent, Some(0.0));

        // The same document has nothing to offer the memory sampler
        let memory = sample_container(&client, &handle, MetricKind::Memory, capacity).await;
        assert!(memory.fetch_failed);
        assert_eq!(memory.mem_used_mb, Some(-1.0));
    }
}
