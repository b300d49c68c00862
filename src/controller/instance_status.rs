//! Instance storage status collection
//!
//! The operator does not probe filesystems itself: a storage agent runs next
//! to every PostgreSQL instance, probes the instance's mounts, classifies
//! WAL health, and serves the result as JSON. This module is the operator
//! side: it discovers the cluster's pods by label selector and queries each
//! agent directly on the pod IP.
//!
//! # Requirements
//!
//! **In-cluster deployment**: the operator needs network access to pod IPs.
//! When running outside the cluster, collection fails gracefully and the
//! affected volumes are skipped for the cycle (non-fatal).
//!
//! **Network policies**: if NetworkPolicies restrict traffic to PostgreSQL
//! pods, ensure the operator namespace may connect to the agent port.
//!
//! # Security Notes
//!
//! - The agent is accessed over plain HTTP within the cluster network
//! - No authentication is used for the agent endpoint
//! - Consider a service mesh for mTLS if required

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::Request;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client, ResourceExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::controller::disk::VolumeStats;
use crate::controller::wal_health::WalHealthStatus;

/// Overall timeout for one agent query (connect + request + response)
const OVERALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Storage agent port
pub const AGENT_PORT: u16 = 8010;

/// Label identifying the pods of a cluster
pub const CLUSTER_LABEL: &str = "postgres.example.com/cluster";

/// Maximum valid length for Kubernetes label values (RFC 1123)
const MAX_LABEL_VALUE_LENGTH: usize = 63;

/// Result type for status collection
pub type Result<T> = std::result::Result<T, InstanceStatusError>;

/// Errors that can occur during instance status collection
#[derive(Debug, thiserror::Error)]
pub enum InstanceStatusError {
    /// Kubernetes API error (transient - may be retried)
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// JSON parsing error (permanent - response was malformed)
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Pod IP not available (transient - pod may be starting)
    #[error("Pod IP not available for {0}")]
    NoPodIp(String),

    /// HTTP request error (transient - network issue)
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Connection error (transient - network issue)
    #[error("Connection failed: {0}")]
    ConnectionError(String),

    /// Request timed out (transient)
    #[error("Request timed out")]
    Timeout,

    /// Invalid cluster name for label selector (permanent - configuration error)
    #[error("Invalid cluster name for label selector: {0}")]
    InvalidClusterName(String),
}

/// What one storage agent reports for its instance
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct StorageReport {
    /// Instance (pod) name
    pub instance: String,

    /// Whether this instance is currently the primary
    pub is_primary: bool,

    /// Fresh stats per probed volume, keyed by the volume kind rendering
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeReport>,

    /// WAL health for the instance; absent when the agent could not
    /// determine it (resolved fail-open or fail-closed by policy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wal: Option<WalHealthStatus>,
}

/// Stats for one probed volume
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VolumeReport {
    /// Volume kind rendering ("data", "wal", "tablespace:\<name\>")
    pub kind: String,

    /// Fresh filesystem statistics
    pub stats: VolumeStats,
}

/// Collector for per-instance storage reports
pub struct InstanceStatusCollector {
    client: Client,
    namespace: String,
    cluster_name: String,
}

impl InstanceStatusCollector {
    /// Create a collector for one cluster.
    #[must_use]
    pub fn new(client: Client, namespace: &str, cluster_name: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            cluster_name: cluster_name.to_string(),
        }
    }

    /// Collect storage reports from every reachable instance.
    ///
    /// Unreachable or misbehaving agents are skipped with a warning; their
    /// volumes simply have no fresh stats this cycle. Only pod discovery
    /// itself can fail the whole sweep.
    pub async fn collect(&self) -> Result<Vec<StorageReport>> {
        validate_label_value(&self.cluster_name)?;

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let label_selector = format!("{}={}", CLUSTER_LABEL, self.cluster_name);
        let pod_list = pods
            .list(&kube::api::ListParams::default().labels(&label_selector))
            .await?;

        let mut reports = Vec::new();
        for pod in pod_list.items {
            let pod_name = pod.name_any();
            let Some(pod_ip) = pod.status.as_ref().and_then(|s| s.pod_ip.clone()) else {
                debug!(pod = %pod_name, "pod has no IP yet, skipping");
                continue;
            };

            match timeout(OVERALL_TIMEOUT, query_agent(&pod_ip)).await {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => {
                    warn!(pod = %pod_name, error = %e, "storage agent query failed");
                }
                Err(_) => {
                    warn!(pod = %pod_name, "storage agent query timed out");
                }
            }
        }

        Ok(reports)
    }
}

/// Query one storage agent's `/storage` endpoint via direct HTTP.
async fn query_agent(pod_ip: &str) -> Result<StorageReport> {
    let addr: SocketAddr = format!("{}:{}", pod_ip, AGENT_PORT)
        .parse()
        .map_err(|e| InstanceStatusError::ConnectionError(format!("Invalid address: {}", e)))?;

    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| InstanceStatusError::ConnectionError(e.to_string()))?;

    let io = TokioIo::new(stream);

    let (mut sender, conn) = http1::handshake(io)
        .await
        .map_err(|e| InstanceStatusError::HttpError(e.to_string()))?;

    let req = Request::builder()
        .method("GET")
        .uri("/storage")
        .header("Host", format!("{}:{}", pod_ip, AGENT_PORT))
        .body(Empty::<Bytes>::new())
        .map_err(|e| InstanceStatusError::HttpError(e.to_string()))?;

    // Drive the connection and the request together; the connection task is
    // cancelled once the response is in.
    let response = tokio::select! {
        conn_result = conn => {
            if let Err(e) = conn_result {
                debug!("Connection closed: {}", e);
            }
            return Err(InstanceStatusError::ConnectionError(
                "Connection closed unexpectedly".to_string(),
            ));
        }
        response = sender.send_request(req) => {
            response.map_err(|e| InstanceStatusError::HttpError(e.to_string()))?
        }
    };

    if !response.status().is_success() {
        return Err(InstanceStatusError::HttpError(format!(
            "HTTP {}: {}",
            response.status().as_u16(),
            response.status().canonical_reason().unwrap_or("Unknown")
        )));
    }

    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| InstanceStatusError::HttpError(e.to_string()))?
        .to_bytes();

    serde_json::from_slice(&body).map_err(|e| {
        debug!(
            pod_ip = pod_ip,
            response = %String::from_utf8_lossy(&body),
            error = %e,
            "Failed to parse storage agent response"
        );
        InstanceStatusError::JsonError(e)
    })
}

/// Validate that a string is valid for use in a Kubernetes label selector.
///
/// Label values must:
/// - Be 63 characters or less
/// - Contain only alphanumeric characters, '-', '_', or '.'
/// - Begin and end with an alphanumeric character
fn validate_label_value(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(InstanceStatusError::InvalidClusterName(
            "Cluster name cannot be empty".to_string(),
        ));
    }

    if value.len() > MAX_LABEL_VALUE_LENGTH {
        return Err(InstanceStatusError::InvalidClusterName(format!(
            "Cluster name exceeds {} characters",
            MAX_LABEL_VALUE_LENGTH
        )));
    }

    let chars: Vec<char> = value.chars().collect();

    if !chars.first().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Err(InstanceStatusError::InvalidClusterName(
            "Cluster name must start with alphanumeric character".to_string(),
        ));
    }

    if !chars.last().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Err(InstanceStatusError::InvalidClusterName(
            "Cluster name must end with alphanumeric character".to_string(),
        ));
    }

    for c in &chars {
        if !c.is_ascii_alphanumeric() && *c != '-' && *c != '_' && *c != '.' {
            return Err(InstanceStatusError::InvalidClusterName(format!(
                "Invalid character '{}' in cluster name",
                c
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_label_value_valid() {
        assert!(validate_label_value("my-cluster").is_ok());
        assert!(validate_label_value("test123").is_ok());
        assert!(validate_label_value("a").is_ok());
        assert!(validate_label_value("cluster-name-with.dots").is_ok());
    }

    #[test]
    fn test_validate_label_value_invalid() {
        assert!(validate_label_value("").is_err());
        assert!(validate_label_value("-leading").is_err());
        assert!(validate_label_value("trailing-").is_err());
        assert!(validate_label_value("bad@name").is_err());
        assert!(validate_label_value(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_report_round_trip() {
        let report = StorageReport {
            instance: "pg-1".to_string(),
            is_primary: true,
            volumes: vec![VolumeReport {
                kind: "data".to_string(),
                stats: VolumeStats {
                    total_bytes: 100,
                    used_bytes: 60,
                    available_bytes: 40,
                    percent_used: 60.0,
                    ..VolumeStats::default()
                },
            }],
            wal: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        let parsed: StorageReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.instance, "pg-1");
        assert_eq!(parsed.volumes.len(), 1);
        assert_eq!(parsed.volumes[0].stats.used_bytes, 60);
    }

    #[test]
    fn test_report_tolerates_missing_optional_fields() {
        let parsed: StorageReport =
            serde_json::from_str(r#"{"instance":"pg-2","isPrimary":false}"#).unwrap();
        assert!(parsed.volumes.is_empty());
        assert!(parsed.wal.is_none());
    }
}
