//! Storage agent: the instance side of status collection
//!
//! Runs next to every PostgreSQL instance, probes the instance's volume
//! mounts, classifies WAL health against the local server, and serves the
//! combined report as JSON for the operator's collector. The agent holds no
//! state and makes no decisions; it only observes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::controller::disk::probe_volume;
use crate::controller::instance_status::{AGENT_PORT, StorageReport, VolumeReport};
use crate::controller::wal_health::{WalHealthChecker, WalHealthStatus};
use crate::crd::VolumeKind;

/// Agent configuration, read from the environment
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Instance (pod) name
    pub instance: String,
    /// Data volume mount
    pub data_mount: PathBuf,
    /// Dedicated WAL volume mount, if one exists
    pub wal_mount: Option<PathBuf>,
    /// Tablespace mounts as (name, path)
    pub tablespace_mounts: Vec<(String, PathBuf)>,
    /// Archive-status directory (`<pgdata>/pg_wal/archive_status`)
    pub archive_status_dir: PathBuf,
    /// Connection string for the local server
    pub pg_conninfo: String,
    /// Pending-archive ceiling for the agent-side health default
    pub max_pending_archive_files: u64,
}

impl AgentConfig {
    /// Read configuration from the environment.
    ///
    /// `POD_NAME` is required; everything else has a sensible default.
    /// `TABLESPACE_MOUNTS` is a comma-separated `name=path` list.
    pub fn from_env() -> Result<Self, String> {
        let instance = std::env::var("POD_NAME").map_err(|_| "POD_NAME is not set".to_string())?;
        let data_mount = PathBuf::from(
            std::env::var("PGDATA").unwrap_or_else(|_| "/var/lib/postgresql/data".to_string()),
        );
        let wal_mount = std::env::var("PGWAL").ok().map(PathBuf::from);
        let tablespace_mounts =
            parse_tablespace_mounts(&std::env::var("TABLESPACE_MOUNTS").unwrap_or_default())?;
        let archive_status_dir = data_mount.join("pg_wal").join("archive_status");
        let pg_conninfo = std::env::var("PGCONN")
            .unwrap_or_else(|_| "host=localhost user=postgres dbname=postgres".to_string());
        let max_pending_archive_files = std::env::var("MAX_PENDING_ARCHIVE_FILES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(32);

        Ok(Self {
            instance,
            data_mount,
            wal_mount,
            tablespace_mounts,
            archive_status_dir,
            pg_conninfo,
            max_pending_archive_files,
        })
    }
}

/// Parse a `name=path,name=path` tablespace mount list.
fn parse_tablespace_mounts(input: &str) -> Result<Vec<(String, PathBuf)>, String> {
    let mut mounts = Vec::new();
    for entry in input.split(',').filter(|e| !e.trim().is_empty()) {
        let (name, path) = entry
            .split_once('=')
            .ok_or_else(|| format!("invalid tablespace mount entry: {}", entry))?;
        if name.trim().is_empty() || path.trim().is_empty() {
            return Err(format!("invalid tablespace mount entry: {}", entry));
        }
        mounts.push((name.trim().to_string(), PathBuf::from(path.trim())));
    }
    Ok(mounts)
}

/// Shared agent state
pub struct AgentState {
    config: AgentConfig,
    /// Lazily established connection to the local server; dropped and
    /// re-established on query failure
    pg: Mutex<Option<tokio_postgres::Client>>,
}

impl AgentState {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            pg: Mutex::new(None),
        }
    }

    /// WAL health, or `None` when it cannot be determined this probe
    /// (the operator resolves that per policy).
    async fn wal_status(&self) -> Option<WalHealthStatus> {
        let mut guard = self.pg.lock().await;

        if guard.is_none() {
            match tokio_postgres::connect(&self.config.pg_conninfo, tokio_postgres::NoTls).await {
                Ok((client, connection)) => {
                    tokio::spawn(async move {
                        if let Err(e) = connection.await {
                            debug!("postgres connection closed: {}", e);
                        }
                    });
                    *guard = Some(client);
                }
                Err(e) => {
                    warn!("cannot connect to local postgres: {}", e);
                    return None;
                }
            }
        }

        let client = guard.as_ref()?;
        let is_primary = match client.query_one("SELECT NOT pg_is_in_recovery()", &[]).await {
            Ok(row) => row.get::<_, bool>(0),
            Err(e) => {
                warn!("primary check failed, dropping connection: {}", e);
                *guard = None;
                return None;
            }
        };

        let checker = WalHealthChecker::new(
            &self.config.archive_status_dir,
            self.config.max_pending_archive_files,
        );
        match checker.check(client, is_primary).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("WAL health check failed: {}", e);
                *guard = None;
                None
            }
        }
    }

    /// Whether the local server currently reports as primary.
    async fn is_primary(&self) -> bool {
        let guard = self.pg.lock().await;
        if let Some(client) = guard.as_ref()
            && let Ok(row) = client.query_one("SELECT NOT pg_is_in_recovery()", &[]).await
        {
            return row.get(0);
        }
        false
    }

    /// Build the full storage report for this instance.
    pub async fn build_report(&self) -> StorageReport {
        let mut volumes = Vec::new();

        probe_into(&mut volumes, &VolumeKind::Data, &self.config.data_mount);
        if let Some(wal_mount) = &self.config.wal_mount {
            probe_into(&mut volumes, &VolumeKind::Wal, wal_mount);
        }
        for (name, path) in &self.config.tablespace_mounts {
            probe_into(&mut volumes, &VolumeKind::Tablespace(name.clone()), path);
        }

        let wal = self.wal_status().await;
        let is_primary = self.is_primary().await;

        StorageReport {
            instance: self.config.instance.clone(),
            is_primary,
            volumes,
            wal,
        }
    }
}

/// Probe one mount, appending on success. A failed probe only logs: the
/// operator treats the missing entry as "no decision this cycle".
fn probe_into(volumes: &mut Vec<VolumeReport>, kind: &VolumeKind, path: &Path) {
    match probe_volume(path) {
        Ok(stats) => volumes.push(VolumeReport {
            kind: kind.to_string(),
            stats,
        }),
        Err(e) => warn!(volume = %kind, "probe failed: {}", e),
    }
}

/// Run the agent server until the process exits.
pub async fn run_agent(config: AgentConfig) -> std::io::Result<()> {
    let state = Arc::new(AgentState::new(config));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/storage", get(storage))
        .with_state(state);

    let listener = TcpListener::bind(("0.0.0.0", AGENT_PORT)).await?;
    info!("Storage agent listening on :{}", AGENT_PORT);
    axum::serve(listener, app).await
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn storage(State(state): State<Arc<AgentState>>) -> Json<StorageReport> {
    Json(state.build_report().await)
}
