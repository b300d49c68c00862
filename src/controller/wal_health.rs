//! WAL health evaluation: archiver state, pending archive backlog,
//! replication slot retention
//!
//! Growth must never mask an archiving or replication failure: a volume
//! filling up because WAL cannot be archived (or because an inactive slot
//! pins gigabytes of segments) needs the failure fixed, not more disk.
//! This module classifies that safety signal.
//!
//! The checker runs next to the instance: it reads the archive-status
//! directory on local disk and queries the local PostgreSQL for archiver
//! counters and physical replication slots. Query failures surface as
//! [`WalHealthError`]; the caller resolves them fail-open or fail-closed
//! according to policy.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Result type for WAL health operations
pub type Result<T> = std::result::Result<T, WalHealthError>;

/// Errors that leave WAL health unknown
#[derive(Debug, Error)]
pub enum WalHealthError {
    /// Database query failed (transient - health is unknown this cycle)
    #[error("WAL health query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Archive-status directory could not be read
    #[error("cannot read archive status directory {path}: {details}")]
    ArchiveStatusDir { path: String, details: String },

    /// A reported LSN did not parse
    #[error("invalid LSN {0}")]
    InvalidLsn(String),
}

/// An inactive physical replication slot and the WAL it pins
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InactiveSlot {
    /// Slot name
    pub name: String,
    /// Bytes of WAL held back from reclamation by this slot
    pub retained_bytes: u64,
}

/// WAL safety classification for one instance
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalHealthStatus {
    /// Whether archiving is keeping up
    pub archive_healthy: bool,

    /// WAL segments waiting to be archived
    pub pending_archive_files: u64,

    /// Most recent successful archive operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_archive_success: Option<DateTime<Utc>>,

    /// Most recent failed archive operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_archive_failure: Option<DateTime<Utc>>,

    /// Physical slots with no active consumer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inactive_slots: Vec<InactiveSlot>,

    /// Total WAL bytes pinned by inactive slots
    pub total_slot_retention_bytes: u64,
}

impl WalHealthStatus {
    /// Status reported by replicas: archiving is the primary's concern.
    pub fn replica_default() -> Self {
        Self {
            archive_healthy: true,
            ..Self::default()
        }
    }
}

/// WAL health checker for one instance
pub struct WalHealthChecker {
    archive_status_dir: PathBuf,
    max_pending_archive_files: u64,
}

impl WalHealthChecker {
    /// Create a checker reading `archive_status_dir`
    /// (normally `<pgdata>/pg_wal/archive_status`).
    #[must_use]
    pub fn new(archive_status_dir: impl Into<PathBuf>, max_pending_archive_files: u64) -> Self {
        Self {
            archive_status_dir: archive_status_dir.into(),
            max_pending_archive_files,
        }
    }

    /// Collect WAL health for this instance.
    ///
    /// Replicas report a healthy default; on the primary this counts the
    /// pending archive backlog, reads the archiver counters, and sums the
    /// retention of inactive physical slots.
    pub async fn check(
        &self,
        client: &tokio_postgres::Client,
        is_primary: bool,
    ) -> Result<WalHealthStatus> {
        if !is_primary {
            return Ok(WalHealthStatus::replica_default());
        }

        let pending_archive_files = count_pending_wal_files(&self.archive_status_dir)?;

        let archiver = client
            .query_one(
                "SELECT last_archived_time, last_failed_time FROM pg_stat_archiver",
                &[],
            )
            .await?;
        let last_archive_success: Option<DateTime<Utc>> = archiver.get(0);
        let last_archive_failure: Option<DateTime<Utc>> = archiver.get(1);

        let current_lsn_row = client
            .query_one("SELECT pg_current_wal_lsn()::text", &[])
            .await?;
        let current_lsn_text: String = current_lsn_row.get(0);
        let current_lsn = parse_lsn(&current_lsn_text)?;

        let slot_rows = client
            .query(
                "SELECT slot_name, restart_lsn::text, active \
                 FROM pg_replication_slots WHERE slot_type = 'physical'",
                &[],
            )
            .await?;

        let mut inactive_slots = Vec::new();
        let mut total_slot_retention_bytes = 0u64;
        for row in slot_rows {
            let active: bool = row.get(2);
            if active {
                continue;
            }
            let name: String = row.get(0);
            let restart_lsn: Option<String> = row.get(1);
            let retained_bytes = match restart_lsn {
                Some(lsn_text) => current_lsn.saturating_sub(parse_lsn(&lsn_text)?),
                // A slot that never advanced retains nothing yet.
                None => 0,
            };
            debug!(
                slot = %name,
                retained_bytes,
                "inactive physical replication slot"
            );
            total_slot_retention_bytes += retained_bytes;
            inactive_slots.push(InactiveSlot {
                name,
                retained_bytes,
            });
        }

        let archive_healthy = archiver_is_healthy(
            last_archive_success,
            last_archive_failure,
            pending_archive_files,
            self.max_pending_archive_files,
        );

        Ok(WalHealthStatus {
            archive_healthy,
            pending_archive_files,
            last_archive_success,
            last_archive_failure,
            inactive_slots,
            total_slot_retention_bytes,
        })
    }
}

/// Archiver health rule.
///
/// Unhealthy when the most recent failure is newer than the most recent
/// success, or when the pending backlog exceeds the configured ceiling.
/// Standalone function for easier testing.
fn archiver_is_healthy(
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    pending_files: u64,
    max_pending: u64,
) -> bool {
    if pending_files > max_pending {
        return false;
    }
    match (last_success, last_failure) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(success), Some(failure)) => failure <= success,
    }
}

/// Count WAL segments awaiting archiving: `<segment>.ready` markers in the
/// archive-status directory.
pub fn count_pending_wal_files(dir: &Path) -> Result<u64> {
    let entries = std::fs::read_dir(dir).map_err(|e| WalHealthError::ArchiveStatusDir {
        path: dir.display().to_string(),
        details: e.to_string(),
    })?;

    let mut pending = 0u64;
    for entry in entries {
        let entry = entry.map_err(|e| WalHealthError::ArchiveStatusDir {
            path: dir.display().to_string(),
            details: e.to_string(),
        })?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(stem) = name.strip_suffix(".ready")
            && is_wal_segment_name(stem)
        {
            pending += 1;
        }
    }
    Ok(pending)
}

/// A WAL segment name is exactly 24 uppercase hex digits
/// (timeline + log + segment). History and backup markers do not count
/// towards the archive backlog.
fn is_wal_segment_name(name: &str) -> bool {
    name.len() == 24
        && name
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}

/// Parse a PostgreSQL LSN (`XXXXXXXX/XXXXXXXX`) into a byte position.
pub fn parse_lsn(text: &str) -> Result<u64> {
    let (hi, lo) = text
        .split_once('/')
        .ok_or_else(|| WalHealthError::InvalidLsn(text.to_string()))?;
    let hi = u64::from_str_radix(hi, 16).map_err(|_| WalHealthError::InvalidLsn(text.to_string()))?;
    let lo = u64::from_str_radix(lo, 16).map_err(|_| WalHealthError::InvalidLsn(text.to_string()))?;
    if hi > u32::MAX as u64 || lo > u32::MAX as u64 {
        return Err(WalHealthError::InvalidLsn(text.to_string()));
    }
    Ok((hi << 32) | lo)
}
