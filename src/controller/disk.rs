//! Disk probe: raw filesystem statistics for a mount point
//!
//! Wraps `statvfs` and derives the usage numbers the sizing engine consumes.
//! `percent_used` is computed against the usable total (total minus the
//! root-reserved blocks plus what is available to unprivileged users) so
//! filesystems with reserved space are not misreported.
//!
//! Probing is pure, blocking, and side-effect-free. A failed probe means
//! "no decision this cycle" for the affected volume, never zero usage.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from probing a mount point
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The path does not exist or the statvfs call failed
    #[error("probe unavailable for {path}: {details}")]
    ProbeUnavailable { path: String, details: String },
}

/// Filesystem statistics for one volume, produced fresh each probe
/// and never persisted beyond the current cycle
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeStats {
    /// Total capacity in bytes
    pub total_bytes: u64,
    /// Bytes in use
    pub used_bytes: u64,
    /// Bytes available to unprivileged users
    pub available_bytes: u64,
    /// Usage percentage against the usable total
    pub percent_used: f64,
    /// Total inodes
    pub inodes_total: u64,
    /// Inodes in use
    pub inodes_used: u64,
    /// Inodes available to unprivileged users
    pub inodes_free: u64,
}

/// Probe the filesystem backing `path`.
#[cfg(unix)]
pub fn probe_volume(path: &Path) -> Result<VolumeStats, ProbeError> {
    if !path.exists() {
        return Err(ProbeError::ProbeUnavailable {
            path: path.display().to_string(),
            details: "path does not exist".to_string(),
        });
    }

    let stat = nix::sys::statvfs::statvfs(path).map_err(|errno| ProbeError::ProbeUnavailable {
        path: path.display().to_string(),
        details: errno.to_string(),
    })?;

    let fragment = stat.fragment_size() as u64;
    let total_bytes = (stat.blocks() as u64).saturating_mul(fragment);
    let free_bytes = (stat.blocks_free() as u64).saturating_mul(fragment);
    let available_bytes = (stat.blocks_available() as u64).saturating_mul(fragment);
    let used_bytes = total_bytes.saturating_sub(free_bytes);

    let inodes_total = stat.files() as u64;
    let inodes_free = stat.files_available() as u64;
    let inodes_used = inodes_total.saturating_sub(stat.files_free() as u64);

    Ok(compute_stats(
        total_bytes,
        used_bytes,
        available_bytes,
        inodes_total,
        inodes_used,
        inodes_free,
    ))
}

#[cfg(not(unix))]
pub fn probe_volume(path: &Path) -> Result<VolumeStats, ProbeError> {
    Err(ProbeError::ProbeUnavailable {
        path: path.display().to_string(),
        details: "statvfs is only available on unix".to_string(),
    })
}

/// Derive `VolumeStats` from raw byte counts.
///
/// Standalone so the percentage math is testable without a real mount.
fn compute_stats(
    total_bytes: u64,
    used_bytes: u64,
    available_bytes: u64,
    inodes_total: u64,
    inodes_used: u64,
    inodes_free: u64,
) -> VolumeStats {
    // Usable total excludes the root-reserved slack between free and
    // available: used + available is what non-root can actually address.
    let usable_total = used_bytes.saturating_add(available_bytes);
    let percent_used = if usable_total == 0 {
        0.0
    } else {
        (used_bytes as f64 / usable_total as f64) * 100.0
    };

    VolumeStats {
        total_bytes,
        used_bytes,
        available_bytes,
        percent_used,
        inodes_total,
        inodes_used,
        inodes_free,
    }
}
