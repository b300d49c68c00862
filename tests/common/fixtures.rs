//! Shared test fixtures for the sizing engine suites

use postgres_volume_operator::controller::disk::VolumeStats;
use postgres_volume_operator::crd::{
    EmergencyGrowSpec, MaintenanceWindowSpec, PostgresCluster, PostgresClusterSpec,
    StorageSizingPolicy, TablespaceSpec,
};

pub const GIB: u64 = 1 << 30;

/// A sizing policy with the given bounds and no gates configured.
pub fn sizing_policy(request: &str, limit: &str) -> StorageSizingPolicy {
    StorageSizingPolicy {
        storage_class: None,
        request: request.to_string(),
        limit: limit.to_string(),
        target_buffer_percent: 20,
        maintenance_window: None,
        emergency_grow: None,
        wal_check: None,
    }
}

/// Emergency configuration with the common test thresholds.
pub fn emergency_spec(max_actions_per_day: u32, reserved: u32) -> EmergencyGrowSpec {
    EmergencyGrowSpec {
        enabled: true,
        critical_threshold_percent: 95,
        critical_minimum_free: "1Gi".to_string(),
        exceed_limit_on_emergency: false,
        max_actions_per_day,
        reserved_actions_for_emergency: reserved,
    }
}

/// A nightly two-hour window in UTC.
pub fn nightly_window() -> MaintenanceWindowSpec {
    MaintenanceWindowSpec {
        schedule: "0 0 2 * * *".to_string(),
        duration: "2h".to_string(),
        timezone: "UTC".to_string(),
    }
}

/// Disk stats derived from used/available bytes, with the percentage
/// computed the way the probe computes it.
pub fn stats(used: u64, available: u64) -> VolumeStats {
    let usable = used + available;
    VolumeStats {
        total_bytes: usable,
        used_bytes: used,
        available_bytes: available,
        percent_used: if usable == 0 {
            0.0
        } else {
            used as f64 / usable as f64 * 100.0
        },
        inodes_total: 1_000_000,
        inodes_used: 1_000,
        inodes_free: 999_000,
    }
}

/// A minimal cluster with a data volume policy.
pub fn minimal_cluster() -> PostgresCluster {
    let mut cluster = PostgresCluster::new(
        "test-cluster",
        PostgresClusterSpec {
            instances: 1,
            storage: sizing_policy("10Gi", "100Gi"),
            wal_storage: None,
            tablespaces: vec![],
        },
    );
    cluster.metadata.namespace = Some("default".to_string());
    cluster.metadata.uid = Some("uid-test".to_string());
    cluster
}

/// A cluster with a dedicated WAL volume and one tablespace.
pub fn multi_volume_cluster() -> PostgresCluster {
    let mut cluster = minimal_cluster();
    cluster.spec.instances = 3;
    cluster.spec.wal_storage = Some(sizing_policy("5Gi", "50Gi"));
    cluster.spec.tablespaces = vec![TablespaceSpec {
        name: "analytics".to_string(),
        storage: sizing_policy("20Gi", "200Gi"),
    }];
    cluster
}
