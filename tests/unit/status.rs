//! Status types, conditions, and policy validation

use postgres_volume_operator::controller::status::{ConditionBuilder, condition_status};
use postgres_volume_operator::controller::validation::{validate_cluster, validate_policy};
use postgres_volume_operator::crd::{
    SizingAction, SizingActionKind, TablespaceSpec, VolumeKind, VolumePhase, VolumeSizingStatus,
};

use crate::fixtures::{minimal_cluster, multi_volume_cluster, sizing_policy};

#[test]
fn volume_status_serializes_camel_case() {
    let status = VolumeSizingStatus {
        effective_size: "12Gi".to_string(),
        target_size: "12Gi".to_string(),
        state: VolumePhase::Resizing,
        last_action: Some(SizingAction {
            kind: SizingActionKind::ScheduledGrow,
            from: "10Gi".to_string(),
            to: "12Gi".to_string(),
            timestamp: "2026-08-06T02:10:00Z".to_string(),
            instance: "pg-1".to_string(),
            result: "Issued".to_string(),
        }),
        ..VolumeSizingStatus::default()
    };

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["effectiveSize"], "12Gi");
    assert_eq!(json["state"], "Resizing");
    assert_eq!(json["lastAction"]["kind"], "ScheduledGrow");
    // Empty collections are omitted entirely.
    assert!(json.get("actualSizes").is_none());
    assert!(json.get("recentActions").is_none());
}

#[test]
fn status_round_trips_through_json() {
    let status = VolumeSizingStatus {
        effective_size: "20Gi".to_string(),
        target_size: "25Gi".to_string(),
        state: VolumePhase::PendingGrowth,
        block_reason: Some("MaintenanceWindowClosed".to_string()),
        next_maintenance_window: Some("2026-08-07T02:00:00+00:00".to_string()),
        ..VolumeSizingStatus::default()
    };
    let json = serde_json::to_string(&status).unwrap();
    let parsed: VolumeSizingStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.state, VolumePhase::PendingGrowth);
    assert_eq!(parsed.block_reason.as_deref(), Some("MaintenanceWindowClosed"));
}

#[test]
fn conditions_transition_only_on_status_change() {
    let first = ConditionBuilder::from_existing(vec![], Some(1))
        .config_valid(true, "PoliciesValid", "ok")
        .build();
    let original_time = first[0].last_transition_time.clone();

    let second = ConditionBuilder::from_existing(first, Some(2))
        .config_valid(true, "PoliciesValid", "still ok")
        .build();
    assert_eq!(second[0].last_transition_time, original_time);
    assert_eq!(second[0].message, "still ok");

    let third = ConditionBuilder::from_existing(second, Some(3))
        .config_valid(false, "InvalidSizingPolicy", "broken")
        .build();
    assert_ne!(third[0].last_transition_time, original_time);
    assert_eq!(third[0].status, condition_status::FALSE);
}

#[test]
fn cluster_validation_accepts_multi_volume_shape() {
    assert!(validate_cluster(&minimal_cluster()).is_ok());
    assert!(validate_cluster(&multi_volume_cluster()).is_ok());
}

#[test]
fn cluster_validation_rejects_duplicate_tablespaces() {
    let mut cluster = minimal_cluster();
    cluster.spec.tablespaces = vec![
        TablespaceSpec {
            name: "idx".to_string(),
            storage: sizing_policy("10Gi", "100Gi"),
        },
        TablespaceSpec {
            name: "idx".to_string(),
            storage: sizing_policy("10Gi", "100Gi"),
        },
    ];
    assert!(validate_cluster(&cluster).is_err());
}

#[test]
fn cluster_validation_rejects_zero_instances() {
    let mut cluster = minimal_cluster();
    cluster.spec.instances = 0;
    assert!(validate_cluster(&cluster).is_err());
}

#[test]
fn policy_validation_flags_nonsense_quantities() {
    let policy = sizing_policy("10Gi", "a lot");
    assert!(validate_policy(&VolumeKind::Data, &policy).is_err());
}
