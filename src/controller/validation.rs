//! Defensive validation of storage sizing policies
//!
//! Policies are validated upstream by admission control; this layer only
//! guards the engine against specs that slipped through. Hard errors make a
//! volume sit out sizing with a `ConfigurationValid=False` condition; soft
//! findings (an inverted request/limit pair, an out-of-range buffer) are
//! tolerated with documented clamping and surfaced as warnings.

use crate::controller::error::{Error, Result};
use crate::controller::window::MaintenanceWindow;
use crate::crd::{PostgresCluster, StorageSizingPolicy, VolumeKind};
use crate::resources::quantity::parse_quantity;

/// Minimum number of instances
pub const MIN_INSTANCES: i32 = 1;

/// Maximum number of instances (arbitrary limit for safety)
pub const MAX_INSTANCES: i32 = 64;

/// Bounds for the free-space buffer percentage
pub const MIN_BUFFER_PERCENT: u8 = 5;
pub const MAX_BUFFER_PERCENT: u8 = 50;

/// Validate cluster-level invariants: instance count and tablespace naming.
pub fn validate_cluster(cluster: &PostgresCluster) -> Result<()> {
    let instances = cluster.spec.instances;
    if !(MIN_INSTANCES..=MAX_INSTANCES).contains(&instances) {
        return Err(Error::ConfigurationInvalid(format!(
            "instance count {} outside [{}, {}]",
            instances, MIN_INSTANCES, MAX_INSTANCES
        )));
    }

    let mut seen = std::collections::BTreeSet::new();
    for tablespace in &cluster.spec.tablespaces {
        if tablespace.name.is_empty() {
            return Err(Error::ConfigurationInvalid(
                "tablespace with empty name".to_string(),
            ));
        }
        if !seen.insert(tablespace.name.as_str()) {
            return Err(Error::ConfigurationInvalid(format!(
                "duplicate tablespace name: {}",
                tablespace.name
            )));
        }
    }

    Ok(())
}

/// Validate one volume's sizing policy.
///
/// Returns the warnings for tolerated defects; errors mean this volume
/// cannot be sized until the spec is fixed. Sibling volumes are unaffected
/// either way.
pub fn validate_policy(kind: &VolumeKind, policy: &StorageSizingPolicy) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    let request = parse_quantity(&policy.request).map_err(|e| {
        Error::ConfigurationInvalid(format!("{} volume request: {}", kind, e))
    })?;
    let limit = parse_quantity(&policy.limit).map_err(|e| {
        Error::ConfigurationInvalid(format!("{} volume limit: {}", kind, e))
    })?;

    if request == 0 {
        return Err(Error::ConfigurationInvalid(format!(
            "{} volume request must be positive",
            kind
        )));
    }
    if request > limit {
        warnings.push(format!(
            "{} volume request {} exceeds limit {}; treating request as {}",
            kind, policy.request, policy.limit, policy.limit
        ));
    }

    if !(MIN_BUFFER_PERCENT..=MAX_BUFFER_PERCENT).contains(&policy.target_buffer_percent) {
        warnings.push(format!(
            "{} volume targetBufferPercent {} outside [{}, {}]; clamping",
            kind, policy.target_buffer_percent, MIN_BUFFER_PERCENT, MAX_BUFFER_PERCENT
        ));
    }

    if let Some(window) = &policy.maintenance_window {
        MaintenanceWindow::from_spec(window)
            .map_err(|e| Error::ConfigurationInvalid(format!("{} volume: {}", kind, e)))?;
    }

    if let Some(emergency) = &policy.emergency_grow {
        parse_quantity(&emergency.critical_minimum_free).map_err(|e| {
            Error::ConfigurationInvalid(format!("{} volume criticalMinimumFree: {}", kind, e))
        })?;
        if emergency.critical_threshold_percent > 100 {
            return Err(Error::ConfigurationInvalid(format!(
                "{} volume criticalThresholdPercent {} exceeds 100",
                kind, emergency.critical_threshold_percent
            )));
        }
        if emergency.max_actions_per_day == 0 {
            return Err(Error::ConfigurationInvalid(format!(
                "{} volume maxActionsPerDay must be positive",
                kind
            )));
        }
        if emergency.reserved_actions_for_emergency > emergency.max_actions_per_day {
            warnings.push(format!(
                "{} volume reservedActionsForEmergency {} exceeds maxActionsPerDay {}; \
                 planned growth will never run",
                kind, emergency.reserved_actions_for_emergency, emergency.max_actions_per_day
            ));
        }
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{EmergencyGrowSpec, MaintenanceWindowSpec};

    fn policy(request: &str, limit: &str) -> StorageSizingPolicy {
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

    #[test]
    fn test_valid_policy_has_no_warnings() {
        let warnings = validate_policy(&VolumeKind::Data, &policy("10Gi", "100Gi")).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_inverted_bounds_warn_but_pass() {
        let warnings = validate_policy(&VolumeKind::Data, &policy("100Gi", "10Gi")).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("exceeds limit"));
    }

    #[test]
    fn test_unparseable_request_is_invalid() {
        let err = validate_policy(&VolumeKind::Data, &policy("lots", "10Gi")).unwrap_err();
        assert!(matches!(err, Error::ConfigurationInvalid(_)));
    }

    #[test]
    fn test_zero_request_is_invalid() {
        let err = validate_policy(&VolumeKind::Data, &policy("0", "10Gi")).unwrap_err();
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn test_out_of_range_buffer_warns() {
        let mut p = policy("10Gi", "100Gi");
        p.target_buffer_percent = 75;
        let warnings = validate_policy(&VolumeKind::Wal, &p).unwrap();
        assert!(warnings.iter().any(|w| w.contains("clamping")));
    }

    #[test]
    fn test_malformed_window_is_invalid() {
        let mut p = policy("10Gi", "100Gi");
        p.maintenance_window = Some(MaintenanceWindowSpec {
            schedule: "whenever".to_string(),
            duration: "2h".to_string(),
            timezone: "UTC".to_string(),
        });
        let err = validate_policy(&VolumeKind::Data, &p).unwrap_err();
        assert!(matches!(err, Error::ConfigurationInvalid(_)));
    }

    #[test]
    fn test_reserve_exceeding_cap_warns() {
        let mut p = policy("10Gi", "100Gi");
        p.emergency_grow = Some(EmergencyGrowSpec {
            enabled: true,
            critical_threshold_percent: 90,
            critical_minimum_free: "1Gi".to_string(),
            exceed_limit_on_emergency: false,
            max_actions_per_day: 2,
            reserved_actions_for_emergency: 5,
        });
        let warnings = validate_policy(&VolumeKind::Data, &p).unwrap();
        assert!(warnings.iter().any(|w| w.contains("never run")));
    }
}
