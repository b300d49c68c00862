//! Decision-table tests for the sizing engine, driven through spec-level
//! policies rather than pre-resolved values

use postgres_volume_operator::controller::sizing::{
    BlockReason, GateVerdicts, ResolvedPolicy, SizingDecision, WalSafety, compute_target_size,
    decide,
};
use postgres_volume_operator::crd::VolumePhase;

use crate::fixtures::{GIB, emergency_spec, sizing_policy, stats};

fn resolved(request: &str, limit: &str) -> ResolvedPolicy {
    ResolvedPolicy::from_spec(&sizing_policy(request, limit)).unwrap()
}

fn resolved_with_emergency(request: &str, limit: &str) -> ResolvedPolicy {
    let mut policy = sizing_policy(request, limit);
    policy.emergency_grow = Some(emergency_spec(6, 2));
    ResolvedPolicy::from_spec(&policy).unwrap()
}

#[test]
fn eight_gib_used_with_twenty_percent_buffer_targets_ten_gib() {
    assert_eq!(compute_target_size(8 * GIB, 20), 10 * GIB);
}

#[test]
fn small_target_clamps_to_request_floor() {
    // Raw target 5Gi, floor 10Gi: the volume never drops below the floor.
    let outcome = decide(
        &resolved("10Gi", "100Gi"),
        10 * GIB,
        &stats(4 * GIB, 6 * GIB),
        &GateVerdicts::permissive(),
    );
    assert_eq!(outcome.target_size, 10 * GIB);
    assert_eq!(outcome.decision, SizingDecision::NoOp);
}

#[test]
fn critical_usage_grows_even_outside_window() {
    // percentUsed ≈ 96 against a 95% threshold; window closed.
    let gates = GateVerdicts {
        window_open: false,
        ..GateVerdicts::permissive()
    };
    let outcome = decide(
        &resolved_with_emergency("10Gi", "100Gi"),
        25 * GIB,
        &stats(24 * GIB, GIB),
        &gates,
    );
    assert!(matches!(
        outcome.decision,
        SizingDecision::EmergencyGrow { .. }
    ));
}

#[test]
fn grow_wanted_outside_window_is_pending() {
    let gates = GateVerdicts {
        window_open: false,
        ..GateVerdicts::permissive()
    };
    let outcome = decide(
        &resolved("10Gi", "100Gi"),
        12 * GIB,
        &stats(11 * GIB, GIB),
        &gates,
    );
    match outcome.decision {
        SizingDecision::PendingGrowth { reason, .. } => {
            assert_eq!(reason, BlockReason::MaintenanceWindowClosed);
        }
        other => panic!("expected pending growth, got {:?}", other),
    }
    assert_eq!(outcome.phase, VolumePhase::PendingGrowth);
}

#[test]
fn unhealthy_archiver_blocks_all_growth() {
    // Single-volume cluster with a failing archiver: neither scheduled nor
    // emergency growth may run.
    let gates = GateVerdicts {
        wal: WalSafety::Blocked(BlockReason::WalArchiveUnhealthy),
        ..GateVerdicts::permissive()
    };

    let scheduled = decide(
        &resolved("10Gi", "100Gi"),
        12 * GIB,
        &stats(11 * GIB, GIB),
        &gates,
    );
    assert!(matches!(
        scheduled.decision,
        SizingDecision::PendingGrowth {
            reason: BlockReason::WalArchiveUnhealthy,
            ..
        }
    ));

    let emergency = decide(
        &resolved_with_emergency("10Gi", "100Gi"),
        25 * GIB,
        &stats(24 * GIB, GIB),
        &gates,
    );
    assert!(matches!(
        emergency.decision,
        SizingDecision::PendingGrowth {
            reason: BlockReason::WalArchiveUnhealthy,
            ..
        }
    ));
}

#[test]
fn no_shrink_for_any_gate_combination() {
    // Current 25Gi, computed target 12Gi: a no-op under every gate state.
    for window_open in [true, false] {
        for planned in [true, false] {
            let gates = GateVerdicts {
                window_open,
                planned_budget_available: planned,
                ..GateVerdicts::permissive()
            };
            let outcome = decide(
                &resolved("10Gi", "100Gi"),
                25 * GIB,
                &stats(9 * GIB + 614 * (1 << 20), 15 * GIB),
                &gates,
            );
            assert_eq!(outcome.decision, SizingDecision::NoOp);
            assert_eq!(outcome.phase, VolumePhase::Balanced);
        }
    }
}

#[test]
fn identical_inputs_identical_output() {
    let policy = resolved_with_emergency("10Gi", "100Gi");
    let disk = stats(16 * GIB, 2 * GIB);
    let gates = GateVerdicts::permissive();
    assert_eq!(
        decide(&policy, 18 * GIB, &disk, &gates),
        decide(&policy, 18 * GIB, &disk, &gates)
    );
}

#[test]
fn inverted_policy_bounds_never_crash() {
    let policy = resolved("100Gi", "10Gi");
    assert_eq!(policy.request, 10 * GIB);
    assert!(policy.request_clamped);

    let outcome = decide(
        &policy,
        10 * GIB,
        &stats(4 * GIB, 6 * GIB),
        &GateVerdicts::permissive(),
    );
    assert_eq!(outcome.decision, SizingDecision::NoOp);
}
