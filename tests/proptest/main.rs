// Test code is allowed to panic on failure
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Property-based tests for the sizing engine
//!
//! These tests use proptest to generate random policies, disk states, and
//! gate combinations and verify that:
//! 1. The engine never panics and never decides to shrink
//! 2. Grow targets always respect the policy bounds
//! 3. Decisions are deterministic (same input = same output)
//! 4. The target-size formula always preserves the free-space buffer

use proptest::prelude::*;

use postgres_volume_operator::controller::disk::VolumeStats;
use postgres_volume_operator::controller::sizing::{
    BlockReason, GateVerdicts, ResolvedEmergency, ResolvedPolicy, SizingDecision, WalSafety,
    compute_target_size, decide,
};
use postgres_volume_operator::resources::quantity::{format_quantity, parse_quantity};

const GIB: u64 = 1 << 30;

fn arb_stats() -> impl Strategy<Value = VolumeStats> {
    (0u64..=512 * GIB, 0u64..=64 * GIB).prop_map(|(used, available)| {
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
            inodes_total: 0,
            inodes_used: 0,
            inodes_free: 0,
        }
    })
}

fn arb_policy() -> impl Strategy<Value = ResolvedPolicy> {
    (
        1u64..=64 * GIB,
        1u64..=1024 * GIB,
        5u8..=50,
        proptest::option::of((80u8..=99, 0u64..=8 * GIB, any::<bool>())),
    )
        .prop_map(|(a, b, buffer, emergency)| ResolvedPolicy {
            request: a.min(b),
            limit: a.max(b),
            target_buffer_percent: buffer,
            emergency: emergency.map(|(threshold, min_free, exceed)| ResolvedEmergency {
                critical_threshold_percent: threshold,
                critical_minimum_free: min_free,
                exceed_limit_on_emergency: exceed,
                max_actions_per_day: 6,
                reserved_actions_for_emergency: 2,
            }),
            request_clamped: false,
        })
}

fn arb_gates() -> impl Strategy<Value = GateVerdicts> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(wal_safe, window_open, planned, emergency)| GateVerdicts {
            wal: if wal_safe {
                WalSafety::Safe
            } else {
                WalSafety::Blocked(BlockReason::WalArchiveUnhealthy)
            },
            window_open,
            next_window: None,
            planned_budget_available: planned,
            emergency_budget_available: emergency,
        },
    )
}

proptest! {
    #[test]
    fn engine_never_shrinks(
        policy in arb_policy(),
        current in 0u64..=1024 * GIB,
        stats in arb_stats(),
        gates in arb_gates(),
    ) {
        let outcome = decide(&policy, current, &stats, &gates);
        match outcome.decision {
            SizingDecision::EmergencyGrow { target }
            | SizingDecision::ScheduledGrow { target } => {
                prop_assert!(target > current);
            }
            SizingDecision::PendingGrowth { .. } | SizingDecision::NoOp => {}
        }
        // The reported target never asks for less than what exists.
        prop_assert!(outcome.target_size >= current);
    }

    #[test]
    fn scheduled_grow_respects_policy_bounds(
        policy in arb_policy(),
        current in 0u64..=1024 * GIB,
        stats in arb_stats(),
        gates in arb_gates(),
    ) {
        let outcome = decide(&policy, current, &stats, &gates);
        if let SizingDecision::ScheduledGrow { target } = outcome.decision {
            prop_assert!(target >= policy.request);
            prop_assert!(target <= policy.limit);
        }
    }

    #[test]
    fn emergency_grow_exceeds_limit_only_when_allowed(
        policy in arb_policy(),
        current in 0u64..=1024 * GIB,
        stats in arb_stats(),
        gates in arb_gates(),
    ) {
        let outcome = decide(&policy, current, &stats, &gates);
        if let SizingDecision::EmergencyGrow { target } = outcome.decision {
            let exceed_allowed = policy
                .emergency
                .as_ref()
                .is_some_and(|e| e.exceed_limit_on_emergency);
            if !exceed_allowed {
                prop_assert!(target <= policy.limit);
            }
            prop_assert!(target >= policy.request);
        }
    }

    #[test]
    fn decisions_are_deterministic(
        policy in arb_policy(),
        current in 0u64..=1024 * GIB,
        stats in arb_stats(),
        gates in arb_gates(),
    ) {
        prop_assert_eq!(
            decide(&policy, current, &stats, &gates),
            decide(&policy, current, &stats, &gates)
        );
    }

    #[test]
    fn target_formula_preserves_buffer(
        used in 0u64..=1024 * GIB,
        buffer in 5u8..=50,
    ) {
        let target = compute_target_size(used, buffer);
        prop_assert!(target >= used);
        let free = target - used;
        prop_assert!(free as u128 * 100 >= buffer as u128 * target as u128);
    }

    #[test]
    fn quantity_round_trips_at_mi_granularity(mib in 1u64..=4 * 1024 * 1024) {
        let bytes = mib * (1 << 20);
        let rendered = format_quantity(bytes);
        prop_assert_eq!(parse_quantity(&rendered).unwrap(), bytes);
    }

    #[test]
    fn blocked_growth_always_names_a_reason(
        policy in arb_policy(),
        current in 0u64..=1024 * GIB,
        stats in arb_stats(),
    ) {
        // Everything closed: any wanted growth must surface as pending
        // with a concrete reason, never silently dropped.
        let gates = GateVerdicts {
            wal: WalSafety::Safe,
            window_open: false,
            next_window: None,
            planned_budget_available: false,
            emergency_budget_available: false,
        };
        let outcome = decide(&policy, current, &stats, &gates);
        prop_assert!(
            !matches!(
                outcome.decision,
                SizingDecision::EmergencyGrow { .. } | SizingDecision::ScheduledGrow { .. }
            ),
            "grow must not be decided when budgets are unavailable"
        );
    }
}
