//! Sizing engine: the pure decision function at the heart of the operator
//!
//! Given a resolved policy, a volume's current size, fresh disk statistics,
//! and the three gate verdicts (WAL safety, maintenance window, budget), the
//! engine produces one of four decisions: grow now as an emergency, grow now
//! as scheduled work, record wanted-but-blocked growth, or do nothing.
//!
//! The engine never mutates anything and never shrinks: a computed target
//! below the current size is always a no-op, because shrinking is an
//! explicit operation outside this engine. Identical inputs always produce
//! identical output.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::controller::disk::VolumeStats;
use crate::crd::{StorageSizingPolicy, VolumePhase};
use crate::resources::quantity::{self, QuantityError};

/// Bounds on the free-space buffer percentage. Values outside are clamped,
/// not rejected, so a policy that slipped past admission still sizes sanely.
const MIN_BUFFER_PERCENT: u8 = 5;
const MAX_BUFFER_PERCENT: u8 = 50;

/// Errors resolving a sizing policy into bytes
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid {field}: {source}")]
    InvalidQuantity {
        field: &'static str,
        #[source]
        source: QuantityError,
    },
}

/// A sizing policy with every quantity resolved to bytes
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPolicy {
    /// Size floor
    pub request: u64,
    /// Size ceiling
    pub limit: u64,
    /// Desired minimum free-space percentage (clamped to 5-50)
    pub target_buffer_percent: u8,
    /// Emergency configuration, when enabled
    pub emergency: Option<ResolvedEmergency>,
    /// True when the spec violated `request <= limit` and the floor was
    /// lowered to the ceiling; surfaced as a warning condition
    pub request_clamped: bool,
}

/// Emergency thresholds resolved to bytes
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEmergency {
    pub critical_threshold_percent: u8,
    pub critical_minimum_free: u64,
    pub exceed_limit_on_emergency: bool,
    pub max_actions_per_day: u32,
    pub reserved_actions_for_emergency: u32,
}

impl ResolvedPolicy {
    /// Resolve a spec policy. Malformed quantities are errors; a floor above
    /// the ceiling is tolerated by treating the floor as the ceiling.
    pub fn from_spec(spec: &StorageSizingPolicy) -> Result<Self, PolicyError> {
        let request =
            quantity::parse_quantity(&spec.request).map_err(|source| PolicyError::InvalidQuantity {
                field: "request",
                source,
            })?;
        let limit =
            quantity::parse_quantity(&spec.limit).map_err(|source| PolicyError::InvalidQuantity {
                field: "limit",
                source,
            })?;

        let request_clamped = request > limit;
        let request = if request_clamped { limit } else { request };

        let emergency = match &spec.emergency_grow {
            Some(e) if e.enabled => Some(ResolvedEmergency {
                critical_threshold_percent: e.critical_threshold_percent,
                critical_minimum_free: quantity::parse_quantity(&e.critical_minimum_free)
                    .map_err(|source| PolicyError::InvalidQuantity {
                        field: "criticalMinimumFree",
                        source,
                    })?,
                exceed_limit_on_emergency: e.exceed_limit_on_emergency,
                max_actions_per_day: e.max_actions_per_day,
                reserved_actions_for_emergency: e.reserved_actions_for_emergency,
            }),
            _ => None,
        };

        Ok(Self {
            request,
            limit,
            target_buffer_percent: spec
                .target_buffer_percent
                .clamp(MIN_BUFFER_PERCENT, MAX_BUFFER_PERCENT),
            emergency,
            request_clamped,
        })
    }
}

/// Why a wanted grow is not happening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Outside the configured maintenance window
    MaintenanceWindowClosed,
    /// The rolling 24h action budget is exhausted
    BudgetExhausted,
    /// WAL archiving is failing or backlogged; growth would mask it
    WalArchiveUnhealthy,
    /// WAL health could not be determined and policy fails closed
    WalHealthUnknown,
    /// The volume is at its policy ceiling
    LimitReached,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::MaintenanceWindowClosed => write!(f, "MaintenanceWindowClosed"),
            BlockReason::BudgetExhausted => write!(f, "BudgetExhausted"),
            BlockReason::WalArchiveUnhealthy => write!(f, "WalArchiveUnhealthy"),
            BlockReason::WalHealthUnknown => write!(f, "WalHealthUnknown"),
            BlockReason::LimitReached => write!(f, "LimitReached"),
        }
    }
}

/// WAL-safety verdict as seen by the engine. The reconciler resolves
/// unknown health into one of these per the policy's fail-open/fail-closed
/// switch, and passes `Safe` for volumes WAL gating does not apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSafety {
    Safe,
    Blocked(BlockReason),
}

/// Gate verdicts feeding one decision
#[derive(Debug, Clone)]
pub struct GateVerdicts {
    pub wal: WalSafety,
    pub window_open: bool,
    pub next_window: Option<DateTime<Utc>>,
    pub planned_budget_available: bool,
    pub emergency_budget_available: bool,
}

impl GateVerdicts {
    /// All gates open; the engine acts on disk pressure alone.
    pub fn permissive() -> Self {
        Self {
            wal: WalSafety::Safe,
            window_open: true,
            next_window: None,
            planned_budget_available: true,
            emergency_budget_available: true,
        }
    }
}

/// The decision for one volume this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizingDecision {
    /// Grow immediately; a critical threshold was crossed
    EmergencyGrow { target: u64 },
    /// Grow now inside the maintenance window
    ScheduledGrow { target: u64 },
    /// Growth is wanted but a gate blocks it; record and wait
    PendingGrowth { target: u64, reason: BlockReason },
    /// Nothing to do
    NoOp,
}

/// Decision plus the derived observability state
#[derive(Debug, Clone, PartialEq)]
pub struct SizingOutcome {
    pub decision: SizingDecision,
    /// What the engine wants the volume to be (never below current size)
    pub target_size: u64,
    /// State label derived from the decision
    pub phase: VolumePhase,
    /// Whether the emergency predicate held
    pub emergency: bool,
}

/// Size a volume must be so that `target_buffer_percent` of it stays free
/// at the current usage: `used / (1 - buffer/100)`, rounded up.
pub fn compute_target_size(used_bytes: u64, target_buffer_percent: u8) -> u64 {
    let buffer = target_buffer_percent.clamp(MIN_BUFFER_PERCENT, MAX_BUFFER_PERCENT) as u128;
    let numerator = used_bytes as u128 * 100;
    let denominator = 100 - buffer;
    let target = numerator.div_ceil(denominator);
    u64::try_from(target).unwrap_or(u64::MAX)
}

/// The decision function. Pure; first match wins.
pub fn decide(
    policy: &ResolvedPolicy,
    current_size: u64,
    stats: &VolumeStats,
    gates: &GateVerdicts,
) -> SizingOutcome {
    let raw_target = compute_target_size(stats.used_bytes, policy.target_buffer_percent);
    let clamped_target = raw_target.clamp(policy.request, policy.limit);

    let emergency = policy.emergency.as_ref().is_some_and(|e| {
        stats.percent_used >= e.critical_threshold_percent as f64
            || stats.available_bytes < e.critical_minimum_free
    });

    // Emergency growth preempts everything except WAL safety and the
    // emergency budget; the maintenance window does not apply.
    if emergency {
        if let WalSafety::Blocked(reason) = gates.wal {
            return pending(clamped_target.max(current_size), reason, emergency);
        }
        if !gates.emergency_budget_available {
            return pending(
                clamped_target.max(current_size),
                BlockReason::BudgetExhausted,
                emergency,
            );
        }
        let emergency_target = policy
            .emergency
            .as_ref()
            .filter(|e| e.exceed_limit_on_emergency)
            .map_or(clamped_target, |_| raw_target.max(policy.request));
        if emergency_target > current_size {
            return SizingOutcome {
                decision: SizingDecision::EmergencyGrow {
                    target: emergency_target,
                },
                target_size: emergency_target,
                phase: VolumePhase::Emergency,
                emergency,
            };
        }
        // Critical but already at the ceiling: growth cannot help, and
        // hiding that would be worse.
        return pending(current_size, BlockReason::LimitReached, emergency);
    }

    // Never shrink.
    if clamped_target <= current_size {
        return SizingOutcome {
            decision: SizingDecision::NoOp,
            target_size: current_size,
            phase: VolumePhase::Balanced,
            emergency,
        };
    }

    if let WalSafety::Blocked(reason) = gates.wal {
        return pending(clamped_target, reason, emergency);
    }
    if !gates.window_open {
        return pending(clamped_target, BlockReason::MaintenanceWindowClosed, emergency);
    }
    if !gates.planned_budget_available {
        return pending(clamped_target, BlockReason::BudgetExhausted, emergency);
    }

    SizingOutcome {
        decision: SizingDecision::ScheduledGrow {
            target: clamped_target,
        },
        target_size: clamped_target,
        phase: VolumePhase::NeedsGrow,
        emergency,
    }
}

fn pending(target: u64, reason: BlockReason, emergency: bool) -> SizingOutcome {
    SizingOutcome {
        decision: SizingDecision::PendingGrowth { target, reason },
        target_size: target,
        phase: VolumePhase::PendingGrowth,
        emergency,
    }
}
