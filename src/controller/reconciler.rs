//! Reconciliation logic for PostgresCluster volume sizing
//!
//! Each pass evaluates every logical volume the cluster owns: pull fresh
//! stats from the instance agents, evaluate the WAL / window / budget gates,
//! run the sizing engine, issue resize requests where growth was decided,
//! and persist the per-volume sizing status.
//!
//! Volumes are evaluated sequentially against a single status object
//! (single writer per cluster); a failure in one volume never aborts its
//! siblings. Re-running with unchanged inputs reproduces the same decisions,
//! and a failed resize attempt consumes no budget so the next cycle retries.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::runtime::controller::Action;
use kube::runtime::events::{Event, EventType, Recorder};
use kube::{Api, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::controller::budget::BudgetTracker;
use crate::controller::context::Context;
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::instance_status::{InstanceStatusCollector, InstanceStatusError, StorageReport};
use crate::controller::sizing::{
    self, BlockReason, GateVerdicts, ResolvedPolicy, SizingDecision, WalSafety,
};
use crate::controller::status::StatusManager;
use crate::controller::validation;
use crate::controller::window;
use crate::controller::disk::VolumeStats;
use crate::controller::wal_health::WalHealthStatus;
use crate::crd::{
    OnUnknownWalHealth, PostgresCluster, PostgresClusterStatus, SizingAction, SizingActionKind,
    StorageSizingPolicy, VolumeKey, VolumeKind, VolumePhase, VolumeSizingStatus, WalCheckSpec,
};
use crate::health::VolumeLabels;
use crate::resources::pvc;
use crate::resources::quantity::{format_quantity, parse_quantity, round_up, PVC_GRANULARITY};

/// Requeue interval for a quiet cluster
const REQUEUE_INTERVAL: Duration = Duration::from_secs(30);

/// Requeue interval while configuration is invalid; nothing changes until
/// the spec does, so no point spinning
const INVALID_CONFIG_REQUEUE: Duration = Duration::from_secs(300);

/// Entries of the persisted action history to keep. Generously above any
/// sane maxActionsPerDay so the 24h budget window is always reconstructible.
const MAX_RECENT_ACTIONS: usize = 32;

/// Default backoff configuration for error handling
fn default_backoff() -> BackoffConfig {
    BackoffConfig::default()
}

/// Main reconciliation function
#[instrument(skip(cluster, ctx), fields(name = %cluster.name_any(), namespace = cluster.namespace().unwrap_or_default()))]
pub async fn reconcile(cluster: Arc<PostgresCluster>, ctx: Arc<Context>) -> Result<Action> {
    let ns = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();

    // Nothing of ours needs cleanup on deletion: PVCs belong to the
    // instance lifecycle and budget state dies with the status.
    if cluster.metadata.deletion_timestamp.is_some() {
        debug!("Cluster is being deleted, nothing to do");
        return Ok(Action::await_change());
    }

    info!("Reconciling volume sizing");
    let started = Instant::now();

    let result = reconcile_volumes(&cluster, &ctx, &ns).await;

    if let Some(health) = &ctx.health {
        match &result {
            Ok(_) => health
                .metrics
                .record_reconcile(&ns, &name, started.elapsed().as_secs_f64()),
            Err(_) => health.metrics.record_reconcile_error(&ns, &name),
        }
    }

    match result {
        Ok(action) => {
            debug!("Reconciliation completed");
            Ok(action)
        }
        Err(Error::ConfigurationInvalid(msg)) => {
            // No-op with a blocking condition; never a crash, never a hot loop.
            warn!("Sizing disabled by invalid configuration: {}", msg);
            let status_manager = StatusManager::new(&cluster, ctx.client.clone(), &ns);
            let _ = status_manager.set_config_invalid(&msg).await;
            Ok(Action::requeue(INVALID_CONFIG_REQUEUE))
        }
        Err(e) => {
            error!("Reconciliation failed: {}", e);
            Err(e)
        }
    }
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(cluster: Arc<PostgresCluster>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = cluster.name_any();
    let backoff = default_backoff();
    let delay = backoff.delay_for_error(error, 0);

    if error.is_retryable() {
        warn!(
            "Retryable error for {}: {:?}, requeuing in {:?}",
            name, error, delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {:?}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }

    Action::requeue(delay)
}

/// The logical volume roles a cluster owns, with their policies
fn volume_policies(cluster: &PostgresCluster) -> Vec<(VolumeKind, &StorageSizingPolicy)> {
    let mut volumes = vec![(VolumeKind::Data, &cluster.spec.storage)];
    if let Some(wal) = &cluster.spec.wal_storage {
        volumes.push((VolumeKind::Wal, wal));
    }
    for tablespace in &cluster.spec.tablespaces {
        volumes.push((
            VolumeKind::Tablespace(tablespace.name.clone()),
            &tablespace.storage,
        ));
    }
    volumes
}

/// WAL gating scope: the WAL volume if dedicated, otherwise the data volume
/// of a single-volume cluster. Tablespaces are never gated.
fn wal_gating_applies(kind: &VolumeKind, has_dedicated_wal: bool) -> bool {
    match kind {
        VolumeKind::Wal => true,
        VolumeKind::Data => !has_dedicated_wal,
        VolumeKind::Tablespace(_) => false,
    }
}

/// Evaluate all volumes and persist the resulting status.
async fn reconcile_volumes(
    cluster: &PostgresCluster,
    ctx: &Context,
    ns: &str,
) -> Result<Action> {
    let name = cluster.name_any();
    let started_generation = cluster.metadata.generation;

    validation::validate_cluster(cluster)?;

    // Per-volume validation: a bad tablespace policy must not stop the data
    // volume from being sized. Invalid volumes sit out with a condition.
    let mut policy_warnings = Vec::new();
    let mut invalid_volumes: BTreeMap<String, String> = BTreeMap::new();
    for (kind, policy) in volume_policies(cluster) {
        match validation::validate_policy(&kind, policy) {
            Ok(warnings) => policy_warnings.extend(warnings),
            Err(e) => {
                invalid_volumes.insert(kind.to_string(), e.to_string());
            }
        }
    }

    // Fresh per-instance reports. A pod-list failure aborts the pass
    // (retryable); individual unreachable agents were already skipped.
    let collector = InstanceStatusCollector::new(ctx.client.clone(), ns, &name);
    let reports = collector.collect().await.map_err(|e| match e {
        InstanceStatusError::KubeError(inner) => Error::KubeError(inner),
        other => Error::ProbeUnavailable(other.to_string()),
    })?;
    let reports_by_instance: HashMap<String, &StorageReport> =
        reports.iter().map(|r| (r.instance.clone(), r)).collect();

    let pvc_api: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.clone(), ns);
    let inventory = pvc::load_inventory(&pvc_api, &name).await?;

    let now = Utc::now();
    let has_dedicated_wal = cluster.spec.wal_storage.is_some();
    let prev_volumes = cluster
        .status
        .as_ref()
        .map(|s| s.volumes.clone())
        .unwrap_or_default();

    let mut volumes = BTreeMap::new();
    let mut any_emergency = false;
    let mut wal_states: Vec<Option<bool>> = Vec::new();

    for (kind, policy) in volume_policies(cluster) {
        let prev = prev_volumes.get(&kind.to_string());
        let gated = wal_gating_applies(&kind, has_dedicated_wal);

        if let Some(problem) = invalid_volumes.get(&kind.to_string()) {
            debug!(volume = %kind, "policy invalid, volume sits out: {}", problem);
            if let Some(prev) = prev {
                volumes.insert(kind.to_string(), prev.clone());
            }
            continue;
        }

        match evaluate_volume(EvaluateVolume {
            cluster,
            ctx,
            pvc_api: &pvc_api,
            kind: &kind,
            policy,
            prev,
            reports: &reports_by_instance,
            inventory: &inventory,
            now,
            wal_gated: gated,
        })
        .await
        {
            Ok(eval) => {
                any_emergency |= eval.status.state == VolumePhase::Emergency;
                if gated {
                    wal_states.push(eval.wal_state);
                }
                publish_metrics(ctx, ns, &name, &kind, &eval);
                volumes.insert(kind.to_string(), eval.status);
            }
            Err(e) => {
                // Per-volume recovery: siblings continue, previous status
                // is carried forward untouched.
                warn!(volume = %kind, error = %e, "volume evaluation failed, skipping this cycle");
                if let Some(prev) = prev {
                    volumes.insert(kind.to_string(), prev.clone());
                }
            }
        }
    }

    // A superseded pass must not write stale decisions: if the spec
    // generation moved while we were probing, drop our write and let the
    // newer pass recompute.
    let api: Api<PostgresCluster> = Api::namespaced(ctx.client.clone(), ns);
    let fresh = api.get(&name).await?;
    if fresh.metadata.generation != started_generation {
        debug!(
            observed = ?started_generation,
            current = ?fresh.metadata.generation,
            "generation advanced mid-pass, abandoning status write"
        );
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let status_manager = StatusManager::new(cluster, ctx.client.clone(), ns);
    let wal_state = aggregate_wal_state(&wal_states);
    let config_valid = invalid_volumes.is_empty();
    let config_message = if !config_valid {
        invalid_volumes
            .iter()
            .map(|(kind, problem)| format!("{}: {}", kind, problem))
            .collect::<Vec<_>>()
            .join("; ")
    } else if policy_warnings.is_empty() {
        "all sizing policies valid".to_string()
    } else {
        policy_warnings.join("; ")
    };

    let conditions = status_manager
        .conditions()
        .config_valid(
            config_valid,
            if !config_valid {
                "InvalidSizingPolicy"
            } else if policy_warnings.is_empty() {
                "PoliciesValid"
            } else {
                "PoliciesToleratedWithWarnings"
            },
            &config_message,
        )
        .storage_healthy(
            !any_emergency,
            if any_emergency { "VolumeCritical" } else { "Balanced" },
            if any_emergency {
                "at least one volume crossed its critical threshold"
            } else {
                "no volume is in an emergency state"
            },
        )
        .wal_safe(
            wal_state,
            match wal_state {
                Some(true) => "ArchiverHealthy",
                Some(false) => "ArchiverUnhealthy",
                None => "HealthUnknown",
            },
            "WAL archiving state across gated volumes",
        )
        .build();

    status_manager
        .update(PostgresClusterStatus {
            volumes,
            observed_generation: started_generation,
            conditions,
        })
        .await?;

    Ok(Action::requeue(REQUEUE_INTERVAL))
}

/// Aggregate per-volume WAL verdicts into one condition value:
/// unhealthy anywhere wins, then unknown, then healthy.
fn aggregate_wal_state(states: &[Option<bool>]) -> Option<bool> {
    if states.iter().any(|s| *s == Some(false)) {
        Some(false)
    } else if states.iter().any(|s| s.is_none()) {
        None
    } else {
        Some(true)
    }
}

/// Inputs for one volume evaluation
struct EvaluateVolume<'a> {
    cluster: &'a PostgresCluster,
    ctx: &'a Context,
    pvc_api: &'a Api<PersistentVolumeClaim>,
    kind: &'a VolumeKind,
    policy: &'a StorageSizingPolicy,
    prev: Option<&'a VolumeSizingStatus>,
    reports: &'a HashMap<String, &'a StorageReport>,
    inventory: &'a pvc::PvcInventory,
    now: DateTime<Utc>,
    wal_gated: bool,
}

/// Result of one volume evaluation
struct VolumeEval {
    status: VolumeSizingStatus,
    /// WAL verdict for the condition: Some(healthy) or None for unknown.
    /// Only meaningful when the volume is WAL-gated.
    wal_state: Option<bool>,
}

/// Evaluate one volume role across all its instances.
async fn evaluate_volume(input: EvaluateVolume<'_>) -> Result<VolumeEval> {
    let EvaluateVolume {
        cluster,
        ctx,
        pvc_api,
        kind,
        policy,
        prev,
        reports,
        inventory,
        now,
        wal_gated,
    } = input;

    let cluster_uid = cluster.metadata.uid.clone().unwrap_or_default();
    let resolved =
        ResolvedPolicy::from_spec(policy).map_err(|e| Error::ConfigurationInvalid(e.to_string()))?;
    let window_verdict = window::evaluate(policy.maintenance_window.as_ref(), now)
        .map_err(|e| Error::ConfigurationInvalid(e.to_string()))?;

    seed_budget_from_history(&ctx.budget, &cluster_uid, kind, prev, now);

    let mut actions: Vec<SizingAction> = prev
        .map(|p| prune_recent_actions(&p.recent_actions, now))
        .unwrap_or_default();
    let mut actual_sizes = BTreeMap::new();
    let mut state = VolumePhase::Balanced;
    let mut target_size = resolved.request;
    let mut effective_size = prev
        .and_then(|p| parse_quantity(&p.effective_size).ok())
        .unwrap_or(0)
        .max(resolved.request);
    let mut block_reason: Option<BlockReason> = None;
    let mut wal_state: Option<bool> = Some(true);
    let mut budget_snapshot = None;

    let instances = inventory.instances_with(kind);
    if instances.is_empty() {
        debug!(volume = %kind, "no PVCs yet, publishing effective size only");
    }

    for instance in &instances {
        let Some(sizes) = inventory.get(instance, kind) else {
            continue;
        };
        let current_size = sizes.requested;
        actual_sizes.insert(
            instance.clone(),
            format_quantity(sizes.actual.unwrap_or(sizes.requested)),
        );
        effective_size = effective_size.max(current_size);

        // No fresh stats: no decision for this instance this cycle.
        let Some(stats) = reports
            .get(instance)
            .and_then(|r| volume_stats(r, kind))
        else {
            debug!(volume = %kind, instance = %instance, "no fresh stats, skipping");
            continue;
        };

        let (wal_safety, instance_wal_state, fail_open) = if wal_gated {
            resolve_wal_safety(
                reports.get(instance).and_then(|r| r.wal.as_ref()),
                policy.wal_check.as_ref(),
            )
        } else {
            (WalSafety::Safe, Some(true), false)
        };
        if wal_gated {
            wal_state = merge_wal_state(wal_state, instance_wal_state);
            if fail_open {
                publish_event(
                    ctx,
                    cluster,
                    EventType::Warning,
                    "WalHealthUnknown",
                    "EvaluateVolume",
                    format!(
                        "{} volume of {}: WAL health unknown, growing anyway (failOpen)",
                        kind, instance
                    ),
                )
                .await;
            }
        }

        let key = VolumeKey {
            cluster_uid: cluster_uid.clone(),
            instance: instance.clone(),
            kind: kind.clone(),
        };
        let (planned_available, emergency_available) = match &resolved.emergency {
            Some(e) => (
                ctx.budget.has_budget(
                    &key,
                    e.max_actions_per_day,
                    e.reserved_actions_for_emergency,
                    false,
                    now,
                ),
                ctx.budget
                    .has_budget(&key, e.max_actions_per_day, e.reserved_actions_for_emergency, true, now),
            ),
            // No emergency config means no rate limit configured.
            None => (true, false),
        };

        let gates = GateVerdicts {
            wal: wal_safety,
            window_open: window_verdict.open,
            next_window: window_verdict.next_start,
            planned_budget_available: planned_available,
            emergency_budget_available: emergency_available,
        };

        let outcome = sizing::decide(&resolved, current_size, stats, &gates);
        target_size = target_size.max(outcome.target_size);

        // At most one resize in flight per volume: while the PVC's actual
        // capacity trails its requested size, issue nothing new.
        let resize_in_flight = sizes.actual.is_some_and(|actual| actual < sizes.requested);

        let instance_phase = match outcome.decision {
            SizingDecision::EmergencyGrow { target } | SizingDecision::ScheduledGrow { target }
                if resize_in_flight =>
            {
                debug!(
                    volume = %kind,
                    instance = %instance,
                    target,
                    "resize already in flight, holding further growth"
                );
                VolumePhase::Resizing
            }
            SizingDecision::EmergencyGrow { target } => {
                issue_grow(
                    IssueGrow {
                        ctx,
                        cluster,
                        pvc_api,
                        kind,
                        key: &key,
                        instance,
                        from: current_size,
                        target,
                        action_kind: SizingActionKind::EmergencyGrow,
                        now,
                    },
                    &mut actions,
                    &mut effective_size,
                )
                .await
                .unwrap_or(outcome.phase)
            }
            SizingDecision::ScheduledGrow { target } => {
                issue_grow(
                    IssueGrow {
                        ctx,
                        cluster,
                        pvc_api,
                        kind,
                        key: &key,
                        instance,
                        from: current_size,
                        target,
                        action_kind: SizingActionKind::ScheduledGrow,
                        now,
                    },
                    &mut actions,
                    &mut effective_size,
                )
                .await
                .unwrap_or(outcome.phase)
            }
            SizingDecision::PendingGrowth { target, reason } => {
                block_reason = Some(reason);
                publish_event(
                    ctx,
                    cluster,
                    EventType::Normal,
                    "GrowthPending",
                    "EvaluateVolume",
                    format!(
                        "{} volume of {} wants {} but is blocked: {}",
                        kind,
                        instance,
                        format_quantity(round_up(target, PVC_GRANULARITY)),
                        reason
                    ),
                )
                .await;
                VolumePhase::PendingGrowth
            }
            SizingDecision::NoOp => {
                if resize_in_flight {
                    VolumePhase::Resizing
                } else {
                    VolumePhase::Balanced
                }
            }
        };

        if instance_phase.severity() > state.severity() {
            state = instance_phase;
        }

        if let Some(e) = &resolved.emergency {
            let snapshot = ctx.budget.status(
                &key,
                e.max_actions_per_day,
                e.reserved_actions_for_emergency,
                now,
            );
            // Report the most constrained instance.
            let more_constrained = budget_snapshot
                .as_ref()
                .is_none_or(|prev: &crate::crd::BudgetStatus| {
                    snapshot.actions_last24h > prev.actions_last24h
                });
            if more_constrained {
                budget_snapshot = Some(snapshot);
            }
        }
    }

    if actions.len() > MAX_RECENT_ACTIONS {
        let excess = actions.len() - MAX_RECENT_ACTIONS;
        actions.drain(..excess);
    }
    let last_action = actions.last().cloned().or_else(|| prev.and_then(|p| p.last_action.clone()));

    Ok(VolumeEval {
        status: VolumeSizingStatus {
            effective_size: format_quantity(round_up(effective_size, PVC_GRANULARITY)),
            target_size: format_quantity(round_up(target_size, PVC_GRANULARITY)),
            actual_sizes,
            state,
            budget: budget_snapshot,
            last_action,
            recent_actions: actions,
            next_maintenance_window: window_verdict.next_start.map(|t| t.to_rfc3339()),
            block_reason: block_reason.map(|r| r.to_string()),
        },
        wal_state: if wal_gated { wal_state } else { Some(true) },
    })
}

/// Inputs for issuing one grow
struct IssueGrow<'a> {
    ctx: &'a Context,
    cluster: &'a PostgresCluster,
    pvc_api: &'a Api<PersistentVolumeClaim>,
    kind: &'a VolumeKind,
    key: &'a VolumeKey,
    instance: &'a str,
    from: u64,
    target: u64,
    action_kind: SizingActionKind,
    now: DateTime<Utc>,
}

/// Issue a resize request, consuming budget only on success.
///
/// Returns the phase to record, or `None` to fall back to the engine's
/// phase when issuance failed (state unchanged, next cycle retries).
async fn issue_grow(
    input: IssueGrow<'_>,
    actions: &mut Vec<SizingAction>,
    effective_size: &mut u64,
) -> Option<VolumePhase> {
    let IssueGrow {
        ctx,
        cluster,
        pvc_api,
        kind,
        key,
        instance,
        from,
        target,
        action_kind,
        now,
    } = input;

    let pvc_name = pvc::pvc_name(instance, kind);
    match pvc::request_resize(pvc_api, &pvc_name, target).await {
        Ok(()) => {
            ctx.budget.record_action(key, now);
            let rounded = round_up(target, PVC_GRANULARITY);
            *effective_size = (*effective_size).max(rounded);
            let action = SizingAction {
                kind: action_kind.clone(),
                from: format_quantity(from),
                to: format_quantity(rounded),
                timestamp: now.to_rfc3339(),
                instance: instance.to_string(),
                result: "Issued".to_string(),
            };
            info!(
                volume = %kind,
                instance = %instance,
                from = %action.from,
                to = %action.to,
                kind_of_action = %action_kind,
                "issued volume grow"
            );
            publish_event(
                ctx,
                cluster,
                EventType::Normal,
                &action_kind.to_string(),
                "ResizeVolume",
                format!(
                    "growing {} volume of {} from {} to {}",
                    kind, instance, action.from, action.to
                ),
            )
            .await;
            actions.push(action);
            Some(VolumePhase::Resizing)
        }
        Err(Error::PatchConflict(msg)) => {
            // Someone else touched the PVC; no budget consumed, state
            // unchanged, next cycle retries.
            warn!(volume = %kind, instance = %instance, "resize conflict: {}", msg);
            publish_event(
                ctx,
                cluster,
                EventType::Warning,
                "PatchConflict",
                "ResizeVolume",
                format!("conflicting update on {}, retrying next cycle", pvc_name),
            )
            .await;
            None
        }
        Err(e) => {
            warn!(volume = %kind, instance = %instance, "resize failed: {}", e);
            None
        }
    }
}

/// Stats for one volume kind out of an instance report.
fn volume_stats<'a>(report: &'a StorageReport, kind: &VolumeKind) -> Option<&'a VolumeStats> {
    let rendered = kind.to_string();
    report
        .volumes
        .iter()
        .find(|v| v.kind == rendered)
        .map(|v| &v.stats)
}

/// Resolve the WAL gate for one instance.
///
/// Returns the engine verdict, the condition value (Some(healthy) or None
/// for unknown), and whether a fail-open warning should be published.
fn resolve_wal_safety(
    wal: Option<&WalHealthStatus>,
    check: Option<&WalCheckSpec>,
) -> (WalSafety, Option<bool>, bool) {
    match wal {
        Some(status) => {
            let ceiling = check.map_or(u64::MAX, |c| c.max_pending_archive_files);
            let healthy = status.archive_healthy && status.pending_archive_files <= ceiling;
            if healthy {
                (WalSafety::Safe, Some(true), false)
            } else {
                (
                    WalSafety::Blocked(BlockReason::WalArchiveUnhealthy),
                    Some(false),
                    false,
                )
            }
        }
        None => {
            let on_unknown = check
                .map(|c| c.on_unknown_health.clone())
                .unwrap_or_default();
            match on_unknown {
                OnUnknownWalHealth::FailClosed => (
                    WalSafety::Blocked(BlockReason::WalHealthUnknown),
                    None,
                    false,
                ),
                OnUnknownWalHealth::FailOpen => (WalSafety::Safe, None, true),
            }
        }
    }
}

/// Merge per-instance WAL condition values: false wins, then unknown.
fn merge_wal_state(acc: Option<bool>, next: Option<bool>) -> Option<bool> {
    match (acc, next) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (None, _) | (_, None) => None,
        _ => Some(true),
    }
}

/// Seed the budget tracker from the persisted action history, grouped by
/// instance. A no-op for keys that already have live state.
fn seed_budget_from_history(
    budget: &BudgetTracker,
    cluster_uid: &str,
    kind: &VolumeKind,
    prev: Option<&VolumeSizingStatus>,
    now: DateTime<Utc>,
) {
    let Some(prev) = prev else { return };

    let mut per_instance: HashMap<String, Vec<DateTime<Utc>>> = HashMap::new();
    for action in &prev.recent_actions {
        if let Ok(ts) = DateTime::parse_from_rfc3339(&action.timestamp) {
            per_instance
                .entry(action.instance.clone())
                .or_default()
                .push(ts.with_timezone(&Utc));
        }
    }

    for (instance, timestamps) in per_instance {
        let key = VolumeKey {
            cluster_uid: cluster_uid.to_string(),
            instance,
            kind: kind.clone(),
        };
        budget.seed(&key, &timestamps, now);
    }
}

/// Drop history entries older than the budget window (plus slack for
/// clock skew between writer and reader).
fn prune_recent_actions(actions: &[SizingAction], now: DateTime<Utc>) -> Vec<SizingAction> {
    let cutoff = now - chrono::Duration::hours(25);
    actions
        .iter()
        .filter(|a| {
            DateTime::parse_from_rfc3339(&a.timestamp)
                .map(|ts| ts.with_timezone(&Utc) > cutoff)
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Publish volume gauges for one evaluated volume.
fn publish_metrics(ctx: &Context, ns: &str, cluster: &str, kind: &VolumeKind, eval: &VolumeEval) {
    let Some(health) = &ctx.health else { return };
    let labels = VolumeLabels {
        namespace: ns.to_string(),
        cluster: cluster.to_string(),
        kind: kind.to_string(),
    };

    if let Ok(target) = parse_quantity(&eval.status.target_size) {
        health
            .metrics
            .volume_target_bytes
            .get_or_create(&labels)
            .set(target as i64);
    }
    if let Ok(effective) = parse_quantity(&eval.status.effective_size) {
        health
            .metrics
            .volume_effective_bytes
            .get_or_create(&labels)
            .set(effective as i64);
    }
    health.metrics.record_state(&labels, &eval.status.state);
    if let Some(budget) = &eval.status.budget {
        health.metrics.record_budget(&labels, budget);
    }
    if let Some(next) = &eval.status.next_maintenance_window
        && let Ok(next) = DateTime::parse_from_rfc3339(next)
    {
        let seconds = (next.with_timezone(&Utc) - Utc::now()).num_seconds().max(0);
        health
            .metrics
            .seconds_until_next_window
            .get_or_create(&labels)
            .set(seconds);
    }
}

/// Publish a Kubernetes event; failures are logged and ignored.
async fn publish_event(
    ctx: &Context,
    cluster: &PostgresCluster,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
) {
    let recorder = Recorder::new(ctx.client.clone(), ctx.reporter.clone());
    let event = Event {
        type_,
        reason: reason.to_string(),
        note: Some(note),
        action: action.to_string(),
        secondary: None,
    };
    if let Err(e) = recorder.publish(&event, &cluster.object_ref(&())).await {
        debug!("failed to publish event: {}", e);
    }
}
