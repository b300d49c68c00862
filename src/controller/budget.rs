//! Rolling 24h action budget per logical volume
//!
//! Growth is rate-limited so a runaway workload cannot balloon a volume to
//! its ceiling in one day, and a slice of the daily budget is held back for
//! emergencies so scheduled growth can never starve an emergency grow.
//!
//! The tracker is owned by the reconciler context, not a process-wide
//! singleton, and is seeded from the action history persisted in status so
//! a restart does not double-grant budget. Budget is consumed only when a
//! resize request was successfully issued, never on a mere decision.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::crd::{BudgetStatus, VolumeKey};

/// Length of the rolling budget window
pub const BUDGET_WINDOW_HOURS: i64 = 24;

/// Thread-safe rolling-window action tracker keyed by logical volume
#[derive(Debug, Default)]
pub struct BudgetTracker {
    actions: Mutex<HashMap<VolumeKey, Vec<DateTime<Utc>>>>,
}

impl BudgetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an action is available right now.
    ///
    /// Planned requests may not touch the emergency reserve; emergency
    /// requests may consume the whole remaining budget.
    pub fn has_budget(
        &self,
        key: &VolumeKey,
        max_per_day: u32,
        reserved_for_emergency: u32,
        emergency: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        let used = prune_and_count(actions.entry(key.clone()).or_default(), now);

        if emergency {
            used < max_per_day
        } else {
            let reserve = reserved_for_emergency.min(max_per_day);
            used + reserve < max_per_day
        }
    }

    /// Record a successfully issued resize.
    pub fn record_action(&self, key: &VolumeKey, now: DateTime<Utc>) {
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        let window = actions.entry(key.clone()).or_default();
        prune_and_count(window, now);
        window.push(now);
    }

    /// Actions still available in the window, ignoring the reserve split.
    pub fn remaining_budget(&self, key: &VolumeKey, max_per_day: u32, now: DateTime<Utc>) -> u32 {
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        let used = prune_and_count(actions.entry(key.clone()).or_default(), now);
        max_per_day.saturating_sub(used)
    }

    /// Snapshot for the status subresource.
    pub fn status(
        &self,
        key: &VolumeKey,
        max_per_day: u32,
        reserved_for_emergency: u32,
        now: DateTime<Utc>,
    ) -> BudgetStatus {
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        let window = actions.entry(key.clone()).or_default();
        let used = prune_and_count(window, now);

        let reserve = reserved_for_emergency.min(max_per_day);
        let available_for_emergency = max_per_day.saturating_sub(used);
        let available_for_planned = available_for_emergency.saturating_sub(reserve);

        let budget_resets_at = window
            .iter()
            .min()
            .map(|oldest| (*oldest + Duration::hours(BUDGET_WINDOW_HOURS)).to_rfc3339());

        BudgetStatus {
            actions_last24h: used,
            available_for_planned,
            available_for_emergency,
            budget_resets_at,
        }
    }

    /// Seed a volume's window from persisted history. A no-op once the key
    /// has in-memory state, so a seed never erases actions recorded since.
    pub fn seed(&self, key: &VolumeKey, timestamps: &[DateTime<Utc>], now: DateTime<Utc>) {
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        if actions.contains_key(key) {
            return;
        }
        let cutoff = now - Duration::hours(BUDGET_WINDOW_HOURS);
        let window: Vec<DateTime<Utc>> = timestamps
            .iter()
            .copied()
            .filter(|ts| *ts > cutoff)
            .collect();
        actions.insert(key.clone(), window);
    }
}

/// Drop entries older than the window and return how many remain.
fn prune_and_count(window: &mut Vec<DateTime<Utc>>, now: DateTime<Utc>) -> u32 {
    let cutoff = now - Duration::hours(BUDGET_WINDOW_HOURS);
    window.retain(|ts| *ts > cutoff);
    window.len() as u32
}
