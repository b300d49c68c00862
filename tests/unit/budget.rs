//! Rolling-window budget scenarios

use chrono::{Duration, Utc};
use postgres_volume_operator::controller::budget::BudgetTracker;
use postgres_volume_operator::crd::{VolumeKey, VolumeKind};

fn key(instance: &str) -> VolumeKey {
    VolumeKey {
        cluster_uid: "uid-test".to_string(),
        instance: instance.to_string(),
        kind: VolumeKind::Data,
    }
}

#[test]
fn reserved_slot_survives_planned_exhaustion() {
    // maxActionsPerDay=3, reservedForEmergency=1: after two planned actions
    // a further planned grow is blocked while an emergency still succeeds.
    let tracker = BudgetTracker::new();
    let now = Utc::now();
    let k = key("pg-1");

    assert!(tracker.has_budget(&k, 3, 1, false, now));
    tracker.record_action(&k, now - Duration::hours(5));
    assert!(tracker.has_budget(&k, 3, 1, false, now));
    tracker.record_action(&k, now - Duration::hours(2));

    assert!(!tracker.has_budget(&k, 3, 1, false, now));
    assert!(tracker.has_budget(&k, 3, 1, true, now));
}

#[test]
fn budget_returns_as_window_rolls() {
    let tracker = BudgetTracker::new();
    let now = Utc::now();
    let k = key("pg-1");

    tracker.record_action(&k, now - Duration::hours(23));
    tracker.record_action(&k, now - Duration::hours(1));
    assert_eq!(tracker.remaining_budget(&k, 2, now), 0);

    // Two hours later the older action has expired.
    let later = now + Duration::hours(2);
    assert_eq!(tracker.remaining_budget(&k, 2, later), 1);
}

#[test]
fn replayed_history_matches_live_tracking() {
    // A tracker seeded from persisted history grants exactly what a tracker
    // that lived through the actions would.
    let now = Utc::now();
    let timestamps = [
        now - Duration::hours(20),
        now - Duration::hours(6),
        now - Duration::hours(30), // expired, must not count
    ];

    let live = BudgetTracker::new();
    for ts in &timestamps {
        live.record_action(&key("pg-1"), *ts);
    }

    let replayed = BudgetTracker::new();
    replayed.seed(&key("pg-1"), &timestamps, now);

    for max in [1u32, 2, 3, 6] {
        assert_eq!(
            live.remaining_budget(&key("pg-1"), max, now),
            replayed.remaining_budget(&key("pg-1"), max, now),
            "max={}",
            max
        );
    }
}

#[test]
fn instances_do_not_share_budget() {
    let tracker = BudgetTracker::new();
    let now = Utc::now();

    tracker.record_action(&key("pg-1"), now);
    tracker.record_action(&key("pg-1"), now);

    assert!(!tracker.has_budget(&key("pg-1"), 2, 0, false, now));
    assert!(tracker.has_budget(&key("pg-2"), 2, 0, false, now));
}

#[test]
fn snapshot_reflects_split() {
    let tracker = BudgetTracker::new();
    let now = Utc::now();
    let k = key("pg-1");
    tracker.record_action(&k, now - Duration::minutes(30));

    let status = tracker.status(&k, 6, 2, now);
    assert_eq!(status.actions_last24h, 1);
    assert_eq!(status.available_for_emergency, 5);
    assert_eq!(status.available_for_planned, 3);
}
