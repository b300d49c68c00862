//! Maintenance window evaluation scenarios

use chrono::{TimeZone, Utc};
use postgres_volume_operator::controller::window::{MaintenanceWindow, WindowError, evaluate};

use crate::fixtures::nightly_window;

#[test]
fn nightly_window_opens_and_closes() {
    let window = MaintenanceWindow::from_spec(&nightly_window()).unwrap();

    let inside = Utc.with_ymd_and_hms(2026, 8, 6, 3, 15, 0).unwrap();
    let outside = Utc.with_ymd_and_hms(2026, 8, 6, 14, 0, 0).unwrap();

    assert!(window.is_open(inside));
    assert!(!window.is_open(outside));
}

#[test]
fn no_window_means_always_open() {
    let verdict = evaluate(None, Utc::now()).unwrap();
    assert!(verdict.open);
}

#[test]
fn malformed_schedule_fails_safe() {
    let mut spec = nightly_window();
    spec.schedule = "every other tuesday".to_string();
    assert!(matches!(
        evaluate(Some(&spec), Utc::now()),
        Err(WindowError::InvalidSchedule { .. })
    ));
}

#[test]
fn next_start_is_strictly_in_the_future() {
    let window = MaintenanceWindow::from_spec(&nightly_window()).unwrap();

    // Asking exactly at a fire time yields the following occurrence.
    let at_fire = Utc.with_ymd_and_hms(2026, 8, 6, 2, 0, 0).unwrap();
    let next = window.next_window_start(at_fire).unwrap();
    assert!(next > at_fire);
    assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 7, 2, 0, 0).unwrap());
}

#[test]
fn weekly_window_is_found_within_lookback() {
    let mut spec = nightly_window();
    // Saturdays at 23:00 for 4h, crossing midnight into Sunday.
    spec.schedule = "0 0 23 * * Sat".to_string();
    spec.duration = "4h".to_string();
    let window = MaintenanceWindow::from_spec(&spec).unwrap();

    // 2026-08-01 is a Saturday; 01:30 Sunday is inside the window.
    let sunday_night = Utc.with_ymd_and_hms(2026, 8, 2, 1, 30, 0).unwrap();
    assert!(window.is_open(sunday_night));

    // Wednesday is far outside.
    let wednesday = Utc.with_ymd_and_hms(2026, 8, 5, 1, 30, 0).unwrap();
    assert!(!window.is_open(wednesday));
}

#[test]
fn timezone_is_respected() {
    let mut spec = nightly_window();
    spec.timezone = "America/New_York".to_string();
    let window = MaintenanceWindow::from_spec(&spec).unwrap();

    // 02:30 New York in August is 06:30 UTC.
    let inside = Utc.with_ymd_and_hms(2026, 8, 6, 6, 30, 0).unwrap();
    let outside = Utc.with_ymd_and_hms(2026, 8, 6, 2, 30, 0).unwrap();
    assert!(window.is_open(inside));
    assert!(!window.is_open(outside));
}
