//! Maintenance window evaluation
//!
//! A window is a cron schedule plus a duration, evaluated in a configured
//! timezone. Scheduling libraries only answer "when is the next fire?", so
//! "is now inside an occurrence?" is computed by scanning forward from a
//! bounded point in the past and keeping the most recent fire at or before
//! now; the window is `[fire, fire + duration)`.
//!
//! No schedule configured means growth is always permitted. A malformed
//! schedule is always closed: a typo must never silently turn into
//! "grow whenever".

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use thiserror::Error;
use tracing::debug;

use crate::crd::MaintenanceWindowSpec;

/// Lookback floor for the backward scan. At least the window duration, and
/// generous enough to tolerate irregular schedules (e.g. weekly windows).
const MIN_LOOKBACK_HOURS: i64 = 48;

/// Safety cap on scan steps for pathologically dense schedules
/// (second-granularity cron lines). Hitting the cap means fires are so
/// dense that the latest one is effectively "now".
const MAX_SCAN_STEPS: usize = 100_000;

/// Errors from window configuration
#[derive(Debug, Error)]
pub enum WindowError {
    #[error("invalid cron schedule {schedule:?}: {details}")]
    InvalidSchedule { schedule: String, details: String },

    #[error("invalid window duration {0:?}")]
    InvalidDuration(String),

    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),
}

/// Window gate outcome for one evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowVerdict {
    /// Whether scheduled growth is permitted right now
    pub open: bool,
    /// Start of the next window, when a schedule is configured
    pub next_start: Option<DateTime<Utc>>,
}

/// A parsed maintenance window
pub struct MaintenanceWindow {
    schedule: Schedule,
    duration: Duration,
    tz: Tz,
}

impl MaintenanceWindow {
    /// Parse a window spec. Fails on a malformed schedule, duration, or
    /// timezone; callers treat failure as "window closed" plus a surfaced
    /// configuration condition.
    pub fn from_spec(spec: &MaintenanceWindowSpec) -> Result<Self, WindowError> {
        let schedule =
            Schedule::from_str(&spec.schedule).map_err(|e| WindowError::InvalidSchedule {
                schedule: spec.schedule.clone(),
                details: e.to_string(),
            })?;
        let duration = parse_window_duration(&spec.duration)
            .ok_or_else(|| WindowError::InvalidDuration(spec.duration.clone()))?;
        let tz: Tz = spec
            .timezone
            .parse()
            .map_err(|_| WindowError::UnknownTimezone(spec.timezone.clone()))?;
        Ok(Self {
            schedule,
            duration,
            tz,
        })
    }

    /// Whether `now` falls inside an occurrence of the window.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.current_window(now).is_some()
    }

    /// The occurrence containing `now`, if any, as `(start, end)` in UTC.
    ///
    /// A fire earlier than `now - duration` has already closed, so scanning
    /// one duration back is sufficient for openness; the scan still walks
    /// the full lookback so the invariant holds for irregular schedules.
    pub fn current_window(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let now_local = now.with_timezone(&self.tz);
        let lookback = self.duration.max(Duration::hours(MIN_LOOKBACK_HOURS));
        let scan_start = now_local - lookback;

        let mut latest_fire = None;
        for (steps, fire) in self.schedule.after(&scan_start).enumerate() {
            if fire > now_local {
                break;
            }
            if steps >= MAX_SCAN_STEPS {
                // Absurdly dense schedule. Closed is the safe answer here,
                // same as for a malformed schedule.
                debug!(steps, "window scan cap reached, treating window as closed");
                return None;
            }
            latest_fire = Some(fire);
        }

        let fire = latest_fire?;
        let end = fire + self.duration;
        if now_local < end {
            Some((fire.with_timezone(&Utc), end.with_timezone(&Utc)))
        } else {
            None
        }
    }

    /// First fire strictly after `now`, in UTC.
    pub fn next_window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&now.with_timezone(&self.tz))
            .next()
            .map(|fire| fire.with_timezone(&Utc))
    }
}

/// Evaluate the window gate for a volume.
///
/// No configured window means always open. Parse failures propagate so the
/// caller can surface `ConfigurationInvalid` and keep the gate closed.
pub fn evaluate(
    spec: Option<&MaintenanceWindowSpec>,
    now: DateTime<Utc>,
) -> Result<WindowVerdict, WindowError> {
    match spec {
        None => Ok(WindowVerdict {
            open: true,
            next_start: None,
        }),
        Some(spec) => {
            let window = MaintenanceWindow::from_spec(spec)?;
            Ok(WindowVerdict {
                open: window.is_open(now),
                next_start: window.next_window_start(now),
            })
        }
    }
}

/// Parse a window duration like "2h", "90m", "1h30m".
fn parse_window_duration(input: &str) -> Option<Duration> {
    let s = input.trim().to_lowercase();
    if s.is_empty() {
        return None;
    }

    let (hours, rest) = match s.split_once('h') {
        Some((h, rest)) => (h.parse::<i64>().ok()?, rest),
        None => (0, s.as_str()),
    };

    let minutes = if rest.is_empty() {
        0
    } else {
        rest.strip_suffix('m')?.parse::<i64>().ok()?
    };

    if hours < 0 || minutes < 0 {
        return None;
    }
    let duration = Duration::hours(hours) + Duration::minutes(minutes);
    if duration <= Duration::zero() {
        return None;
    }
    Some(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn spec(schedule: &str, duration: &str, timezone: &str) -> MaintenanceWindowSpec {
        MaintenanceWindowSpec {
            schedule: schedule.to_string(),
            duration: duration.to_string(),
            timezone: timezone.to_string(),
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    // =========================================================================
    // Duration parsing tests
    // =========================================================================

    #[test]
    fn test_parse_window_duration() {
        assert_eq!(parse_window_duration("2h"), Some(Duration::hours(2)));
        assert_eq!(parse_window_duration("90m"), Some(Duration::minutes(90)));
        assert_eq!(
            parse_window_duration("1h30m"),
            Some(Duration::minutes(90))
        );
    }

    #[test]
    fn test_parse_window_duration_invalid() {
        assert_eq!(parse_window_duration(""), None);
        assert_eq!(parse_window_duration("0m"), None);
        assert_eq!(parse_window_duration("2d"), None);
        assert_eq!(parse_window_duration("h"), None);
        assert_eq!(parse_window_duration("-1h"), None);
    }

    // =========================================================================
    // Window occurrence tests
    // =========================================================================

    #[test]
    fn test_open_inside_daily_window() {
        // Daily at 02:00 UTC for 2h.
        let window = MaintenanceWindow::from_spec(&spec("0 0 2 * * *", "2h", "UTC")).unwrap();
        assert!(window.is_open(utc(2026, 8, 6, 2, 0)));
        assert!(window.is_open(utc(2026, 8, 6, 3, 59)));
    }

    #[test]
    fn test_closed_outside_daily_window() {
        let window = MaintenanceWindow::from_spec(&spec("0 0 2 * * *", "2h", "UTC")).unwrap();
        assert!(!window.is_open(utc(2026, 8, 6, 1, 59)));
        assert!(!window.is_open(utc(2026, 8, 6, 4, 0)));
        assert!(!window.is_open(utc(2026, 8, 6, 12, 0)));
    }

    #[test]
    fn test_window_end_is_exclusive() {
        let window = MaintenanceWindow::from_spec(&spec("0 0 2 * * *", "1h", "UTC")).unwrap();
        let (start, end) = window.current_window(utc(2026, 8, 6, 2, 30)).unwrap();
        assert_eq!(start, utc(2026, 8, 6, 2, 0));
        assert_eq!(end, utc(2026, 8, 6, 3, 0));
        assert!(!window.is_open(end));
    }

    #[test]
    fn test_weekly_window_needs_long_lookback() {
        // Sundays at 01:00 for 3h. 2026-08-02 is a Sunday.
        let window = MaintenanceWindow::from_spec(&spec("0 0 1 * * Sun", "3h", "UTC")).unwrap();
        assert!(window.is_open(utc(2026, 8, 2, 2, 0)));
        // Tuesday: last fire is outside its duration, window closed.
        assert!(!window.is_open(utc(2026, 8, 4, 2, 0)));
    }

    #[test]
    fn test_next_window_start() {
        let window = MaintenanceWindow::from_spec(&spec("0 0 2 * * *", "2h", "UTC")).unwrap();
        let next = window.next_window_start(utc(2026, 8, 6, 3, 0)).unwrap();
        assert_eq!(next, utc(2026, 8, 7, 2, 0));
    }

    #[test]
    fn test_timezone_shifts_window() {
        // 02:00 in Rome is 00:00 UTC during daylight saving.
        let window =
            MaintenanceWindow::from_spec(&spec("0 0 2 * * *", "1h", "Europe/Rome")).unwrap();
        assert!(window.is_open(utc(2026, 8, 6, 0, 30)));
        assert!(!window.is_open(utc(2026, 8, 6, 2, 30)));
    }

    // =========================================================================
    // Gate evaluation tests
    // =========================================================================

    #[test]
    fn test_no_schedule_is_always_open() {
        let verdict = evaluate(None, Utc::now()).unwrap();
        assert!(verdict.open);
        assert!(verdict.next_start.is_none());
    }

    #[test]
    fn test_malformed_schedule_is_an_error() {
        let err = evaluate(Some(&spec("not a cron line", "2h", "UTC")), Utc::now());
        assert!(matches!(err, Err(WindowError::InvalidSchedule { .. })));
    }

    #[test]
    fn test_unknown_timezone_is_an_error() {
        let err = evaluate(Some(&spec("0 0 2 * * *", "2h", "Mars/Olympus")), Utc::now());
        assert!(matches!(err, Err(WindowError::UnknownTimezone(_))));
    }

    #[test]
    fn test_invalid_duration_is_an_error() {
        let err = evaluate(Some(&spec("0 0 2 * * *", "soon", "UTC")), Utc::now());
        assert!(matches!(err, Err(WindowError::InvalidDuration(_))));
    }

    #[test]
    fn test_verdict_carries_next_start_when_closed() {
        let verdict = evaluate(Some(&spec("0 0 2 * * *", "2h", "UTC")), utc(2026, 8, 6, 12, 0))
            .unwrap();
        assert!(!verdict.open);
        assert_eq!(verdict.next_start, Some(utc(2026, 8, 7, 2, 0)));
    }
}
