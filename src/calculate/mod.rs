//! Work-duration arithmetic.
//!
//! Pure functions computing worked/remaining/overtime minutes from punch
//! timestamps and the day's expected schedule. The caller supplies the end
//! instant (check-out time, or "now" while a punch is open); nothing here
//! reads the clock or the network.

use chrono::{DateTime, Utc};

/// Fallback schedule when the day's schedule lookup is unavailable: 8 hours.
pub const DEFAULT_EXPECTED_WORK_MINUTES: i64 = 480;

/// Breakdown of a day's worked time against the expected schedule.
///
/// `remaining_minutes`/`overtime_minutes` are `None` when no check-in exists
/// yet: "no data" is distinct from "fully rested".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationBreakdown {
    pub worked_minutes: i64,
    pub worked_seconds: i64,
    pub remaining_minutes: Option<i64>,
    pub overtime_minutes: Option<i64>,
}

/// Compute worked/remaining/overtime quantities.
///
/// `end` is the check-out timestamp if one exists, otherwise the current time.
/// Negative spans (clock skew) clamp to zero. A missing schedule falls back to
/// [`DEFAULT_EXPECTED_WORK_MINUTES`].
pub fn compute_durations(
    check_in_at: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
    expected_work_minutes: Option<i64>,
) -> DurationBreakdown {
    let expected = expected_work_minutes.unwrap_or(DEFAULT_EXPECTED_WORK_MINUTES);

    let Some(check_in_at) = check_in_at else {
        return DurationBreakdown {
            worked_minutes: 0,
            worked_seconds: 0,
            remaining_minutes: None,
            overtime_minutes: None,
        };
    };

    let worked_seconds = (end - check_in_at).num_seconds().max(0);
    let worked_minutes = worked_seconds / 60;

    DurationBreakdown {
        worked_minutes,
        worked_seconds,
        remaining_minutes: Some((expected - worked_minutes).max(0)),
        overtime_minutes: Some((worked_minutes - expected).max(0)),
    }
}
