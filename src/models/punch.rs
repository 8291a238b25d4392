//! Punch state and its reducer.
//!
//! One `PunchState` exists per employee session. Three writers feed it: the
//! periodic reconciler (authoritative), the punch mutator (short-lived local
//! override) and the one-second ticker (derived display value only). Every
//! write goes through an explicit reducer method here, so the ordering and
//! staleness rules live in one place instead of being scattered across the
//! callers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::calculate::{self, DEFAULT_EXPECTED_WORK_MINUTES};

/// Authoritative snapshot produced by one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileSnapshot {
    pub is_checked_in: bool,
    pub check_in_at: Option<DateTime<Utc>>,
    pub check_out_at: Option<DateTime<Utc>>,
    pub expected_work_minutes: Option<i64>,
}

/// Live attendance state for the current day.
#[derive(Debug, Clone, Serialize)]
pub struct PunchState {
    /// An open punch-in exists with no matching punch-out.
    pub is_checked_in: bool,

    /// First punch-in of the day; `None` until one exists.
    pub check_in_at: Option<DateTime<Utc>>,

    /// Punch-out timestamp; meaningful only while not checked in.
    pub check_out_at: Option<DateTime<Utc>>,

    /// Elapsed worked time. Live (now − check_in_at) while checked in,
    /// frozen at check_out_at − check_in_at after check-out, zero without
    /// a check-in. Never negative.
    pub working_duration: Duration,

    /// Expected minutes from today's schedule, defaulted when unavailable.
    pub expected_work_minutes: i64,

    /// Minutes still owed against the schedule; `None` until a check-in
    /// exists ("no data yet" is not "fully rested").
    pub remaining_minutes: Option<i64>,

    /// Minutes worked beyond the schedule; `None` until a check-in exists.
    pub overtime_minutes: Option<i64>,

    /// A punch submission or reconciliation fetch is outstanding.
    pub in_flight: bool,

    /// Sequence number of the last applied reconciliation pass.
    pub last_reconciled_seq: u64,

    /// False until the first reconciliation pass lands (mount is
    /// "unknown/loading", not "no punches").
    pub loaded: bool,
}

impl Default for PunchState {
    fn default() -> Self {
        Self {
            is_checked_in: false,
            check_in_at: None,
            check_out_at: None,
            working_duration: Duration::ZERO,
            expected_work_minutes: DEFAULT_EXPECTED_WORK_MINUTES,
            remaining_minutes: None,
            overtime_minutes: None,
            in_flight: false,
            last_reconciled_seq: 0,
            loaded: false,
        }
    }
}

impl PunchState {
    /// Apply an authoritative reconciliation pass.
    ///
    /// Returns `false` and leaves the state untouched when `seq` is not newer
    /// than the last applied pass: a slow response must never overwrite the
    /// result of a later one.
    pub fn apply_reconciliation(
        &mut self,
        seq: u64,
        snapshot: ReconcileSnapshot,
        now: DateTime<Utc>,
    ) -> bool {
        if seq <= self.last_reconciled_seq {
            return false;
        }
        self.last_reconciled_seq = seq;

        self.is_checked_in = snapshot.is_checked_in;
        self.check_in_at = snapshot.check_in_at;
        self.check_out_at = snapshot.check_out_at;
        self.expected_work_minutes = snapshot
            .expected_work_minutes
            .unwrap_or(DEFAULT_EXPECTED_WORK_MINUTES);

        // Seed the live duration so the ticker continues smoothly, or freeze
        // it when the day is already closed out.
        let end = match (self.is_checked_in, self.check_out_at) {
            (false, Some(out)) => out,
            _ => now,
        };
        self.recompute(end);
        self.loaded = true;
        true
    }

    /// Optimistic local check-in, applied only after the service acked.
    pub fn apply_check_in(&mut self, now: DateTime<Utc>) {
        self.is_checked_in = true;
        self.check_in_at = Some(now);
        self.check_out_at = None;
        self.recompute(now);
        self.loaded = true;
    }

    /// Optimistic local check-out; freezes `working_duration`.
    pub fn apply_check_out(&mut self, now: DateTime<Utc>) {
        self.is_checked_in = false;
        self.check_out_at = Some(now);
        self.recompute(now);
        self.loaded = true;
    }

    /// One ticker beat: re-derive the live duration, nothing else.
    ///
    /// Writes `working_duration` only; punch fields belong to the reconciler
    /// and the mutator. A frozen (checked-out) duration stays frozen.
    pub fn apply_tick(&mut self, now: DateTime<Utc>) {
        if !self.is_checked_in {
            return;
        }
        if let Some(check_in_at) = self.check_in_at {
            let elapsed = (now - check_in_at).num_seconds().max(0);
            self.working_duration = Duration::from_secs(elapsed as u64);
        }
    }

    fn recompute(&mut self, end: DateTime<Utc>) {
        let breakdown = calculate::compute_durations(
            self.check_in_at,
            end,
            Some(self.expected_work_minutes),
        );
        self.working_duration = Duration::from_secs(breakdown.worked_seconds as u64);
        self.remaining_minutes = breakdown.remaining_minutes;
        self.overtime_minutes = breakdown.overtime_minutes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    fn checked_in_snapshot(check_in: DateTime<Utc>) -> ReconcileSnapshot {
        ReconcileSnapshot {
            is_checked_in: true,
            check_in_at: Some(check_in),
            check_out_at: None,
            expected_work_minutes: Some(480),
        }
    }

    #[test]
    fn test_initial_state_is_unloaded() {
        let state = PunchState::default();
        assert!(!state.loaded);
        assert!(!state.is_checked_in);
        assert_eq!(state.working_duration, Duration::ZERO);
        assert_eq!(state.remaining_minutes, None);
        assert_eq!(state.overtime_minutes, None);
    }

    #[test]
    fn test_reconciliation_applies_and_seeds_duration() {
        let mut state = PunchState::default();
        let applied = state.apply_reconciliation(1, checked_in_snapshot(at(9, 0)), at(9, 30));

        assert!(applied);
        assert!(state.loaded);
        assert!(state.is_checked_in);
        assert_eq!(state.check_in_at, Some(at(9, 0)));
        assert_eq!(state.working_duration, Duration::from_secs(30 * 60));
        assert_eq!(state.remaining_minutes, Some(450));
        assert_eq!(state.last_reconciled_seq, 1);
    }

    #[test]
    fn test_stale_reconciliation_is_discarded() {
        let mut state = PunchState::default();
        state.apply_reconciliation(2, checked_in_snapshot(at(9, 0)), at(9, 30));
        let before = state.clone();

        // A pass issued earlier but completing later must change nothing.
        let stale = ReconcileSnapshot {
            is_checked_in: false,
            check_in_at: None,
            check_out_at: None,
            expected_work_minutes: Some(300),
        };
        let applied = state.apply_reconciliation(1, stale, at(9, 31));

        assert!(!applied);
        assert_eq!(state.is_checked_in, before.is_checked_in);
        assert_eq!(state.check_in_at, before.check_in_at);
        assert_eq!(state.check_out_at, before.check_out_at);
        assert_eq!(state.expected_work_minutes, before.expected_work_minutes);
        assert_eq!(state.last_reconciled_seq, 2);
    }

    #[test]
    fn test_equal_seq_is_discarded() {
        let mut state = PunchState::default();
        state.apply_reconciliation(1, checked_in_snapshot(at(9, 0)), at(9, 30));
        assert!(!state.apply_reconciliation(1, checked_in_snapshot(at(10, 0)), at(10, 30)));
        assert_eq!(state.check_in_at, Some(at(9, 0)));
    }

    #[test]
    fn test_reconciliation_freezes_closed_day() {
        let mut state = PunchState::default();
        let snapshot = ReconcileSnapshot {
            is_checked_in: false,
            check_in_at: Some(at(9, 0)),
            check_out_at: Some(at(18, 0)),
            expected_work_minutes: Some(480),
        };
        state.apply_reconciliation(1, snapshot, at(20, 0));

        // Frozen at check-out, not "now".
        assert_eq!(state.working_duration, Duration::from_secs(540 * 60));
        assert_eq!(state.remaining_minutes, Some(0));
        assert_eq!(state.overtime_minutes, Some(60));
    }

    #[test]
    fn test_tick_is_monotonic_while_checked_in() {
        let mut state = PunchState::default();
        state.apply_reconciliation(1, checked_in_snapshot(at(9, 0)), at(9, 0));

        let mut previous = state.working_duration;
        for seconds in 1..=120 {
            state.apply_tick(at(9, 0) + ChronoDuration::seconds(seconds));
            assert!(state.working_duration >= previous);
            previous = state.working_duration;
        }
        assert_eq!(state.working_duration, Duration::from_secs(120));
    }

    #[test]
    fn test_tick_writes_duration_only() {
        let mut state = PunchState::default();
        state.apply_reconciliation(1, checked_in_snapshot(at(9, 0)), at(9, 0));
        state.apply_tick(at(9, 45));

        assert_eq!(state.check_in_at, Some(at(9, 0)));
        assert!(state.is_checked_in);
        assert_eq!(state.check_out_at, None);
        assert_eq!(state.working_duration, Duration::from_secs(45 * 60));
    }

    #[test]
    fn test_tick_leaves_frozen_duration_alone() {
        let mut state = PunchState::default();
        state.apply_check_in(at(9, 0));
        state.apply_check_out(at(17, 0));

        state.apply_tick(at(18, 0));
        assert_eq!(state.working_duration, Duration::from_secs(480 * 60));
    }

    #[test]
    fn test_tick_clamps_clock_skew() {
        let mut state = PunchState::default();
        state.apply_reconciliation(1, checked_in_snapshot(at(9, 0)), at(9, 0));

        // Server-side check-in can be ahead of the local clock.
        state.apply_tick(at(8, 59));
        assert_eq!(state.working_duration, Duration::ZERO);
    }

    #[test]
    fn test_check_out_equals_span_between_punches() {
        let mut state = PunchState::default();
        state.apply_check_in(at(9, 0));
        state.apply_check_out(at(18, 0));

        assert!(!state.is_checked_in);
        assert_eq!(state.working_duration, Duration::from_secs(540 * 60));
        assert_eq!(state.overtime_minutes, Some(60));
        assert_eq!(state.remaining_minutes, Some(0));
    }

    #[test]
    fn test_check_in_resets_previous_check_out() {
        let mut state = PunchState::default();
        state.apply_check_in(at(9, 0));
        state.apply_check_out(at(12, 0));
        state.apply_check_in(at(13, 0));

        assert!(state.is_checked_in);
        assert_eq!(state.check_in_at, Some(at(13, 0)));
        assert_eq!(state.check_out_at, None);
        assert_eq!(state.working_duration, Duration::ZERO);
    }
}
