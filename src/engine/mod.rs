//! Punch tracking engine.
//!
//! Coordinates three independently-scheduled activities over one shared
//! [`PunchState`]:
//! 1. a one-second ticker re-deriving the live worked duration,
//! 2. a periodic reconciler pulling authoritative state from the service,
//! 3. an on-demand punch mutator applying optimistic updates after the
//!    service acknowledges a check-in/check-out.
//!
//! The reconciler is the source of truth; the mutator is a short-lived local
//! override that a deferred reconciliation pass corrects shortly after; the
//! ticker only recomputes the displayed duration from whichever timestamp is
//! currently authoritative. Sequence numbers assigned at issuance keep a slow
//! reconciliation response from overwriting a newer one.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::client::{AttendanceClient, ClientError, PunchStatusKind};
use crate::clock::Clock;
use crate::geo::{Coordinates, GeolocationSource};
use crate::models::{PunchState, ReconcileSnapshot};
use crate::notify::Notifier;

/// Errors the engine surfaces to its caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("an employee id is required for punch actions")]
    MissingEmployeeId,

    #[error("reconciliation failed: {0}")]
    Reconciliation(#[source] ClientError),

    #[error("punch submission failed: {0}")]
    Submission(#[source] ClientError),
}

/// Direction of a punch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunchDirection {
    In,
    Out,
}

impl fmt::Display for PunchDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PunchDirection::In => write!(f, "check-in"),
            PunchDirection::Out => write!(f, "check-out"),
        }
    }
}

/// Result of a punch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunchOutcome {
    /// Acknowledged by the service and applied locally.
    Applied,

    /// Another punch was already in flight; the command was dropped without
    /// a network call (debounce, not an error).
    Ignored,
}

/// Tunable intervals and the employee identity the engine acts for.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub employee_id: Option<String>,
    pub tick_interval: Duration,
    pub reconcile_interval: Duration,
    pub deferred_reconcile_delay: Duration,
    pub geolocation_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            employee_id: None,
            tick_interval: Duration::from_secs(1),
            reconcile_interval: Duration::from_secs(60),
            deferred_reconcile_delay: Duration::from_millis(500),
            geolocation_timeout: Duration::from_secs(3),
        }
    }
}

/// The punch tracking engine. One instance per employee session.
pub struct PunchEngine {
    options: EngineOptions,
    client: Arc<dyn AttendanceClient>,
    geo: Arc<dyn GeolocationSource>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    state: Arc<RwLock<PunchState>>,
    reconcile_seq: AtomicU64,
    punch_in_flight: AtomicBool,
    reconcile_in_flight: AtomicBool,
    // std Mutex, never held across an await: teardown must be able to abort
    // the deferred pass from a synchronous Drop.
    deferred: Mutex<Option<JoinHandle<()>>>,
}

impl PunchEngine {
    pub fn new(
        options: EngineOptions,
        client: Arc<dyn AttendanceClient>,
        geo: Arc<dyn GeolocationSource>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            options,
            client,
            geo,
            notifier,
            clock,
            state: Arc::new(RwLock::new(PunchState::default())),
            reconcile_seq: AtomicU64::new(0),
            punch_in_flight: AtomicBool::new(false),
            reconcile_in_flight: AtomicBool::new(false),
            deferred: Mutex::new(None),
        }
    }

    /// Snapshot of the current punch state.
    pub async fn state(&self) -> PunchState {
        self.state.read().await.clone()
    }

    /// Advance the live worked duration by one ticker beat.
    ///
    /// Reads the clock, writes `working_duration`, nothing else; the ticker
    /// never touches punch fields and never suspends on the network.
    pub async fn tick_once(&self) {
        let now = self.clock.now();
        self.state.write().await.apply_tick(now);
    }

    /// Run one reconciliation pass against the service.
    ///
    /// Returns `Ok(true)` when the pass applied, `Ok(false)` when it was
    /// skipped (another pass in flight) or discarded as stale. Both fetches
    /// must succeed; on any failure the previous state is retained whole.
    pub async fn reconcile_once(&self) -> Result<bool, EngineError> {
        let Some(employee_id) = self.options.employee_id.clone() else {
            return Err(EngineError::MissingEmployeeId);
        };

        // Gates duplicate reconciliation passes only, never the mutator.
        if self.reconcile_in_flight.swap(true, Ordering::SeqCst) {
            debug!("Reconciliation already in flight, skipping pass");
            return Ok(false);
        }
        self.refresh_in_flight().await;

        let result = self.reconcile_inner(&employee_id).await;

        self.reconcile_in_flight.store(false, Ordering::SeqCst);
        self.refresh_in_flight().await;
        result
    }

    async fn reconcile_inner(&self, employee_id: &str) -> Result<bool, EngineError> {
        // Sequence assigned at issuance: a pass that finishes after a
        // later-issued one committed must be discarded by the reducer.
        let seq = self.reconcile_seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(seq, "Starting reconciliation pass");

        let (status, schedule) = tokio::try_join!(
            self.client.punch_status(employee_id),
            self.client.today_schedule(),
        )
        .map_err(|e| {
            self.notifier
                .error(&format!("Could not refresh attendance status: {}", e));
            EngineError::Reconciliation(e)
        })?;

        let snapshot = ReconcileSnapshot {
            is_checked_in: status.current_status == PunchStatusKind::In,
            check_in_at: status.actual_in_time,
            check_out_at: status.actual_out_time,
            expected_work_minutes: schedule.expected_work_minutes(),
        };

        let now = self.clock.now();
        let mut state = self.state.write().await;
        let applied = state.apply_reconciliation(seq, snapshot, now);
        if applied {
            debug!(seq, "Reconciliation pass applied");
        } else {
            debug!(seq, "Discarded stale reconciliation pass");
        }
        Ok(applied)
    }

    /// Handle a user check-in/check-out command.
    ///
    /// Validates identity, debounces re-entrant taps, captures best-effort
    /// geolocation, submits, and only after the service acknowledges applies
    /// the optimistic local update and schedules one deferred reconciliation
    /// pass to correct any drift against server-computed timestamps.
    pub async fn punch(self: Arc<Self>, direction: PunchDirection) -> Result<PunchOutcome, EngineError> {
        let Some(employee_id) = self.options.employee_id.clone() else {
            return Err(EngineError::MissingEmployeeId);
        };

        if self.punch_in_flight.swap(true, Ordering::SeqCst) {
            debug!("Punch already in flight, ignoring {}", direction);
            return Ok(PunchOutcome::Ignored);
        }
        self.refresh_in_flight().await;

        let result = self.submit(&employee_id, direction).await;

        self.punch_in_flight.store(false, Ordering::SeqCst);
        self.refresh_in_flight().await;

        match result {
            Ok(()) => {
                info!("{} acknowledged for employee {}", direction, employee_id);
                self.notifier.success(&match direction {
                    PunchDirection::In => "Checked in".to_string(),
                    PunchDirection::Out => "Checked out".to_string(),
                });
                Arc::clone(&self).schedule_deferred_reconcile();
                Ok(PunchOutcome::Applied)
            }
            Err(e) => {
                self.notifier
                    .error(&format!("Could not record {}: {}", direction, e));
                Err(e)
            }
        }
    }

    async fn submit(&self, employee_id: &str, direction: PunchDirection) -> Result<(), EngineError> {
        let coordinates = self.acquire_location().await;

        match direction {
            PunchDirection::In => self.client.check_in(employee_id, coordinates).await,
            PunchDirection::Out => self.client.check_out(employee_id, coordinates).await,
        }
        .map_err(EngineError::Submission)?;

        // Optimistic update, strictly after the acknowledgement.
        let now = self.clock.now();
        let mut state = self.state.write().await;
        match direction {
            PunchDirection::In => state.apply_check_in(now),
            PunchDirection::Out => state.apply_check_out(now),
        }
        Ok(())
    }

    /// Best-effort, time-bounded position capture. Never fails the punch.
    async fn acquire_location(&self) -> Option<Coordinates> {
        match timeout(self.options.geolocation_timeout, self.geo.locate()).await {
            Ok(Ok(coordinates)) => Some(coordinates),
            Ok(Err(e)) => {
                debug!("Proceeding without geolocation: {}", e);
                None
            }
            Err(_) => {
                debug!(
                    "Geolocation timed out after {:?}, proceeding without it",
                    self.options.geolocation_timeout
                );
                None
            }
        }
    }

    /// Schedule one delayed pass to pull authoritative state after a punch.
    ///
    /// The pass takes its sequence number at issuance like any other, so the
    /// reducer's ignore-if-stale rule covers it against the periodic poll.
    /// A newer punch supersedes any still-pending deferred pass.
    fn schedule_deferred_reconcile(self: Arc<Self>) {
        let engine = Arc::clone(&self);
        let delay = self.options.deferred_reconcile_delay;
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            if let Err(e) = engine.reconcile_once().await {
                warn!("Deferred reconciliation failed: {}", e);
            }
        });

        let mut deferred = self.deferred.lock().unwrap();
        if let Some(previous) = deferred.replace(handle) {
            previous.abort();
        }
    }

    async fn refresh_in_flight(&self) {
        let outstanding = self.punch_in_flight.load(Ordering::SeqCst)
            || self.reconcile_in_flight.load(Ordering::SeqCst);
        self.state.write().await.in_flight = outstanding;
    }

    /// Spawn the ticker and reconciler loops ("mount" the widget).
    ///
    /// The reconciler runs immediately, then every `reconcile_interval`.
    /// Dropping or shutting down the returned handle cancels both loops and
    /// any outstanding deferred pass.
    pub fn spawn(self: Arc<Self>) -> EngineHandle {
        let ticker_engine = Arc::clone(&self);
        let ticker = tokio::spawn(async move {
            let mut beat = interval(ticker_engine.options.tick_interval);
            beat.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                beat.tick().await;
                ticker_engine.tick_once().await;
            }
        });

        let reconciler_engine = Arc::clone(&self);
        let reconciler = tokio::spawn(async move {
            let mut poll = interval(reconciler_engine.options.reconcile_interval);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                poll.tick().await;
                if let Err(e) = reconciler_engine.reconcile_once().await {
                    // Failed passes keep the previous state; the next
                    // scheduled pass proceeds normally.
                    error!("Reconciliation pass failed: {}", e);
                }
            }
        });

        EngineHandle {
            engine: self,
            ticker,
            reconciler,
        }
    }
}

/// Handle over a mounted engine. Aborts every scheduled task on shutdown
/// and on drop, so an unmounted widget never keeps polling.
pub struct EngineHandle {
    engine: Arc<PunchEngine>,
    ticker: JoinHandle<()>,
    reconciler: JoinHandle<()>,
}

impl EngineHandle {
    pub fn engine(&self) -> &Arc<PunchEngine> {
        &self.engine
    }

    /// Cancel the ticker, the reconciliation poll and any outstanding
    /// deferred reconciliation timer.
    pub fn shutdown(&self) {
        self.ticker.abort();
        self.reconciler.abort();
        if let Some(deferred) = self.engine.deferred.lock().unwrap().take() {
            deferred.abort();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
