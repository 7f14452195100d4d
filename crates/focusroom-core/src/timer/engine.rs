//! Focus session engine.
//!
//! A mutex-guarded state machine fed by one [`Clock`]. Ticks, caller
//! commands and lifecycle signals all funnel through the same lock, so a
//! session is finalized exactly once no matter which of them gets there
//! first.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Completed -> Idle
//!                 -> Failed    -> Idle
//!                 -> Idle               (stopped inside the grace window)
//! ```
//!
//! `Completed` and `Failed` are transient: side effects are dispatched and
//! the engine returns to `Idle` before the lock is released.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = SessionEngine::new(clock, collaborators, EngineSettings::default());
//! let mut events = engine.subscribe();
//! engine.start_session(SessionPlan::templated(template), DisciplineMode::Casual, None)?;
//! // Ticks arrive from the clock; stop early with:
//! engine.stop_session();
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::clock::{CancelHandle, Clock, TickFn};
use super::grace::{GracePeriodGuard, StopDisposition, DEFAULT_GRACE_PERIOD};
use super::lifecycle::{foreground_lost_action, ForegroundAction};
use super::reward::{RewardCalculator, DEFAULT_CREDIT_UNIT_SECS, FAILURE_PENALTY};
use super::sequencer::{self, PhaseStep};
use super::template::{DisciplineMode, Phase, SessionPlan};
use crate::error::Result;
use crate::events::Event;
use crate::session::{
    AchievementNotifier, NewSessionRecord, OutcomeContext, RecordId, RewardLedger,
    SessionOutcome, SessionStore,
};

/// Failure reason for a caller stop past the grace window.
pub const REASON_SESSION_ABORTED: &str = "Session aborted";
/// Failure reason for leaving the app in hardcore mode.
pub const REASON_LEFT_APP: &str = "Left app in hardcore mode";
/// Reason carried by [`Event::SessionCancelled`]. Never shown to users.
pub const REASON_CANCELLED: &str = "aborted";

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Tunables injected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub grace_period: Duration,
    /// Real time per tick. Each tick consumes one second of phase time.
    pub tick_interval: Duration,
    pub credit_unit_secs: u64,
    pub failure_penalty: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            tick_interval: Duration::from_secs(1),
            credit_unit_secs: DEFAULT_CREDIT_UNIT_SECS,
            failure_penalty: FAILURE_PENALTY,
        }
    }
}

/// External services the engine reports outcomes to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn SessionStore>,
    pub ledger: Arc<dyn RewardLedger>,
    pub notifier: Arc<dyn AchievementNotifier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(RecordId),
    /// A session was already running; nothing changed.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing to stop.
    Ignored,
    /// Engine was in a transient state and was reset without side effects.
    Reset,
    /// Stopped inside the grace window; no trace left.
    Cancelled,
    /// Counted as a failure and penalized.
    Failed,
}

/// Working record of the running session. Never leaves the engine.
#[derive(Debug, Clone)]
struct SessionRun {
    record_id: RecordId,
    started_at: Instant,
    started_wall: DateTime<Utc>,
    mode: DisciplineMode,
    plan: SessionPlan,
    current_phase: Phase,
    current_cycle: u32,
    total_cycles: u32,
    planned_work_secs: u64,
    phase_remaining: u64,
    phase_total: u64,
}

struct Inner {
    state: EngineState,
    run: Option<SessionRun>,
    ticker: Option<Box<dyn CancelHandle>>,
    /// Bumped on every arm/disarm; ticks from older armings are dropped.
    generation: u64,
}

struct Shared {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    collaborators: Collaborators,
    settings: EngineSettings,
    guard: GracePeriodGuard,
    rewards: RewardCalculator,
    events: broadcast::Sender<Event>,
}

/// Handle to a focus session engine. Clones share the same engine.
#[derive(Clone)]
pub struct SessionEngine {
    shared: Arc<Shared>,
}

impl SessionEngine {
    pub fn new(
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
        settings: EngineSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: EngineState::Idle,
                    run: None,
                    ticker: None,
                    generation: 0,
                }),
                clock,
                collaborators,
                guard: GracePeriodGuard::new(settings.grace_period),
                rewards: RewardCalculator::new(settings.credit_unit_secs, settings.failure_penalty),
                settings,
                events,
            }),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> EngineState {
        self.shared.lock().state
    }

    pub fn settings(&self) -> EngineSettings {
        self.shared.settings
    }

    /// Read-only view of the current session.
    pub fn snapshot(&self) -> Event {
        let inner = self.shared.lock();
        let run = inner.run.as_ref();
        Event::StateSnapshot {
            state: inner.state,
            mode: run.map(|r| r.mode),
            phase: run.map(|r| r.current_phase),
            cycle: run.map(|r| r.current_cycle).unwrap_or(0),
            total_cycles: run.map(|r| r.total_cycles).unwrap_or(0),
            remaining_secs: run.map(|r| r.phase_remaining).unwrap_or(0),
            total_secs: run.map(|r| r.phase_total).unwrap_or(0),
            at: Utc::now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a session. Ignored unless the engine is idle.
    ///
    /// # Errors
    /// Returns an error if the plan is invalid or the store cannot create
    /// a record. The engine stays idle in both cases.
    pub fn start_session(
        &self,
        plan: SessionPlan,
        mode: DisciplineMode,
        task_ref: Option<String>,
    ) -> Result<StartOutcome> {
        let shared = &self.shared;
        let mut inner = shared.lock();
        if inner.state != EngineState::Idle {
            tracing::warn!(state = ?inner.state, "start ignored: a session is already active");
            return Ok(StartOutcome::Ignored);
        }
        plan.validate()?;

        let started_wall = Utc::now();
        let planned_work_secs = plan.planned_work_secs();
        let record_id = shared.collaborators.store.create_record(&NewSessionRecord {
            mode,
            started_at: started_wall,
            kind: plan.kind().to_string(),
            task_ref,
            planned_work_secs,
        })?;

        let work_secs = plan.phase_secs(Phase::Work);
        let total_cycles = plan.total_cycles();
        inner.run = Some(SessionRun {
            record_id: record_id.clone(),
            started_at: shared.clock.now(),
            started_wall,
            mode,
            plan,
            current_phase: Phase::Work,
            current_cycle: 1,
            total_cycles,
            planned_work_secs,
            phase_remaining: work_secs,
            phase_total: work_secs,
        });
        tracing::info!(
            record = %record_id,
            mode = mode.as_str(),
            planned_work_secs,
            total_cycles,
            "session started"
        );
        shared.transition(&mut inner, EngineState::Running);
        shared.arm(&mut inner);
        shared.emit_phase(&inner);
        Ok(StartOutcome::Started(record_id))
    }

    /// Caller-initiated stop.
    pub fn stop_session(&self) -> StopOutcome {
        let shared = &self.shared;
        let mut inner = shared.lock();
        match inner.state {
            EngineState::Idle => StopOutcome::Ignored,
            EngineState::Completed | EngineState::Failed => {
                shared.reset(&mut inner);
                StopOutcome::Reset
            }
            EngineState::Running => {
                let Some(started_at) = inner.run.as_ref().map(|r| r.started_at) else {
                    shared.reset(&mut inner);
                    return StopOutcome::Reset;
                };
                match shared.guard.classify(started_at, shared.clock.now()) {
                    StopDisposition::Cancel => {
                        shared.cancel(&mut inner);
                        StopOutcome::Cancelled
                    }
                    StopDisposition::Fail => {
                        shared.fail(&mut inner, REASON_SESSION_ABORTED);
                        StopOutcome::Failed
                    }
                }
            }
        }
    }

    /// Finish the running session with a reward. Returns `false` when no
    /// session was running.
    pub fn complete_session(&self) -> bool {
        let mut inner = self.shared.lock();
        self.shared.complete(&mut inner)
    }

    /// Fail the running session with `reason`. Returns `false` when no
    /// session was running.
    pub fn fail_session(&self, reason: &str) -> bool {
        let mut inner = self.shared.lock();
        self.shared.fail(&mut inner, reason)
    }

    /// The host lost foreground. Only hardcore sessions react.
    pub(crate) fn handle_foreground_lost(&self) -> StopOutcome {
        let shared = &self.shared;
        let mut inner = shared.lock();
        let run = inner.run.as_ref().map(|r| (r.mode, r.started_at));
        let action = foreground_lost_action(
            inner.state,
            run,
            &shared.guard,
            shared.clock.now(),
        );
        match action {
            ForegroundAction::Ignore => StopOutcome::Ignored,
            ForegroundAction::Cancel => {
                shared.cancel(&mut inner);
                StopOutcome::Cancelled
            }
            ForegroundAction::Fail => {
                shared.fail(&mut inner, REASON_LEFT_APP);
                StopOutcome::Failed
            }
        }
    }

    #[cfg(test)]
    fn generation(&self) -> u64 {
        self.shared.lock().generation
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn transition(&self, inner: &mut Inner, to: EngineState) {
        let from = inner.state;
        tracing::debug!(from = ?from, to = ?to, "engine state transition");
        inner.state = to;
        self.emit(Event::StateChanged {
            from,
            to,
            at: Utc::now(),
        });
    }

    fn emit_phase(&self, inner: &Inner) {
        let Some(run) = inner.run.as_ref() else {
            return;
        };
        tracing::debug!(
            phase = run.current_phase.as_str(),
            cycle = run.current_cycle,
            total_cycles = run.total_cycles,
            "phase changed"
        );
        self.emit(Event::PhaseChanged {
            phase: run.current_phase,
            cycle: run.current_cycle,
            total_cycles: run.total_cycles,
            duration_secs: run.phase_total,
            at: Utc::now(),
        });
        self.emit(Event::Tick {
            phase: run.current_phase,
            cycle: run.current_cycle,
            remaining_secs: run.phase_remaining,
            at: Utc::now(),
        });
    }

    fn arm(self: &Arc<Self>, inner: &mut Inner) {
        self.disarm(inner);
        let generation = inner.generation;
        let weak: Weak<Shared> = Arc::downgrade(self);
        let on_tick: TickFn = Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_tick(generation);
            }
        });
        inner.ticker = Some(self.clock.schedule(self.settings.tick_interval, on_tick));
    }

    fn disarm(&self, inner: &mut Inner) {
        inner.generation = inner.generation.wrapping_add(1);
        if let Some(ticker) = inner.ticker.take() {
            ticker.cancel();
        }
    }

    fn on_tick(self: &Arc<Self>, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation || inner.state != EngineState::Running {
            tracing::trace!(generation, "stale tick dropped");
            return;
        }
        let Some(run) = inner.run.as_mut() else {
            return;
        };
        run.phase_remaining = run.phase_remaining.saturating_sub(1);
        if run.phase_remaining > 0 {
            let event = Event::Tick {
                phase: run.current_phase,
                cycle: run.current_cycle,
                remaining_secs: run.phase_remaining,
                at: Utc::now(),
            };
            self.emit(event);
            return;
        }

        match sequencer::next_for_plan(&run.plan, run.current_phase, run.current_cycle) {
            PhaseStep::Complete => {
                self.complete(&mut inner);
            }
            PhaseStep::Next { phase, cycle } => {
                let secs = run.plan.phase_secs(phase);
                run.current_phase = phase;
                run.current_cycle = cycle.clamp(1, run.total_cycles);
                run.phase_total = secs;
                run.phase_remaining = secs;
                self.arm(&mut inner);
                self.emit_phase(&inner);
            }
        }
    }

    fn context(&self, run: &SessionRun) -> OutcomeContext {
        OutcomeContext {
            mode: run.mode,
            planned_work_secs: run.planned_work_secs,
            total_cycles: run.total_cycles,
            cycle_reached: run.current_cycle,
            elapsed_secs: self
                .clock
                .now()
                .saturating_duration_since(run.started_at)
                .as_secs(),
        }
    }

    fn complete(&self, inner: &mut Inner) -> bool {
        if inner.state != EngineState::Running {
            tracing::warn!(state = ?inner.state, "complete ignored: no running session");
            return false;
        }
        self.disarm(inner);
        let Some(run) = inner.run.take() else {
            self.reset(inner);
            return false;
        };
        self.transition(inner, EngineState::Completed);

        let credits = self.rewards.credits(run.planned_work_secs, run.mode);
        let outcome = SessionOutcome::completed(credits);
        self.finalize_and_notify(&run, &outcome);
        if let Err(e) = self.collaborators.ledger.credit(credits, "session completed") {
            tracing::warn!(record = %run.record_id, error = %e, "failed to credit reward");
        }
        tracing::info!(
            record = %run.record_id,
            credits,
            mode = run.mode.as_str(),
            "session completed"
        );
        self.emit(Event::SessionCompleted {
            record_id: run.record_id.to_string(),
            mode: run.mode,
            planned_work_secs: run.planned_work_secs,
            credits_earned: credits,
            at: Utc::now(),
        });
        self.transition(inner, EngineState::Idle);
        true
    }

    fn fail(&self, inner: &mut Inner, reason: &str) -> bool {
        if inner.state != EngineState::Running {
            tracing::warn!(state = ?inner.state, reason, "fail ignored: no running session");
            return false;
        }
        self.disarm(inner);
        let Some(run) = inner.run.take() else {
            self.reset(inner);
            return false;
        };
        self.transition(inner, EngineState::Failed);

        let outcome = SessionOutcome::failed(reason);
        self.finalize_and_notify(&run, &outcome);
        let penalty = self.rewards.failure_penalty();
        if let Err(e) = self.collaborators.ledger.debit(penalty, reason) {
            tracing::warn!(record = %run.record_id, error = %e, "failed to apply penalty");
        }
        tracing::info!(record = %run.record_id, reason, penalty, "session failed");
        self.emit(Event::SessionFailed {
            record_id: run.record_id.to_string(),
            reason: reason.to_string(),
            penalty,
            at: Utc::now(),
        });
        self.transition(inner, EngineState::Idle);
        true
    }

    /// Silent cancel: discard the record, no reward, no penalty.
    fn cancel(&self, inner: &mut Inner) {
        self.disarm(inner);
        if let Some(run) = inner.run.take() {
            if let Err(e) = self.collaborators.store.discard(&run.record_id) {
                tracing::warn!(record = %run.record_id, error = %e, "failed to discard record");
            }
            tracing::info!(
                record = %run.record_id,
                grace_secs = self.guard.grace().as_secs(),
                "session cancelled within grace period"
            );
        }
        self.emit(Event::SessionCancelled {
            reason: REASON_CANCELLED.to_string(),
            at: Utc::now(),
        });
        self.transition(inner, EngineState::Idle);
    }

    /// Return to idle without side effects.
    fn reset(&self, inner: &mut Inner) {
        self.disarm(inner);
        inner.run = None;
        if inner.state != EngineState::Idle {
            self.transition(inner, EngineState::Idle);
        }
    }

    fn finalize_and_notify(&self, run: &SessionRun, outcome: &SessionOutcome) {
        match self.collaborators.store.finalize(&run.record_id, outcome) {
            Ok(record) => {
                let context = self.context(run);
                self.collaborators
                    .notifier
                    .on_session_outcome(&record, &context);
            }
            Err(e) => {
                tracing::error!(
                    record = %run.record_id,
                    started_at = %run.started_wall,
                    error = %e,
                    "failed to finalize session record"
                );
            }
        }
    }
}
