//! Integration tests for the focus session engine.
//!
//! Sessions are driven with `ManualClock` so every tick and every second of
//! elapsed time is explicit. Collaborators are in-memory fakes that count
//! what the engine asked of them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use focusroom_core::timer::{lifecycle_channel, REASON_LEFT_APP, REASON_SESSION_ABORTED};
use focusroom_core::{
    AchievementNotifier, Collaborators, CoreError, DisciplineMode, EngineSettings, EngineState,
    Event, LifecycleMonitor, LifecycleSignal, ManualClock, NewSessionRecord, OutcomeContext,
    Phase, RecordId, RewardLedger, SessionEngine, SessionOutcome, SessionPlan, SessionRecord,
    SessionStatus, SessionStore, SessionTemplate, StartOutcome, StopOutcome,
};
use tokio::sync::broadcast;

const GRACE: Duration = Duration::from_secs(9);
const EPSILON: Duration = Duration::from_millis(1);

#[derive(Default)]
struct MemoryStore {
    records: Mutex<HashMap<RecordId, SessionRecord>>,
    created: Mutex<u32>,
    discarded: Mutex<u32>,
}

impl MemoryStore {
    fn records(&self) -> Vec<SessionRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    fn created(&self) -> u32 {
        *self.created.lock().unwrap()
    }
}

impl SessionStore for MemoryStore {
    fn create_record(&self, new: &NewSessionRecord) -> Result<RecordId, CoreError> {
        let id = RecordId::generate();
        self.records
            .lock()
            .unwrap()
            .insert(id.clone(), SessionRecord::open(id.clone(), new));
        *self.created.lock().unwrap() += 1;
        Ok(id)
    }

    fn finalize(&self, id: &RecordId, outcome: &SessionOutcome) -> Result<SessionRecord, CoreError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(id)
            .ok_or_else(|| CoreError::Custom(format!("missing record {id}")))?;
        record.apply(outcome, Utc::now());
        Ok(record.clone())
    }

    fn discard(&self, id: &RecordId) -> Result<(), CoreError> {
        self.records.lock().unwrap().remove(id);
        *self.discarded.lock().unwrap() += 1;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryLedger {
    balance: Mutex<u64>,
    credits: Mutex<Vec<u64>>,
    debits: Mutex<Vec<(u64, String)>>,
}

impl MemoryLedger {
    fn with_balance(balance: u64) -> Self {
        Self {
            balance: Mutex::new(balance),
            ..Self::default()
        }
    }

    fn credits(&self) -> Vec<u64> {
        self.credits.lock().unwrap().clone()
    }

    fn debits(&self) -> Vec<(u64, String)> {
        self.debits.lock().unwrap().clone()
    }
}

impl RewardLedger for MemoryLedger {
    fn credit(&self, amount: u64, _reason: &str) -> Result<u64, CoreError> {
        self.credits.lock().unwrap().push(amount);
        let mut balance = self.balance.lock().unwrap();
        *balance += amount;
        Ok(*balance)
    }

    fn debit(&self, amount: u64, reason: &str) -> Result<u64, CoreError> {
        self.debits.lock().unwrap().push((amount, reason.to_string()));
        let mut balance = self.balance.lock().unwrap();
        *balance = balance.saturating_sub(amount);
        Ok(*balance)
    }

    fn balance(&self) -> Result<u64, CoreError> {
        Ok(*self.balance.lock().unwrap())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    outcomes: Mutex<Vec<(SessionStatus, u32)>>,
}

impl AchievementNotifier for RecordingNotifier {
    fn on_session_outcome(&self, record: &SessionRecord, context: &OutcomeContext) {
        self.outcomes
            .lock()
            .unwrap()
            .push((record.status, context.cycle_reached));
    }
}

struct Harness {
    engine: SessionEngine,
    clock: ManualClock,
    store: Arc<MemoryStore>,
    ledger: Arc<MemoryLedger>,
    notifier: Arc<RecordingNotifier>,
    events: broadcast::Receiver<Event>,
}

impl Harness {
    fn new() -> Self {
        Self::with_ledger(MemoryLedger::default())
    }

    fn with_ledger(ledger: MemoryLedger) -> Self {
        let clock = ManualClock::new();
        let store = Arc::new(MemoryStore::default());
        let ledger = Arc::new(ledger);
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = SessionEngine::new(
            Arc::new(clock.clone()),
            Collaborators {
                store: store.clone(),
                ledger: ledger.clone(),
                notifier: notifier.clone(),
            },
            EngineSettings {
                grace_period: GRACE,
                ..EngineSettings::default()
            },
        );
        let events = engine.subscribe();
        Self {
            engine,
            clock,
            store,
            ledger,
            notifier,
            events,
        }
    }

    fn start(&self, plan: SessionPlan, mode: DisciplineMode) -> StartOutcome {
        self.engine.start_session(plan, mode, None).unwrap()
    }

    fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

fn template(work: u64, short: u64, long: u64, cycles: u32) -> SessionPlan {
    SessionPlan::templated(SessionTemplate::new("test", work, short, long, cycles))
}

fn phase_changes(events: &[Event]) -> Vec<(Phase, u32)> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::PhaseChanged { phase, cycle, .. } => Some((*phase, *cycle)),
            _ => None,
        })
        .collect()
}

fn count<F: Fn(&Event) -> bool>(events: &[Event], f: F) -> usize {
    events.iter().filter(|e| f(e)).count()
}

fn failure_reasons(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::SessionFailed { reason, .. } => Some(reason.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn second_start_while_running_is_ignored() {
    let mut h = Harness::new();
    assert!(matches!(
        h.start(template(2, 1, 3, 2), DisciplineMode::Casual),
        StartOutcome::Started(_)
    ));
    h.drain();

    let second = h.start(template(5, 5, 5, 3), DisciplineMode::Hardcore);
    assert_eq!(second, StartOutcome::Ignored);
    assert_eq!(h.engine.state(), EngineState::Running);
    assert_eq!(h.store.created(), 1);
    assert!(h.drain().is_empty());

    // The first session's plan is still the one ticking.
    h.clock.tick_n(2);
    assert_eq!(phase_changes(&h.drain()), vec![(Phase::ShortBreak, 1)]);
}

#[test]
fn stop_within_grace_cancels_silently() {
    let mut h = Harness::with_ledger(MemoryLedger::with_balance(40));
    h.start(template(60, 5, 5, 2), DisciplineMode::Casual);
    h.clock.advance(GRACE - EPSILON);

    assert_eq!(h.engine.stop_session(), StopOutcome::Cancelled);
    assert_eq!(h.engine.state(), EngineState::Idle);
    assert!(h.store.records().is_empty());
    assert_eq!(h.ledger.balance().unwrap(), 40);
    assert!(h.ledger.credits().is_empty());
    assert!(h.ledger.debits().is_empty());
    assert!(h.notifier.outcomes.lock().unwrap().is_empty());

    let events = h.drain();
    assert!(failure_reasons(&events).is_empty());
    assert_eq!(count(&events, |e| matches!(e, Event::SessionCancelled { .. })), 1);
}

#[test]
fn stop_past_grace_fails_with_penalty() {
    let mut h = Harness::with_ledger(MemoryLedger::with_balance(40));
    h.start(template(60, 5, 5, 2), DisciplineMode::Casual);
    h.clock.advance(GRACE + EPSILON);

    assert_eq!(h.engine.stop_session(), StopOutcome::Failed);
    assert_eq!(h.engine.state(), EngineState::Idle);
    assert_eq!(h.ledger.balance().unwrap(), 25);
    assert_eq!(h.ledger.debits(), vec![(15, REASON_SESSION_ABORTED.to_string())]);

    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, SessionStatus::Failed);
    assert_eq!(records[0].credits, 0);
    assert_eq!(records[0].failure_reason.as_deref(), Some(REASON_SESSION_ABORTED));

    let events = h.drain();
    assert_eq!(failure_reasons(&events), vec![REASON_SESSION_ABORTED.to_string()]);
}

#[test]
fn penalty_is_clamped_by_ledger() {
    let h = Harness::with_ledger(MemoryLedger::with_balance(10));
    h.start(template(60, 5, 5, 2), DisciplineMode::Hardcore);
    h.clock.advance(GRACE + EPSILON);
    h.engine.stop_session();
    assert_eq!(h.ledger.balance().unwrap(), 0);
    // The engine requests the full penalty; clamping is the ledger's job.
    assert_eq!(h.ledger.debits()[0].0, 15);
}

#[test]
fn phases_run_in_template_order() {
    let mut h = Harness::new();
    h.start(template(2, 1, 3, 2), DisciplineMode::Casual);

    // work 2 + short 1 + work 2 + long 3
    h.clock.tick_n(8);
    let events = h.drain();
    assert_eq!(
        phase_changes(&events),
        vec![
            (Phase::Work, 1),
            (Phase::ShortBreak, 1),
            (Phase::Work, 2),
            (Phase::LongBreak, 2),
        ]
    );
    assert_eq!(count(&events, |e| matches!(e, Event::SessionCompleted { .. })), 1);
    assert_eq!(h.engine.state(), EngineState::Idle);

    h.clock.tick_n(5);
    assert!(h.drain().is_empty());
    assert_eq!(h.ledger.credits().len(), 1);
    assert_eq!(h.notifier.outcomes.lock().unwrap().clone(), vec![(SessionStatus::Completed, 2)]);
}

#[test]
fn zero_length_short_break_is_skipped() {
    let mut h = Harness::new();
    h.start(template(2, 0, 3, 2), DisciplineMode::Casual);
    h.clock.tick_n(7);
    let events = h.drain();
    assert_eq!(
        phase_changes(&events),
        vec![(Phase::Work, 1), (Phase::Work, 2), (Phase::LongBreak, 2)]
    );
    assert_eq!(count(&events, |e| matches!(e, Event::SessionCompleted { .. })), 1);
}

#[test]
fn single_cycle_without_long_break_completes_after_work() {
    let mut h = Harness::new();
    h.start(template(3, 5, 0, 1), DisciplineMode::Casual);
    h.clock.tick_n(2);
    assert_eq!(h.engine.state(), EngineState::Running);
    h.clock.tick();
    let events = h.drain();
    assert_eq!(phase_changes(&events), vec![(Phase::Work, 1)]);
    assert_eq!(count(&events, |e| matches!(e, Event::SessionCompleted { .. })), 1);
}

#[test]
fn free_running_session_has_one_phase() {
    let mut h = Harness::new();
    h.start(SessionPlan::free_running(3), DisciplineMode::Casual);
    h.clock.tick_n(3);
    let events = h.drain();
    assert_eq!(phase_changes(&events), vec![(Phase::Work, 1)]);
    let credits: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            Event::SessionCompleted { credits_earned, .. } => Some(*credits_earned),
            _ => None,
        })
        .collect();
    assert_eq!(credits, vec![1]);
}

#[test]
fn reward_scales_with_planned_work_and_mode() {
    for (mode, expected) in [(DisciplineMode::Casual, 50), (DisciplineMode::Hardcore, 100)] {
        let mut h = Harness::new();
        h.start(template(25 * 60, 5 * 60, 15 * 60, 2), mode);
        assert!(h.engine.complete_session());
        assert_eq!(h.ledger.credits(), vec![expected]);
        let events = h.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::SessionCompleted { credits_earned, planned_work_secs: 3000, .. } if *credits_earned == expected
        )));
    }
}

#[test]
fn hardcore_backgrounding_cancels_then_fails() {
    let mut h = Harness::new();
    let monitor = LifecycleMonitor::new(h.engine.clone());

    h.start(template(60, 5, 5, 2), DisciplineMode::Hardcore);
    h.clock.advance(GRACE - EPSILON);
    assert_eq!(monitor.on_foreground_lost(), StopOutcome::Cancelled);
    assert!(h.store.records().is_empty());
    assert!(failure_reasons(&h.drain()).is_empty());

    h.start(template(60, 5, 5, 2), DisciplineMode::Hardcore);
    h.clock.advance(GRACE + EPSILON);
    assert_eq!(monitor.on_foreground_lost(), StopOutcome::Failed);
    assert_eq!(failure_reasons(&h.drain()), vec![REASON_LEFT_APP.to_string()]);
    assert_eq!(h.ledger.debits().len(), 1);
}

#[test]
fn casual_backgrounding_is_inert() {
    let mut h = Harness::new();
    let monitor = LifecycleMonitor::new(h.engine.clone());
    h.start(template(60, 5, 5, 2), DisciplineMode::Casual);
    h.drain();

    for elapsed in [Duration::from_secs(1), Duration::from_secs(30), Duration::from_secs(600)] {
        h.clock.advance(elapsed);
        assert_eq!(monitor.on_foreground_lost(), StopOutcome::Ignored);
    }
    assert_eq!(h.engine.state(), EngineState::Running);
    assert!(h.drain().is_empty());
}

#[test]
fn cancellation_entry_points_are_idempotent_when_idle() {
    let mut h = Harness::new();
    let monitor = LifecycleMonitor::new(h.engine.clone());
    assert_eq!(h.engine.stop_session(), StopOutcome::Ignored);
    assert_eq!(monitor.on_foreground_lost(), StopOutcome::Ignored);

    h.start(SessionPlan::free_running(1), DisciplineMode::Hardcore);
    h.clock.tick();
    assert_eq!(h.engine.stop_session(), StopOutcome::Ignored);
    assert_eq!(monitor.on_foreground_lost(), StopOutcome::Ignored);
    assert_eq!(h.ledger.credits().len(), 1);
    assert!(h.ledger.debits().is_empty());
    assert_eq!(
        count(&h.drain(), |e| matches!(e, Event::SessionCompleted { .. })),
        1
    );
}

#[test]
fn completion_events_are_ordered() {
    let mut h = Harness::new();
    h.start(SessionPlan::free_running(1), DisciplineMode::Casual);
    h.clock.tick();
    let events = h.drain();
    let tail: Vec<&Event> = events.iter().rev().take(3).collect();
    assert!(matches!(
        tail[2],
        Event::StateChanged { from: EngineState::Running, to: EngineState::Completed, .. }
    ));
    assert!(matches!(tail[1], Event::SessionCompleted { .. }));
    assert!(matches!(
        tail[0],
        Event::StateChanged { from: EngineState::Completed, to: EngineState::Idle, .. }
    ));
    assert_eq!(h.clock.live_schedules(), 0);
}

#[test]
fn start_emits_state_phase_and_tick() {
    let mut h = Harness::new();
    h.start(template(4, 1, 1, 2), DisciplineMode::Casual);
    let events = h.drain();
    assert!(matches!(
        events[0],
        Event::StateChanged { from: EngineState::Idle, to: EngineState::Running, .. }
    ));
    assert!(matches!(
        events[1],
        Event::PhaseChanged { phase: Phase::Work, cycle: 1, total_cycles: 2, duration_secs: 4, .. }
    ));
    assert!(matches!(events[2], Event::Tick { remaining_secs: 4, .. }));

    h.clock.tick();
    let events = h.drain();
    assert!(matches!(events.as_slice(), [Event::Tick { remaining_secs: 3, .. }]));
}

#[test]
fn engine_restarts_after_outcome() {
    let h = Harness::new();
    h.start(SessionPlan::free_running(1), DisciplineMode::Casual);
    h.clock.tick();
    assert!(matches!(
        h.start(SessionPlan::free_running(1), DisciplineMode::Casual),
        StartOutcome::Started(_)
    ));
    assert_eq!(h.store.created(), 2);
}

#[tokio::test]
async fn lifecycle_monitor_drains_channel() {
    let h = Harness::new();
    h.start(template(60, 5, 5, 2), DisciplineMode::Hardcore);
    h.clock.advance(GRACE + EPSILON);

    let (tx, source) = lifecycle_channel(4);
    let monitor = LifecycleMonitor::new(h.engine.clone());
    let task = tokio::spawn(monitor.run(source));
    tx.send(LifecycleSignal::ForegroundLost).await.unwrap();
    tx.send(LifecycleSignal::ForegroundLost).await.unwrap();
    drop(tx);
    task.await.unwrap();

    assert_eq!(h.engine.state(), EngineState::Idle);
    assert_eq!(h.ledger.debits().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_cancellations_finalize_once() {
    for _ in 0..20 {
        let clock = focusroom_core::TokioClock::current();
        let store = Arc::new(MemoryStore::default());
        let ledger = Arc::new(MemoryLedger::default());
        let engine = SessionEngine::new(
            Arc::new(clock),
            Collaborators {
                store: store.clone(),
                ledger: ledger.clone(),
                notifier: Arc::new(RecordingNotifier::default()),
            },
            EngineSettings {
                grace_period: Duration::ZERO,
                tick_interval: Duration::from_millis(1),
                ..EngineSettings::default()
            },
        );
        engine
            .start_session(SessionPlan::free_running(3), DisciplineMode::Hardcore, None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                if i % 2 == 0 {
                    engine.stop_session()
                } else {
                    LifecycleMonitor::new(engine).on_foreground_lost()
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(engine.state(), EngineState::Idle);
        let outcomes = ledger.credits().len() + ledger.debits().len();
        let discards = *store.discarded.lock().unwrap() as usize;
        assert_eq!(outcomes + discards, 1, "session finalized more than once");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tokio_clock_drives_session_to_completion() {
    let store = Arc::new(MemoryStore::default());
    let ledger = Arc::new(MemoryLedger::default());
    let engine = SessionEngine::new(
        Arc::new(focusroom_core::TokioClock::current()),
        Collaborators {
            store: store.clone(),
            ledger: ledger.clone(),
            notifier: Arc::new(RecordingNotifier::default()),
        },
        EngineSettings {
            tick_interval: Duration::from_millis(2),
            ..EngineSettings::default()
        },
    );
    let mut events = engine.subscribe();
    engine
        .start_session(template(3, 1, 2, 2), DisciplineMode::Casual, None)
        .unwrap();

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(Event::SessionCompleted { credits_earned, .. }) => return credits_earned,
                Ok(_) => continue,
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
    })
    .await
    .expect("session did not complete");

    assert_eq!(completed, 1);
    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(ledger.credits(), vec![1]);
    assert_eq!(store.records()[0].status, SessionStatus::Completed);
}
