//! Tick sources for the session engine.
//!
//! A [`Clock`] hands out periodic ticks and a monotonic `now()`. The engine
//! never sleeps itself; it only reacts to ticks delivered through the
//! callback registered with [`Clock::schedule`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Callback invoked on every tick.
pub type TickFn = Arc<dyn Fn() + Send + Sync>;

/// Stops a scheduled tick source. Cancelling twice is harmless.
pub trait CancelHandle: Send {
    fn cancel(&self);
}

pub trait Clock: Send + Sync {
    /// Monotonic time, used for grace-window decisions.
    fn now(&self) -> Instant;

    /// Invoke `on_tick` every `period` until the returned handle is cancelled.
    fn schedule(&self, period: Duration, on_tick: TickFn) -> Box<dyn CancelHandle>;
}

// ── Tokio ────────────────────────────────────────────────────────────

/// Real-time clock backed by a tokio interval task per schedule.
#[derive(Debug, Clone)]
pub struct TokioClock {
    handle: tokio::runtime::Handle,
}

impl TokioClock {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime of the calling context.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

struct TaskCancel(tokio::task::JoinHandle<()>);

impl CancelHandle for TaskCancel {
    fn cancel(&self) {
        self.0.abort();
    }
}

impl Drop for TaskCancel {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(&self, period: Duration, on_tick: TickFn) -> Box<dyn CancelHandle> {
        let period = period.max(Duration::from_millis(1));
        let task = self.handle.spawn(async move {
            // First tick one full period after arming, not immediately.
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                on_tick();
            }
        });
        Box::new(TaskCancel(task))
    }
}

// ── Manual ───────────────────────────────────────────────────────────

struct ManualTimer {
    on_tick: TickFn,
    live: Arc<AtomicBool>,
}

struct ManualState {
    now: Instant,
    timers: Vec<ManualTimer>,
}

/// Deterministic clock for tests and simulations.
///
/// Time only moves on [`ManualClock::advance`]; ticks only fire on
/// [`ManualClock::tick`]. Callbacks run without the clock's lock held, so a
/// callback may cancel its own schedule and arm a new one.
#[derive(Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

struct ManualCancel(Arc<AtomicBool>);

impl CancelHandle for ManualCancel {
    fn cancel(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: Instant::now(),
                timers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move `now()` forward without firing ticks.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.now += by;
    }

    /// Fire every live schedule once. Returns how many callbacks ran.
    pub fn tick(&self) -> usize {
        let due: Vec<(TickFn, Arc<AtomicBool>)> = {
            let mut state = self.lock();
            state.timers.retain(|t| t.live.load(Ordering::SeqCst));
            state
                .timers
                .iter()
                .map(|t| (Arc::clone(&t.on_tick), Arc::clone(&t.live)))
                .collect()
        };
        let mut fired = 0;
        for (on_tick, live) in due {
            if live.load(Ordering::SeqCst) {
                on_tick();
                fired += 1;
            }
        }
        fired
    }

    /// Fire `n` rounds of ticks.
    pub fn tick_n(&self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Number of schedules that have not been cancelled.
    pub fn live_schedules(&self) -> usize {
        self.lock()
            .timers
            .iter()
            .filter(|t| t.live.load(Ordering::SeqCst))
            .count()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.lock().now
    }

    fn schedule(&self, _period: Duration, on_tick: TickFn) -> Box<dyn CancelHandle> {
        let live = Arc::new(AtomicBool::new(true));
        self.lock().timers.push(ManualTimer {
            on_tick,
            live: Arc::clone(&live),
        });
        Box::new(ManualCancel(live))
    }
}
