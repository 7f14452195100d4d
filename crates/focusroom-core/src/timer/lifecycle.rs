//! Host lifecycle handling.
//!
//! The host reports one abstract signal, "foreground lost". Casual
//! sessions ignore it. Hardcore sessions are cancelled inside the grace
//! window and failed after it.

use std::time::Instant;

use tokio::sync::mpsc;

use super::engine::{EngineState, SessionEngine, StopOutcome};
use super::grace::{GracePeriodGuard, StopDisposition};
use super::template::DisciplineMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    ForegroundLost,
}

/// Channel the host feeds lifecycle signals into.
pub type LifecycleSource = mpsc::Receiver<LifecycleSignal>;

/// Create a bounded lifecycle channel.
pub fn lifecycle_channel(capacity: usize) -> (mpsc::Sender<LifecycleSignal>, LifecycleSource) {
    mpsc::channel(capacity.max(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ForegroundAction {
    Ignore,
    Cancel,
    Fail,
}

/// Decide what losing foreground means for the current session.
/// `run` is `(mode, started_at)` of the running session, if any.
pub(crate) fn foreground_lost_action(
    state: EngineState,
    run: Option<(DisciplineMode, Instant)>,
    guard: &GracePeriodGuard,
    now: Instant,
) -> ForegroundAction {
    let Some((mode, started_at)) = run else {
        return ForegroundAction::Ignore;
    };
    if state != EngineState::Running || mode != DisciplineMode::Hardcore {
        return ForegroundAction::Ignore;
    }
    match guard.classify(started_at, now) {
        StopDisposition::Cancel => ForegroundAction::Cancel,
        StopDisposition::Fail => ForegroundAction::Fail,
    }
}

/// Forwards lifecycle signals to an engine.
#[derive(Clone)]
pub struct LifecycleMonitor {
    engine: SessionEngine,
}

impl LifecycleMonitor {
    pub fn new(engine: SessionEngine) -> Self {
        Self { engine }
    }

    pub fn on_foreground_lost(&self) -> StopOutcome {
        let outcome = self.engine.handle_foreground_lost();
        if outcome != StopOutcome::Ignored {
            tracing::info!(?outcome, "foreground lost during hardcore session");
        }
        outcome
    }

    pub fn handle(&self, signal: LifecycleSignal) -> StopOutcome {
        match signal {
            LifecycleSignal::ForegroundLost => self.on_foreground_lost(),
        }
    }

    /// Drain `source` until every sender is dropped.
    pub async fn run(self, mut source: LifecycleSource) {
        while let Some(signal) = source.recv().await {
            self.handle(signal);
        }
        tracing::debug!("lifecycle source closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn casual_sessions_ignore_backgrounding() {
        let guard = GracePeriodGuard::default();
        let start = Instant::now();
        let action = foreground_lost_action(
            EngineState::Running,
            Some((DisciplineMode::Casual, start)),
            &guard,
            start + Duration::from_secs(600),
        );
        assert_eq!(action, ForegroundAction::Ignore);
    }

    #[test]
    fn hardcore_sessions_cancel_then_fail() {
        let guard = GracePeriodGuard::new(Duration::from_secs(9));
        let start = Instant::now();
        let run = Some((DisciplineMode::Hardcore, start));
        assert_eq!(
            foreground_lost_action(EngineState::Running, run, &guard, start + Duration::from_secs(3)),
            ForegroundAction::Cancel
        );
        assert_eq!(
            foreground_lost_action(EngineState::Running, run, &guard, start + Duration::from_secs(12)),
            ForegroundAction::Fail
        );
    }

    #[test]
    fn idle_engine_ignores_signal() {
        let guard = GracePeriodGuard::default();
        let now = Instant::now();
        assert_eq!(
            foreground_lost_action(EngineState::Idle, None, &guard, now),
            ForegroundAction::Ignore
        );
    }
}
