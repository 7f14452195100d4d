use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{DisciplineMode, EngineState, Phase};

/// Every engine transition produces an Event.
/// Observers subscribe per engine; events arrive in transition order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    Tick {
        phase: Phase,
        cycle: u32,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    PhaseChanged {
        phase: Phase,
        cycle: u32,
        total_cycles: u32,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    StateChanged {
        from: EngineState,
        to: EngineState,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        record_id: String,
        mode: DisciplineMode,
        planned_work_secs: u64,
        credits_earned: u64,
        at: DateTime<Utc>,
    },
    SessionFailed {
        record_id: String,
        reason: String,
        penalty: u64,
        at: DateTime<Utc>,
    },
    /// Stopped inside the grace window. Not a failure; callers should not
    /// show an error for it.
    SessionCancelled {
        reason: String,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        state: EngineState,
        mode: Option<DisciplineMode>,
        phase: Option<Phase>,
        cycle: u32,
        total_cycles: u32,
        remaining_secs: u64,
        total_secs: u64,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Terminal events end a session run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::SessionCompleted { .. } | Event::SessionFailed { .. } | Event::SessionCancelled { .. }
        )
    }
}
