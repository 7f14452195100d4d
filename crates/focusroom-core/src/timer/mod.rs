mod clock;
mod engine;
mod grace;
mod lifecycle;
mod reward;
pub mod sequencer;
mod template;

pub use clock::{CancelHandle, Clock, ManualClock, TickFn, TokioClock};
pub use engine::{
    Collaborators, EngineSettings, EngineState, SessionEngine, StartOutcome, StopOutcome,
    REASON_CANCELLED, REASON_LEFT_APP, REASON_SESSION_ABORTED,
};
pub use grace::{is_within_grace, GracePeriodGuard, StopDisposition, DEFAULT_GRACE_PERIOD};
pub use lifecycle::{lifecycle_channel, LifecycleMonitor, LifecycleSignal, LifecycleSource};
pub use reward::{RewardCalculator, DEFAULT_CREDIT_UNIT_SECS, FAILURE_PENALTY};
pub use sequencer::PhaseStep;
pub use template::{DisciplineMode, Phase, SessionPlan, SessionTemplate};
