//! # Focusroom Core Library
//!
//! Core business logic for the Focusroom focus timer. The CLI is a thin
//! layer over this crate.
//!
//! ## Architecture
//!
//! - **Session Engine**: A mutex-guarded state machine driven by an
//!   injected [`Clock`]. Turns a work/break template and a discipline mode
//!   into a ticking session, sequences phases, applies the grace window and
//!   reacts to the host losing foreground.
//! - **Collaborators**: [`SessionStore`], [`RewardLedger`] and
//!   [`AchievementNotifier`] receive outcomes; the engine owns no
//!   persistence itself.
//! - **Storage**: SQLite-backed store/ledger and TOML-based configuration.
//!
//! ## Key Components
//!
//! - [`SessionEngine`]: Session state machine
//! - [`LifecycleMonitor`]: Foreground-loss handling
//! - [`SqliteStore`]: Session records and point balance
//! - [`Config`]: Application configuration management

pub mod error;
pub mod events;
pub mod session;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::Event;
pub use session::{
    AchievementNotifier, NewSessionRecord, OutcomeContext, RecordId, RewardLedger,
    SessionOutcome, SessionRecord, SessionStatus, SessionStore, TracingNotifier,
};
pub use storage::{Config, Database, SqliteStore, Stats};
pub use timer::{
    Clock, Collaborators, DisciplineMode, EngineSettings, EngineState, LifecycleMonitor,
    LifecycleSignal, ManualClock, Phase, SessionEngine, SessionPlan, SessionTemplate,
    StartOutcome, StopOutcome, TokioClock,
};
