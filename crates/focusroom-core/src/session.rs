//! Session records and the collaborators the engine reports to.
//!
//! The engine owns no persistence. It creates, finalizes or discards a
//! record through [`SessionStore`], moves credits through [`RewardLedger`]
//! and tells [`AchievementNotifier`] about every counted outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::timer::DisciplineMode;

/// Opaque handle to a stored session record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn generate() -> Self {
        RecordId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(CoreError::Custom(format!("unknown session status: {other}"))),
        }
    }
}

/// What the store needs to open a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSessionRecord {
    pub mode: DisciplineMode,
    pub started_at: DateTime<Utc>,
    pub kind: String,
    pub task_ref: Option<String>,
    pub planned_work_secs: u64,
}

/// How a counted session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub completed: bool,
    /// Zero unless `completed`.
    pub credits_earned: u64,
    pub failure_reason: Option<String>,
}

impl SessionOutcome {
    pub fn completed(credits_earned: u64) -> Self {
        Self {
            completed: true,
            credits_earned,
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            completed: false,
            credits_earned: 0,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn status(&self) -> SessionStatus {
        if self.completed {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: RecordId,
    pub mode: DisciplineMode,
    pub kind: String,
    pub task_ref: Option<String>,
    pub planned_work_secs: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub credits: u64,
    pub failure_reason: Option<String>,
}

impl SessionRecord {
    pub fn open(id: RecordId, new: &NewSessionRecord) -> Self {
        Self {
            id,
            mode: new.mode,
            kind: new.kind.clone(),
            task_ref: new.task_ref.clone(),
            planned_work_secs: new.planned_work_secs,
            started_at: new.started_at,
            ended_at: None,
            status: SessionStatus::Running,
            credits: 0,
            failure_reason: None,
        }
    }

    pub fn apply(&mut self, outcome: &SessionOutcome, ended_at: DateTime<Utc>) {
        self.status = outcome.status();
        self.credits = outcome.credits_earned;
        self.failure_reason = outcome.failure_reason.clone();
        self.ended_at = Some(ended_at);
    }
}

/// Extra facts handed to the achievement notifier alongside the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeContext {
    pub mode: DisciplineMode,
    pub planned_work_secs: u64,
    pub total_cycles: u32,
    /// Cycle the session was in when it ended.
    pub cycle_reached: u32,
    pub elapsed_secs: u64,
}

/// Persistent record store for sessions.
pub trait SessionStore: Send + Sync {
    fn create_record(&self, new: &NewSessionRecord) -> Result<RecordId>;

    /// Close a record and return its final state.
    fn finalize(&self, id: &RecordId, outcome: &SessionOutcome) -> Result<SessionRecord>;

    /// Remove a record as if the session never happened.
    fn discard(&self, id: &RecordId) -> Result<()>;
}

/// Point ledger. Implementations clamp the balance at zero on debit.
pub trait RewardLedger: Send + Sync {
    /// Returns the new balance.
    fn credit(&self, amount: u64, reason: &str) -> Result<u64>;

    /// Returns the new balance, never below zero.
    fn debit(&self, amount: u64, reason: &str) -> Result<u64>;

    fn balance(&self) -> Result<u64>;
}

/// Fire-and-forget hook called after every finalized outcome.
pub trait AchievementNotifier: Send + Sync {
    fn on_session_outcome(&self, record: &SessionRecord, context: &OutcomeContext);
}

/// Default notifier: reports outcomes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl AchievementNotifier for TracingNotifier {
    fn on_session_outcome(&self, record: &SessionRecord, context: &OutcomeContext) {
        tracing::info!(
            record = %record.id,
            status = record.status.as_str(),
            credits = record.credits,
            mode = context.mode.as_str(),
            cycle = context.cycle_reached,
            total_cycles = context.total_cycles,
            "session outcome"
        );
    }
}
