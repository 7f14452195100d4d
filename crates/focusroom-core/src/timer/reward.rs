//! Credit sizing for finished sessions.

use super::template::DisciplineMode;

/// Planned work seconds that earn one credit.
pub const DEFAULT_CREDIT_UNIT_SECS: u64 = 60;

/// Debited on every failed session, regardless of length or mode.
pub const FAILURE_PENALTY: u64 = 15;

/// Maps planned work to credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardCalculator {
    unit_secs: u64,
    failure_penalty: u64,
}

impl RewardCalculator {
    pub fn new(unit_secs: u64, failure_penalty: u64) -> Self {
        Self {
            unit_secs: unit_secs.max(1),
            failure_penalty,
        }
    }

    /// One credit per planned unit, at least one. Hardcore doubles it.
    pub fn credits(&self, planned_work_secs: u64, mode: DisciplineMode) -> u64 {
        let base = (planned_work_secs / self.unit_secs).max(1);
        match mode {
            DisciplineMode::Casual => base,
            DisciplineMode::Hardcore => base.saturating_mul(2),
        }
    }

    /// The ledger clamps the balance; this is the requested amount.
    pub fn failure_penalty(&self) -> u64 {
        self.failure_penalty
    }
}

impl Default for RewardCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_CREDIT_UNIT_SECS, FAILURE_PENALTY)
    }
}
