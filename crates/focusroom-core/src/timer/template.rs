use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Work,
    ShortBreak,
    LongBreak,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Work => "work",
            Phase::ShortBreak => "shortBreak",
            Phase::LongBreak => "longBreak",
        }
    }
}

/// How the engine reacts to the host losing foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisciplineMode {
    /// Background-tolerant.
    #[default]
    Casual,
    /// Leaving the app past the grace window fails the session. Doubles rewards.
    Hardcore,
}

impl DisciplineMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DisciplineMode::Casual => "casual",
            DisciplineMode::Hardcore => "hardcore",
        }
    }
}

impl std::str::FromStr for DisciplineMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "casual" => Ok(DisciplineMode::Casual),
            "hardcore" => Ok(DisciplineMode::Hardcore),
            other => Err(ValidationError::invalid(
                "mode",
                format!("expected 'casual' or 'hardcore', got '{other}'"),
            )),
        }
    }
}

/// A work/break template. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTemplate {
    #[serde(default)]
    pub name: String,
    pub work_secs: u64,
    #[serde(default)]
    pub short_break_secs: u64,
    #[serde(default)]
    pub long_break_secs: u64,
    pub cycles_before_long_break: u32,
}

impl SessionTemplate {
    pub fn new(
        name: impl Into<String>,
        work_secs: u64,
        short_break_secs: u64,
        long_break_secs: u64,
        cycles_before_long_break: u32,
    ) -> Self {
        Self {
            name: name.into(),
            work_secs,
            short_break_secs,
            long_break_secs,
            cycles_before_long_break,
        }
    }

    /// The 25/5/15 x4 classic.
    pub fn classic() -> Self {
        Self::new("classic", 25 * 60, 5 * 60, 15 * 60, 4)
    }

    /// Rejects templates that could never make progress.
    ///
    /// # Errors
    /// Returns an error if the work phase is empty or there are no cycles.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.work_secs == 0 {
            return Err(ValidationError::invalid(
                "work_secs",
                "work phase must be longer than zero",
            ));
        }
        if self.cycles_before_long_break == 0 {
            return Err(ValidationError::invalid(
                "cycles_before_long_break",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Duration of a phase in seconds.
    pub fn phase_secs(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Work => self.work_secs,
            Phase::ShortBreak => self.short_break_secs,
            Phase::LongBreak => self.long_break_secs,
        }
    }

    /// Sum of all planned work phases.
    pub fn planned_work_secs(&self) -> u64 {
        self.work_secs
            .saturating_mul(u64::from(self.cycles_before_long_break))
    }
}

impl Default for SessionTemplate {
    fn default() -> Self {
        Self::classic()
    }
}

/// What a caller asks the engine to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SessionPlan {
    /// Structured work/break cycles.
    Templated {
        template: SessionTemplate,
        total_cycles: u32,
    },
    /// A single bare work phase.
    FreeRunning { duration_secs: u64 },
}

impl SessionPlan {
    /// A templated plan running the template's own cycle count.
    pub fn templated(template: SessionTemplate) -> Self {
        let total_cycles = template.cycles_before_long_break;
        SessionPlan::Templated {
            template,
            total_cycles,
        }
    }

    pub fn free_running(duration_secs: u64) -> Self {
        SessionPlan::FreeRunning { duration_secs }
    }

    /// # Errors
    /// Returns an error if the plan has no runnable work phase.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            SessionPlan::Templated {
                template,
                total_cycles,
            } => {
                template.validate()?;
                if *total_cycles == 0 {
                    return Err(ValidationError::invalid(
                        "total_cycles",
                        "must be at least 1",
                    ));
                }
                Ok(())
            }
            SessionPlan::FreeRunning { duration_secs } => {
                if *duration_secs == 0 {
                    return Err(ValidationError::invalid(
                        "duration_secs",
                        "free-running session must be longer than zero",
                    ));
                }
                Ok(())
            }
        }
    }

    pub fn total_cycles(&self) -> u32 {
        match self {
            SessionPlan::Templated { total_cycles, .. } => *total_cycles,
            SessionPlan::FreeRunning { .. } => 1,
        }
    }

    /// Planned work seconds, fixed at session start for reward sizing.
    pub fn planned_work_secs(&self) -> u64 {
        match self {
            SessionPlan::Templated {
                template,
                total_cycles,
            } => template.work_secs.saturating_mul(u64::from(*total_cycles)),
            SessionPlan::FreeRunning { duration_secs } => *duration_secs,
        }
    }

    pub fn phase_secs(&self, phase: Phase) -> u64 {
        match self {
            SessionPlan::Templated { template, .. } => template.phase_secs(phase),
            SessionPlan::FreeRunning { duration_secs } => match phase {
                Phase::Work => *duration_secs,
                Phase::ShortBreak | Phase::LongBreak => 0,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SessionPlan::Templated { .. } => "templated",
            SessionPlan::FreeRunning { .. } => "freeRunning",
        }
    }
}
