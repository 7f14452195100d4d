//! Phase sequencing.
//!
//! Pure functions deciding what follows the phase that just ran out.
//! Zero-length breaks are skipped outright so the engine never arms a
//! phase with nothing to tick through.

use super::template::{Phase, SessionPlan, SessionTemplate};

/// Result of advancing past a finished phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStep {
    Next { phase: Phase, cycle: u32 },
    Complete,
}

impl PhaseStep {
    pub fn is_session_complete(self) -> bool {
        matches!(self, PhaseStep::Complete)
    }
}

/// Advance a templated session.
///
/// `current_cycle` is 1-based and never exceeds `total_cycles`.
pub fn next(
    template: &SessionTemplate,
    current_phase: Phase,
    current_cycle: u32,
    total_cycles: u32,
) -> PhaseStep {
    match current_phase {
        Phase::Work if current_cycle >= total_cycles => {
            if template.long_break_secs > 0 {
                PhaseStep::Next {
                    phase: Phase::LongBreak,
                    cycle: current_cycle,
                }
            } else {
                PhaseStep::Complete
            }
        }
        Phase::Work => {
            if template.short_break_secs > 0 {
                PhaseStep::Next {
                    phase: Phase::ShortBreak,
                    cycle: current_cycle,
                }
            } else {
                PhaseStep::Next {
                    phase: Phase::Work,
                    cycle: current_cycle + 1,
                }
            }
        }
        Phase::ShortBreak => PhaseStep::Next {
            phase: Phase::Work,
            cycle: (current_cycle + 1).min(total_cycles),
        },
        Phase::LongBreak => PhaseStep::Complete,
    }
}

/// Advance any plan. Free-running sessions end after their single phase.
pub fn next_for_plan(plan: &SessionPlan, current_phase: Phase, current_cycle: u32) -> PhaseStep {
    match plan {
        SessionPlan::Templated {
            template,
            total_cycles,
        } => next(template, current_phase, current_cycle, *total_cycles),
        SessionPlan::FreeRunning { .. } => PhaseStep::Complete,
    }
}
