//! Grace window classification for stop requests.

use std::time::{Duration, Instant};

/// Default grace window after session start.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(9);

/// `true` when `now - started_at <= grace`. Uses monotonic instants so a
/// system clock adjustment cannot move a session across the boundary.
pub fn is_within_grace(started_at: Instant, now: Instant, grace: Duration) -> bool {
    now.saturating_duration_since(started_at) <= grace
}

/// How a stop request resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDisposition {
    /// Erase the session: no record, no reward, no penalty.
    Cancel,
    /// Count the session as failed.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GracePeriodGuard {
    grace: Duration,
}

impl GracePeriodGuard {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn classify(&self, started_at: Instant, now: Instant) -> StopDisposition {
        if is_within_grace(started_at, now, self.grace) {
            StopDisposition::Cancel
        } else {
            StopDisposition::Fail
        }
    }
}

impl Default for GracePeriodGuard {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}
