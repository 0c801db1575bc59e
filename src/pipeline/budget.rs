//! Wall-clock budget for statistics jobs and the timeout retry policy.

use serde::{Deserialize, Serialize};

/// What to do with an entry whose job timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutDecision {
    /// Resubmit with the doubled multiplier.
    Retry { time_multiplier: u32 },
    /// The budget already reached the cap.
    Disable,
}

/// Budget = `base_hours × time_multiplier`, capped at `max_hours`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    base_hours: u32,
    max_hours: u32,
}

impl TimeBudget {
    pub fn new(base_hours: u32, max_hours: u32) -> Self {
        let base_hours = base_hours.max(1);
        Self {
            base_hours,
            max_hours: max_hours.max(base_hours),
        }
    }

    pub fn max_hours(&self) -> u32 {
        self.max_hours
    }

    /// Hours granted to a job submitted at `time_multiplier`.
    pub fn hours_for(&self, time_multiplier: u32) -> u32 {
        let hours = u64::from(self.base_hours) * u64::from(time_multiplier.max(1));
        hours.min(u64::from(self.max_hours)) as u32
    }

    /// True once the granted budget has reached the cap.
    pub fn is_exhausted(&self, time_multiplier: u32) -> bool {
        self.hours_for(time_multiplier) >= self.max_hours
    }

    pub fn on_timeout(&self, time_multiplier: u32) -> TimeoutDecision {
        if self.is_exhausted(time_multiplier) {
            TimeoutDecision::Disable
        } else {
            TimeoutDecision::Retry {
                time_multiplier: time_multiplier.max(1).saturating_mul(2),
            }
        }
    }
}

impl Default for TimeBudget {
    fn default() -> Self {
        Self::new(1, 48)
    }
}
