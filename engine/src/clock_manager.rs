use crate::{components::GateMetadata, types::DEFAULT_CLOCK_FREQUENCY};

pub fn rising_edge(prev: bool, curr: bool) -> bool {
    !prev && curr
}

/// CLOCK configuration read out of a gate's metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockManager {
    /// Hz.
    pub frequency: f64,
    pub is_running: bool,
    /// ms of simulated time at which the first period begins.
    pub start_time: f64,
}

impl ClockManager {
    pub fn from_metadata(metadata: &GateMetadata) -> ClockManager {
        ClockManager {
            frequency: metadata.frequency.unwrap_or(DEFAULT_CLOCK_FREQUENCY),
            is_running: metadata.is_running.unwrap_or(true),
            start_time: metadata.start_time.unwrap_or(0.0),
        }
    }

    pub fn period_ms(&self) -> Option<f64> {
        if self.frequency.is_finite() && self.frequency > 0.0 {
            Some(1000.0 / self.frequency)
        } else {
            None
        }
    }

    /// Low for the first half of each period, high for the second half.
    /// `None` means the clock is frozen and keeps whatever it last output.
    pub fn level_at(&self, time: f64) -> Option<bool> {
        if !self.is_running {
            return None;
        }
        let period = self.period_ms()?;
        let elapsed = time - self.start_time;
        if elapsed < 0.0 {
            return Some(false);
        }
        Some(elapsed.rem_euclid(period) >= period / 2.0)
    }
}
