//! Randomized pacing between uploads and the cancellable countdown.

use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Wait window between two consecutive uploads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayPolicy {
    enabled: bool,
    min_minutes: u32,
    max_minutes: u32,
}

/// How a countdown ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    CancelledDuringWait,
}

impl DelayPolicy {
    /// Negative bounds clamp to 0 and `max` is raised to `min` when smaller.
    pub fn new(enabled: bool, min_minutes: i64, max_minutes: i64) -> Self {
        let min = clamp_minutes(min_minutes);
        let max = clamp_minutes(max_minutes).max(min);
        Self {
            enabled,
            min_minutes: min,
            max_minutes: max,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 0, 0)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn min_minutes(&self) -> u32 {
        self.min_minutes
    }

    pub fn max_minutes(&self) -> u32 {
        self.max_minutes
    }

    /// Seconds to wait before the next upload; 0 when pacing is off.
    pub fn sample(&self) -> u64 {
        if !self.enabled {
            return 0;
        }
        let lo = u64::from(self.min_minutes) * 60;
        let hi = u64::from(self.max_minutes) * 60;
        rand::rng().random_range(lo..=hi)
    }

    /// Count down `seconds`, reporting the remaining time once per second.
    ///
    /// The token is checked before every tick and raced against every sleep,
    /// so cancellation returns within the current second.
    pub async fn wait<F>(seconds: u64, mut on_tick: F, cancel: &CancellationToken) -> WaitOutcome
    where
        F: FnMut(u64),
    {
        let mut remaining = seconds;
        while remaining > 0 {
            if cancel.is_cancelled() {
                return WaitOutcome::CancelledDuringWait;
            }
            on_tick(remaining);
            tokio::select! {
                _ = cancel.cancelled() => return WaitOutcome::CancelledDuringWait,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
            remaining -= 1;
        }
        WaitOutcome::Completed
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::new(false, 1, 3)
    }
}

fn clamp_minutes(v: i64) -> u32 {
    u32::try_from(v.max(0)).unwrap_or(u32::MAX)
}

/// Render seconds as `MM:SS` for the countdown line.
pub fn format_countdown(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
