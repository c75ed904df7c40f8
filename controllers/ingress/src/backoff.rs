//! # Retry backoff
//!
//! Failed reconciliations are retried on a Fibonacci schedule counted in
//! whole minutes: 1m, 1m, 2m, 3m, 5m, 8m, then flat at the cap.

use std::time::Duration;

/// Fibonacci retry delay, one instance per Ingress key.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    first_minutes: u64,
    cap_minutes: u64,
    prev_minutes: u64,
    next_minutes: u64,
}

impl FibonacciBackoff {
    /// Start a schedule at `first_minutes`, never exceeding `cap_minutes`.
    #[must_use]
    pub fn new(first_minutes: u64, cap_minutes: u64) -> Self {
        Self {
            first_minutes,
            cap_minutes,
            prev_minutes: 0,
            next_minutes: first_minutes,
        }
    }

    /// Delay to use for the current failure; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_secs(self.next_minutes * 60);
        let following = (self.prev_minutes + self.next_minutes).min(self.cap_minutes);
        self.prev_minutes = self.next_minutes;
        self.next_minutes = following;
        delay
    }

    /// Back to the first delay after a successful pass.
    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.next_minutes = self.first_minutes;
    }
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(1, 10)
    }
}
