//! Bounded polling support.
//!
//! The controller never waits on anything indefinitely: socket readiness and
//! process-exit waits are expressed as a [`RetryPolicy`], a fixed interval
//! times a maximum attempt count, so timeout behavior is a value that can be
//! tested in isolation instead of an inline loop.

use std::time::Duration;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A fixed-interval, bounded-attempts polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    interval: Duration,
    max_attempts: u32,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RetryPolicy {
    /// Creates a policy that polls every `interval`, at most `max_attempts` times.
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// The polling interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The maximum number of attempts before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The total time budget this policy represents.
    pub fn max_wait(&self) -> Duration {
        self.interval * self.max_attempts
    }

    /// Polls `condition` until it returns true or the attempt budget runs out.
    ///
    /// Returns whether the condition was observed true. The condition is
    /// checked once per attempt, before each sleep, so a condition that is
    /// already true never sleeps.
    pub async fn wait_for<F>(&self, mut condition: F) -> bool
    where
        F: FnMut() -> bool,
    {
        for attempt in 0..self.max_attempts {
            if condition() {
                return true;
            }

            // No point sleeping after the final check.
            if attempt + 1 < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        false
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
