//! Single-shot debounce timer.
//!
//! Poll-driven: callers restart it from any trigger path and ask whether the
//! quiet interval has elapsed. One firing per quiet interval, regardless of
//! how many restarts preceded it.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DebounceScheduler {
    interval: Duration,
    pending_since: Option<Instant>,
}

impl DebounceScheduler {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending_since: None,
        }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop and start again from `now`.
    pub const fn restart(&mut self, now: Instant) {
        self.pending_since = Some(now);
    }

    pub const fn stop(&mut self) {
        self.pending_since = None;
    }

    pub const fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    /// Time left before the timer fires.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let since = self.pending_since?;
        Some(
            self.interval
                .saturating_sub(now.saturating_duration_since(since)),
        )
    }

    /// Returns true once, when the interval has elapsed since the last
    /// restart.
    pub fn take_ready(&mut self, now: Instant) -> bool {
        let Some(since) = self.pending_since else {
            return false;
        };
        if now.saturating_duration_since(since) >= self.interval {
            self.pending_since = None;
            return true;
        }
        false
    }
}
