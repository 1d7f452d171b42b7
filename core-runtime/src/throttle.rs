//! Progress rate limiting.
//!
//! High-frequency sources (transfer callbacks, engine progress) are coalesced
//! to at most one update per interval. Terminal updates always pass so the
//! final state can never be dropped.

use std::time::{Duration, Instant};

/// Last-emit rate limiter with an unconditional terminal flush.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Decide whether an update observed at `now` should be applied.
    ///
    /// The first update always passes. Later intermediate updates pass once
    /// `interval` has elapsed since the last one that passed. `terminal`
    /// updates always pass.
    pub fn should_emit(&mut self, now: Instant, terminal: bool) -> bool {
        if !terminal {
            if let Some(last) = self.last_emit {
                if now.saturating_duration_since(last) < self.interval {
                    return false;
                }
            }
        }
        self.last_emit = Some(now);
        true
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Forget the last emission; the next update passes.
    pub fn reset(&mut self) {
        self.last_emit = None;
    }
}
