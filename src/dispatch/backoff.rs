//! Retry backoff with deterministic jitter.
//!
//! Delays grow exponentially per attempt and are capped at a maximum. A
//! small jitter factor keyed by `(reply id, attempt)` de-synchronizes
//! retries across tasks without pulling in a random number generator; the
//! same task always computes the same schedule, which keeps backoff behavior
//! testable.
//!
//! Delays are non-decreasing per task as long as `multiplier` is at least
//! `1 + jitter_percent / 100` (the jitter can never outrun one exponential
//! step), and flat at `max_delay` once the cap is reached.

use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::types::ReplyId;

/// Configuration for retry backoff.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// Maximum total post attempts per task (including the first).
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub initial_delay: Duration,

    /// Cap on the delay between attempts.
    pub max_delay: Duration,

    /// Multiplier for exponential growth.
    pub multiplier: f64,

    /// Jitter window as a percentage (0-100) added on top of the base delay.
    pub jitter_percent: u8,
}

impl BackoffConfig {
    /// Default schedule: 5 attempts, 2s base delay doubling to a 60s cap,
    /// with up to 20% jitter.
    pub const DEFAULT: Self = Self {
        max_attempts: 5,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(60),
        multiplier: 2.0,
        jitter_percent: 20,
    };

    /// Computes the delay before the next attempt, given the number of
    /// attempts completed so far (1-based: pass 1 after the first failure).
    pub fn delay_after_attempt(&self, attempt: u32, reply_id: &ReplyId) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let jittered = base * self.jitter_factor(reply_id, attempt);
        Duration::from_secs_f64(jittered.min(self.max_delay.as_secs_f64()))
    }

    /// True once a task has used up its attempt budget.
    pub fn attempts_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Jitter factor in `[1.0, 1.0 + jitter_percent/100)`, deterministic per
    /// `(reply id, attempt)`.
    fn jitter_factor(&self, reply_id: &ReplyId, attempt: u32) -> f64 {
        if self.jitter_percent == 0 {
            return 1.0;
        }
        let mut hasher = std::hash::DefaultHasher::new();
        reply_id.hash(&mut hasher);
        attempt.hash(&mut hasher);
        let jitter = (hasher.finish() % self.jitter_percent as u64) as f64 / 100.0;
        1.0 + jitter
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
