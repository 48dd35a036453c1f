// ============================================================================
// Retry Policy
// ============================================================================
//
// Exponential backoff with jitter for transient failures.
//
// Delay before retry n (1-based): base * 2^(n-1), plus a random jitter of up
// to half that value so that concurrent callers do not retry in lockstep.
//
// ============================================================================

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = no retry)
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Jitter-free delay before retry `attempt` (1-based)
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Delay before retry `attempt` including jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let max_jitter_ms = (base.as_millis() / 2) as u64;
        if max_jitter_ms == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=max_jitter_ms);
        base + Duration::from_millis(jitter)
    }
}
