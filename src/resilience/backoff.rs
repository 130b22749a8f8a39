//! Exponential backoff with jitter for transient RPC failures.

use rand::Rng;
use std::time::Duration;

use crate::config::FinalityConfig;

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    // Jitter: 0 to 10% of the delay
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Tracks consecutive failures of one polling loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    max_failures: u32,
    failures: u32,
}

impl Backoff {
    pub fn new(base_ms: u64, max_ms: u64, max_failures: u32) -> Self {
        Self {
            base_ms,
            max_ms,
            max_failures,
            failures: 0,
        }
    }

    pub fn from_config(config: &FinalityConfig) -> Self {
        Self::new(config.backoff_base_ms, config.backoff_max_ms, config.max_rpc_failures)
    }

    /// Record a failure. Returns the delay before the next attempt, or `None`
    /// once the failure budget is spent.
    pub fn fail(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures > self.max_failures {
            return None;
        }
        Some(calculate_backoff(self.failures, self.base_ms, self.max_ms))
    }

    /// Clear the failure streak after a successful call.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
