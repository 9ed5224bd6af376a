//! Exponential backoff for session reconnects.

use rand::Rng;
use std::time::Duration;

use crate::config::ReconnectConfig;

/// Doubling is capped at 2^16 to keep the arithmetic in range
const MAX_EXPONENT: u32 = 16;

/// Tracks consecutive failed attempts and hands out the next delay
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    failures: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Call after a successful connect
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.failures
    }

    /// Delay before the next attempt, or None once attempts are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.failures >= self.config.max_attempts {
            return None;
        }
        let base = self.base_delay(self.failures);
        self.failures += 1;
        Some(self.jittered(base))
    }

    /// Un-jittered delay before attempt `n` (0-based)
    pub fn base_delay(&self, n: u32) -> Duration {
        let factor = 1u64 << n.min(MAX_EXPONENT);
        let ms = self
            .config
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.config.max_delay_ms);
        Duration::from_millis(ms)
    }

    fn jittered(&self, base: Duration) -> Duration {
        // NaN survives clamp and would panic in gen_range
        if self.config.jitter.is_nan() || base.is_zero() {
            return base;
        }
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        let max = Duration::from_millis(self.config.max_delay_ms);
        Duration::try_from_secs_f64(base.as_secs_f64() * factor)
            .unwrap_or(max)
            .min(max)
    }
}
