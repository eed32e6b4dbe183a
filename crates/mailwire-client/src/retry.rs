//! Exponential backoff with jitter for the send request.
//!
//! A failed attempt is retried when the failure is transient: network-level
//! errors, HTTP 429, and HTTP 5xx other than 501. The delay before retry `n`
//! (0-based) is `min(base_delay * backoff_multiplier^n, max_delay)` plus up
//! to `jitter_factor` of that delay, truncated to whole milliseconds.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy for the physical send request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt; `max_retries + 1` attempts in total.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Upper bound on the un-jittered delay.
    pub max_delay: Duration,

    /// Growth factor applied per attempt.
    pub backoff_multiplier: f64,

    /// Fraction (0.0 to 1.0) of the delay added as random jitter.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retries() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    /// Total number of attempts, including the first.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Un-jittered delay after the failed attempt `attempt` (0-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.backoff_millis(attempt) / 1000.0)
    }

    /// Delay with jitter, given a uniform sample in `[0, 1)`.
    ///
    /// The result is floored to whole milliseconds.
    pub fn jittered_delay(&self, attempt: u32, sample: f64) -> Duration {
        let delay = self.backoff_millis(attempt);
        let jitter = delay * self.jitter_factor.clamp(0.0, 1.0) * sample.clamp(0.0, 1.0);

        Duration::from_millis((delay + jitter).floor() as u64)
    }

    fn backoff_millis(&self, attempt: u32) -> f64 {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.base_delay.as_millis() as f64;
        let max = self.max_delay.as_millis() as f64;
        let scaled = base * self.backoff_multiplier.powi(exponent);

        if scaled.is_finite() && scaled < max {
            scaled.max(0.0)
        } else {
            max
        }
    }

    /// Delay before the retry that follows failed attempt `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let sample = if self.jitter_factor > 0.0 { rand::rng().random::<f64>() } else { 0.0 };
        self.jittered_delay(attempt, sample)
    }

    /// Checks the policy for values that would make backoff meaningless.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err("backoff_multiplier must be at least 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err("jitter_factor must be between 0.0 and 1.0".to_string());
        }
        if self.base_delay > self.max_delay {
            return Err("base_delay cannot exceed max_delay".to_string());
        }
        Ok(())
    }
}

/// Whether an HTTP status warrants another attempt.
///
/// 429 and 5xx are transient, except 501 which will not change on retry.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || ((500..=599).contains(&status) && status != 501)
}
