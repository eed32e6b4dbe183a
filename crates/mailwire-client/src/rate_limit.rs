//! Fixed-window request limiter.
//!
//! Each client owns one limiter. The first window starts when the limiter is
//! created. Every acquisition inside a window increments a counter, and once
//! the counter reaches `max_requests` further acquisitions fail immediately
//! with the time left in the window. The first acquisition at or past the
//! window's end starts a new window at that instant. Nothing queues or waits.
//! Bursts straddling a window boundary are allowed.

use std::{
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

/// Request budget per window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum send requests per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self { max_requests: 100, window: Duration::from_secs(60) }
    }
}

impl RateLimitPolicy {
    /// Checks that the policy admits at least one request.
    ///
    /// # Errors
    ///
    /// Returns a description of the invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_requests == 0 {
            return Err("max_requests must be greater than 0".to_string());
        }
        if self.window.is_zero() {
            return Err("window must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed-window limiter guarding the client's send path.
///
/// The counter and window start are updated under one lock so the
/// at-most-`max_requests`-per-window bound holds when a client is shared
/// across tasks or threads.
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    window: Mutex<Window>,
}

impl RateLimiter {
    /// Creates a limiter whose first window starts at `now`.
    pub fn new(policy: RateLimitPolicy, now: Instant) -> Self {
        Self { policy, window: Mutex::new(Window { started_at: now, count: 0 }) }
    }

    /// The limiter's policy.
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Takes one request slot at `now`.
    ///
    /// # Errors
    ///
    /// Returns the time remaining in the current window when the budget is
    /// spent.
    pub fn try_acquire(&self, now: Instant) -> Result<(), Duration> {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);

        if now.saturating_duration_since(window.started_at) >= self.policy.window {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.policy.max_requests {
            let elapsed = now.saturating_duration_since(window.started_at);
            return Err(self.policy.window.saturating_sub(elapsed));
        }

        window.count += 1;
        Ok(())
    }

    /// Slots left in the window as seen at `now`.
    pub fn remaining(&self, now: Instant) -> u32 {
        let window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        if now.saturating_duration_since(window.started_at) < self.policy.window {
            self.policy.max_requests.saturating_sub(window.count)
        } else {
            self.policy.max_requests
        }
    }
}
