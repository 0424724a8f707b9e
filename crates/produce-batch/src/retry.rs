//! Retry Policy with Exponential Backoff
//!
//! This module defines how many times a batch publish is re-attempted and how
//! long to wait between attempts. Only the records that failed with a
//! retryable error are re-sent; see [`crate::publish`].
//!
//! ## Schedule
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  RetryPolicy (default)       │
//! │  - max_retries: 2            │
//! │  - initial_backoff: 100ms    │
//! │  - max_backoff: 5s           │
//! │  - backoff_multiplier: 2.0   │
//! │  - jitter: ±25%              │
//! └──────┬───────────────────────┘
//!        │
//!        ├─→ Attempt 1: Immediate
//!        ├─→ Attempt 2: Wait ~100ms
//!        └─→ Attempt 3: Wait ~200ms
//! ```
//!
//! ## Examples
//!
//! ```ignore
//! use produce_batch::RetryPolicy;
//!
//! let policy = RetryPolicy::default();            // 3 attempts, 100ms-5s backoff
//! let eager = RetryPolicy::no_backoff(4);         // 5 attempts, back to back
//! ```

use std::time::Duration;

/// Retry policy configuration for exponential backoff.
///
/// # Backoff Calculation
///
/// ```text
/// backoff = min(initial_backoff * multiplier^attempt, max_backoff)
/// delay   = backoff * (0.75 + random(0.0, 0.5))   when jitter is on
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: usize,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,

    /// Randomize each delay by ±25% so many publishers retrying the same
    /// broker do not retry in lockstep.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// Three attempts in total, 100ms initial backoff doubling up to 5s, jittered.
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom settings. Jitter is enabled.
    pub fn new(
        max_retries: usize,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
            jitter: true,
        }
    }

    /// Retry immediately, without waiting between attempts.
    pub fn no_backoff(max_retries: usize) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total number of send attempts, including the first one.
    pub fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    /// Calculate backoff duration for a given attempt number (0-indexed).
    ///
    /// ```ignore
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.backoff(0), Duration::from_millis(100));
    /// assert_eq!(policy.backoff(1), Duration::from_millis(200));
    /// ```
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        if !backoff_ms.is_finite() || backoff_ms >= self.max_backoff.as_millis() as f64 {
            return self.max_backoff;
        }
        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }

    /// The actual wait before retry number `attempt + 1`, with jitter applied.
    pub fn delay(&self, attempt: usize) -> Duration {
        let base = self.backoff(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let jitter = 0.75 + (rand::random::<f64>() * 0.5); // 0.75-1.25x
        Duration::from_millis((base.as_millis() as f64 * jitter) as u64)
    }
}
