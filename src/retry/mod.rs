// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Exponential backoff for the push loop.
//!
//! ```text
//! attempt 0 ── fail ── sleep 500ms
//! attempt 1 ── fail ── sleep 750ms
//! attempt 2 ── fail ── sleep 1125ms ...  (capped at max_delay)
//!
//! stop when: success | permanent error | retries exhausted
//!            | waited + next delay > max_elapsed
//! ```

use std::time::{Duration, Instant};

use bon::Builder;
use tracing::{debug, warn};

use crate::error::{PushError, RemoteError, StoreError};

/// Errors that know whether another attempt can succeed.
pub trait Retryable {
    fn is_permanent(&self) -> bool;
}

impl Retryable for RemoteError {
    fn is_permanent(&self) -> bool {
        Self::is_permanent(self)
    }
}

impl Retryable for PushError {
    fn is_permanent(&self) -> bool {
        Self::is_permanent(self)
    }
}

impl Retryable for StoreError {
    fn is_permanent(&self) -> bool {
        match self {
            Self::Push(err) => err.is_permanent(),
            Self::Remote(err) => err.is_permanent(),
            _ => true,
        }
    }
}

/// Backoff parameters. Delays are deterministic (no jitter).
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct RetryPolicy {
    #[builder(default = Duration::from_millis(500))]
    initial_delay: Duration,
    #[builder(default = 1.5)]
    multiplier: f64,
    #[builder(default = Duration::from_millis(2000))]
    max_delay: Duration,
    #[builder(default = Duration::from_secs(7))]
    max_elapsed: Duration,
    #[builder(default = 6)]
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.initial_delay.as_secs_f64() * 1000.0 * self.multiplier.powi(exponent);
        if !millis.is_finite() || millis >= self.max_delay.as_secs_f64() * 1000.0 {
            return self.max_delay;
        }
        Duration::from_secs_f64(millis / 1000.0)
    }

    /// Run `op` until it succeeds or the policy gives up.
    ///
    /// `op` receives the 0-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns the last error of `op`.
    pub fn run<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        self.run_with_sleep(op, std::thread::sleep)
    }

    /// Like [`RetryPolicy::run`] with a custom sleep function.
    ///
    /// # Errors
    ///
    /// Returns the last error of `op`.
    pub fn run_with_sleep<T, E, F, S>(&self, mut op: F, mut sleep: S) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
        S: FnMut(Duration),
    {
        let start = Instant::now();
        let mut waited = Duration::ZERO;
        let mut attempt = 0;
        loop {
            let err = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if err.is_permanent() {
                debug!(attempt, error = %err, "permanent error, not retrying");
                return Err(err);
            }
            if attempt >= self.max_retries {
                warn!(attempt, error = %err, "giving up after max retries");
                return Err(err);
            }
            let delay = self.delay_for_attempt(attempt);
            let elapsed = start.elapsed().max(waited);
            if elapsed + delay > self.max_elapsed {
                warn!(attempt, elapsed = ?elapsed, error = %err, "giving up after max elapsed time");
                return Err(err);
            }
            warn!(attempt, delay = ?delay, error = %err, "retrying");
            sleep(delay);
            waited += delay;
            attempt += 1;
        }
    }
}
