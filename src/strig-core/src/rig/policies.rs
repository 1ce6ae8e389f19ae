// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Retry policies for transport queries.

use std::time::Duration;

use crate::rig::response::RigError;

/// Policy for retrying failed operations.
pub trait RetryPolicy: Send + Sync {
    /// Determine if the operation should be retried after `attempt`
    /// (zero-based) failed with `error`.
    fn should_retry(&self, attempt: u32, error: &RigError) -> bool;

    /// Get the delay before the next retry attempt.
    fn delay(&self, attempt: u32) -> Duration;

    /// Get the maximum number of attempts allowed.
    fn max_attempts(&self) -> u32;
}

/// Fixed delay retry policy.
///
/// `retries` extra attempts follow the first one, each preceded by the same
/// backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    retries: u32,
    delay: Duration,
}

impl FixedDelay {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Same backoff, different retry count.
    pub fn with_retries(self, retries: u32) -> Self {
        Self { retries, ..self }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(300))
    }
}

impl RetryPolicy for FixedDelay {
    fn should_retry(&self, attempt: u32, error: &RigError) -> bool {
        attempt + 1 < self.max_attempts() && error.is_transient()
    }

    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }

    fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}
