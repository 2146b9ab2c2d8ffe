//! Retry with exponential backoff.
//!
//! Each backend in the chain gets `1 + max_retries` attempts. The delay
//! before retry `n` is `base_delay * 2^(n-1)`, capped at `max_delay`: with
//! the defaults that is 2s then 4s. No delay is inserted when the
//! orchestrator advances to the next model.

use backon::{BackoffBuilder, ExponentialBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_str;

/// Retry policy applied to every backend in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(with = "duration_str")]
    pub base_delay: Duration,

    /// Upper bound on any single delay
    #[serde(with = "duration_str")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Attempts per backend, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Fresh iterator over the delays before each retry.
    ///
    /// Yields exactly `max_retries` delays; `None` means the backend is
    /// exhausted.
    pub fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay.max(self.base_delay))
            .with_factor(2.0)
            .with_max_times(self.max_retries as usize)
            .build()
    }

    /// Sum of all delays one backend can spend sleeping.
    pub fn total_delay(&self) -> Duration {
        self.backoff().sum()
    }
}
