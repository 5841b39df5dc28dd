// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Retry/Backoff Policy Value Object
//!
//! This module provides the bounded exponential backoff policy used by the
//! chunk executor. The policy is a pure function of the attempt count:
//!
//! ```text
//! delay(a) = min(MAX_BACKOFF, BASE_BACKOFF × 2^(a − 1))    for a ≥ 1
//! ```
//!
//! The caller sleeps for the computed delay and then re-enqueues the task.
//! Retries are bounded by `max_retries`; once exhausted, the chunk fails
//! terminally. Jitter is intentionally not part of the policy function so
//! that it stays deterministic and testable; the worker applies ±10%
//! uniform jitter at the call site.
//!
//! ## Defaults
//!
//! With the default configuration (base 1.0s, cap 30.0s) the delays for
//! attempts 1, 2, 3 are 1s, 2s and 4s respectively.

use crate::IngestError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded exponential backoff policy for chunk retries.
///
/// # Key Features
///
/// - **Pure**: `delay_for(attempts)` depends only on the policy and the
///   attempt count
/// - **Bounded**: Delays never exceed the configured cap; attempts never
///   exceed `max_retries`
/// - **Validated**: Construction rejects non-positive base/cap values
///
/// # Examples
///
/// ```
/// use granary_domain::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.delay_for(1), Duration::from_secs_f64(1.0));
/// assert_eq!(policy.delay_for(2), Duration::from_secs_f64(2.0));
/// assert_eq!(policy.delay_for(3), Duration::from_secs_f64(4.0));
/// assert!(policy.should_retry(2));
/// assert!(!policy.should_retry(3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    max_retries: u32,
    base_backoff_secs: f64,
    max_backoff_secs: f64,
}

impl RetryPolicy {
    /// Default attempt bound
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Default base delay in seconds
    pub const DEFAULT_BASE_BACKOFF_SECS: f64 = 1.0;

    /// Default delay cap in seconds
    pub const DEFAULT_MAX_BACKOFF_SECS: f64 = 30.0;

    /// Creates a new retry policy with validation
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Upper bound on attempts before a chunk fails
    ///   terminally
    /// * `base_backoff_secs` - Delay for the first retry, in seconds
    /// * `max_backoff_secs` - Cap applied to every computed delay
    ///
    /// # Errors
    ///
    /// Returns `IngestError::InvalidConfiguration` when either duration is
    /// not strictly positive or the cap is below the base.
    pub fn new(
        max_retries: u32,
        base_backoff_secs: f64,
        max_backoff_secs: f64,
    ) -> Result<Self, IngestError> {
        if !base_backoff_secs.is_finite() || base_backoff_secs <= 0.0 {
            return Err(IngestError::InvalidConfiguration(format!(
                "Base backoff must be positive, got {}",
                base_backoff_secs
            )));
        }
        if !max_backoff_secs.is_finite() || max_backoff_secs < base_backoff_secs {
            return Err(IngestError::InvalidConfiguration(format!(
                "Max backoff {} must be at least the base backoff {}",
                max_backoff_secs, base_backoff_secs
            )));
        }
        Ok(Self {
            max_retries,
            base_backoff_secs,
            max_backoff_secs,
        })
    }

    /// Upper bound on attempts
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether a chunk that has now failed `attempts` times should be
    /// retried rather than failed terminally.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_retries
    }

    /// Computes the backoff delay for the given attempt count.
    ///
    /// `attempts` is 1-based: it is the number of failures observed so far.
    /// Attempt counts of zero yield the base delay.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(63);
        let factor = 2f64.powi(exponent as i32);
        let delay = (self.base_backoff_secs * factor).min(self.max_backoff_secs);
        Duration::from_secs_f64(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            base_backoff_secs: Self::DEFAULT_BASE_BACKOFF_SECS,
            max_backoff_secs: Self::DEFAULT_MAX_BACKOFF_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs_f64(1.0));
        assert_eq!(policy.delay_for(2), Duration::from_secs_f64(2.0));
        assert_eq!(policy.delay_for(3), Duration::from_secs_f64(4.0));
    }

    #[test]
    fn test_cap_applies() {
        let policy = RetryPolicy::new(10, 1.0, 30.0).unwrap();
        assert_eq!(policy.delay_for(6), Duration::from_secs_f64(30.0));
        assert_eq!(policy.delay_for(60), Duration::from_secs_f64(30.0));
    }

    #[test]
    fn test_should_retry_bound() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(RetryPolicy::new(3, 0.0, 30.0).is_err());
        assert!(RetryPolicy::new(3, -1.0, 30.0).is_err());
        assert!(RetryPolicy::new(3, 5.0, 1.0).is_err());
    }

    proptest! {
        #[test]
        fn prop_delay_is_monotone_and_capped(attempts in 1u32..200) {
            let policy = RetryPolicy::default();
            let delay = policy.delay_for(attempts);
            let next = policy.delay_for(attempts + 1);
            prop_assert!(delay <= next);
            prop_assert!(delay <= Duration::from_secs_f64(RetryPolicy::DEFAULT_MAX_BACKOFF_SECS));
        }
    }
}
