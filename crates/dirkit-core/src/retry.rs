//! Busy-retry policy for directory operations.
//!
//! Directory servers answer `busy` when they are transiently overloaded. Every
//! operation that goes through a [`BusyRetryPolicy`] re-issues its request after a
//! fixed pause, up to a per-session cap, and fails with [`Error::BusyExceeded`] once
//! the cap is spent. Any other status is handed back to the caller untouched.
//!
//! The policy hands out a [`BusyBudget`] per logical operation:
//!
//! ```
//! # async fn run() -> dirkit_core::Result<()> {
//! use dirkit_core::retry::BusyRetryPolicy;
//! use dirkit_core::ResultCode;
//!
//! let policy = BusyRetryPolicy::new().with_max_busy_retries(2);
//! let mut budget = policy.budget("search", "dc=example,dc=com");
//! let mut replies = vec![ResultCode::Success, ResultCode::Busy].into_iter().rev();
//! let status = loop {
//!     let status = replies.next().unwrap_or(ResultCode::Success);
//!     if status.is_busy() {
//!         budget.wait().await?;
//!         continue;
//!     }
//!     break status;
//! };
//! assert!(status.is_success());
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use std::time::Duration;
use tracing::warn;

/// Default number of busy retries after the first attempt.
pub const DEFAULT_MAX_BUSY_RETRIES: u32 = 10;

/// Default pause between busy retries in milliseconds.
pub const DEFAULT_BUSY_WAIT_MS: u64 = 1000;

/// Fixed-interval retry policy applied to `busy` replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyRetryPolicy {
    /// Retries allowed after the first attempt (0 fails on the first busy reply)
    pub max_busy_retries: u32,

    /// Pause between attempts
    pub wait_interval: Duration,
}

impl BusyRetryPolicy {
    /// Create a policy with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_busy_retries: DEFAULT_MAX_BUSY_RETRIES,
            wait_interval: Duration::from_millis(DEFAULT_BUSY_WAIT_MS),
        }
    }

    /// Create a policy that fails on the first busy reply.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_busy_retries: 0,
            wait_interval: Duration::from_millis(DEFAULT_BUSY_WAIT_MS),
        }
    }

    /// Set the number of retries.
    #[must_use]
    pub const fn with_max_busy_retries(mut self, retries: u32) -> Self {
        self.max_busy_retries = retries;
        self
    }

    /// Set the pause between retries in milliseconds.
    ///
    /// Non-positive values fall back to [`DEFAULT_BUSY_WAIT_MS`].
    #[must_use]
    pub const fn with_wait_interval_ms(mut self, millis: i64) -> Self {
        let millis = if millis <= 0 {
            DEFAULT_BUSY_WAIT_MS
        } else {
            millis as u64
        };
        self.wait_interval = Duration::from_millis(millis);
        self
    }

    /// Check if retries are enabled.
    #[must_use]
    pub const fn has_retries(&self) -> bool {
        self.max_busy_retries > 0
    }

    /// Start a fresh budget for one logical operation on `path`.
    #[must_use]
    pub fn budget(&self, operation: &'static str, path: impl Into<String>) -> BusyBudget {
        BusyBudget {
            operation,
            path: path.into(),
            remaining: self.max_busy_retries,
            attempts: 1,
            wait_interval: self.wait_interval,
        }
    }
}

impl Default for BusyRetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry allowance for a single logical operation.
#[derive(Debug)]
pub struct BusyBudget {
    operation: &'static str,
    path: String,
    remaining: u32,
    attempts: u32,
    wait_interval: Duration,
}

impl BusyBudget {
    /// Record a busy reply and sleep before the next attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BusyExceeded`] once the allowance is spent.
    pub async fn wait(&mut self) -> Result<()> {
        if self.remaining == 0 {
            return Err(Error::BusyExceeded {
                operation: self.operation,
                path: self.path.clone(),
                attempts: self.attempts,
            });
        }
        self.remaining -= 1;
        warn!(
            operation = self.operation,
            path = %self.path,
            attempt = self.attempts,
            remaining = self.remaining,
            "directory server busy, retrying"
        );
        tokio::time::sleep(self.wait_interval).await;
        self.attempts += 1;
        Ok(())
    }

    /// Requests issued so far, including the current one.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}
