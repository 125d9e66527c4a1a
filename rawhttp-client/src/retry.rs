//! # Retry Policy
//!
//! Purpose: Decide from the attempt count and the outcome of an attempt
//! whether the whole exchange runs again.
//!
//! ## Rules
//! 1. A retry is permitted while `limit > 0 && attempts < limit`.
//! 2. Transport, timeout and parse failures are eligible; cancellation and
//!    request body failures are terminal and never retried.
//! 3. Any status >= 400 is eligible, 4xx included.
//!
//! Attempts follow each other immediately: there is no backoff or jitter.

use rawhttp_common::{Response, STATUS_BAD_REQUEST};

/// Bounded retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    limit: u16,
}

impl RetryPolicy {
    /// Creates a policy allowing `limit` extra attempts.
    pub const fn new(limit: u16) -> Self {
        RetryPolicy { limit }
    }

    /// Configured limit.
    pub const fn limit(&self) -> u16 {
        self.limit
    }

    /// Returns true while the attempt budget is not used up.
    pub const fn permits(&self, attempts: u16) -> bool {
        self.limit > 0 && attempts < self.limit
    }

    /// Returns true when the outcome may be repeated.
    pub fn is_retryable(response: &Response) -> bool {
        match &response.error {
            Some(err) => !err.is_terminal(),
            None => response.status >= STATUS_BAD_REQUEST,
        }
    }

    /// Full decision for a completed attempt.
    pub fn should_retry(&self, attempts: u16, response: &Response) -> bool {
        self.permits(attempts) && Self::is_retryable(response)
    }
}
