//! Request deadlines.
//!
//! A [`Deadline`] is passed explicitly to every remote call. The orchestrator
//! owns the parent deadline of a request and hands each stage a
//! [`share`](Deadline::share) of what remains, so a slow early stage cannot
//! push the request past its budget and time left over by a fast stage rolls
//! forward to the next one.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::error::{RagError, Result};

/// Roughly thirty years; used when a requested budget overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A point in time by which an operation must complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `budget` from now.
    ///
    /// A budget too large to represent saturates to a far-future instant.
    pub fn after(budget: Duration) -> Self {
        let now = Instant::now();
        let at = now.checked_add(budget).unwrap_or_else(|| now + FAR_FUTURE);
        Self { at }
    }

    /// A deadline at the given instant.
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    /// The instant this deadline expires.
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// A child deadline covering `1/parts` of the remaining budget.
    ///
    /// The child never outlives `self`. `parts == 0` is treated as 1.
    pub fn share(&self, parts: u32) -> Self {
        let slice = self.remaining() / parts.max(1);
        Self { at: (Instant::now() + slice).min(self.at) }
    }

    /// The smaller of `limit` and the remaining budget.
    ///
    /// HTTP clients use this as their per-request timeout.
    pub fn cap(&self, limit: Duration) -> Duration {
        self.remaining().min(limit)
    }

    /// Run `future` to completion unless the deadline expires first.
    ///
    /// On expiry the future is dropped, cancelling whatever it was awaiting,
    /// and [`RagError::DeadlineExceeded`] is returned. An already expired
    /// deadline fails without polling the future.
    pub async fn run<F, T>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_expired() {
            warn!(operation, "deadline already expired");
            return Err(RagError::deadline(operation));
        }
        match tokio::time::timeout_at(self.at, future).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, "deadline exceeded");
                Err(RagError::deadline(operation))
            }
        }
    }
}
