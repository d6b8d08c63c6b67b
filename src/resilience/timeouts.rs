//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound the sending phase of a relayed call with one end-to-end deadline
//! - Let buffered reads spend only what is left of that deadline
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities, not the client's own timeout, because the
//!   client's timeout would also cut long-lived streams
//! - No per-chunk timeout once a stream has started
//! - Timed-out calls surface as [`RelayError::Timeout`] (504)

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::relay::error::RelayError;

/// A fixed point in time a call must finish by.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start a deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Run `fut` to completion unless the deadline passes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, RelayError>
    where
        F: Future<Output = Result<T, RelayError>>,
    {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result.map_err(|e| match e {
                // the client does not know our budget; report the real one
                RelayError::Timeout(_) => RelayError::Timeout(self.budget),
                other => other,
            }),
            Err(_) => Err(RelayError::Timeout(self.budget)),
        }
    }
}
