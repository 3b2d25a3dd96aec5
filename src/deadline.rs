//! Deadlines for transfers.
//!
//! A [`Deadline`] is a plain value passed down to the code doing the I/O. A
//! nested deadline is derived with [`Deadline::child`] and never extends its
//! parent, so an exhausted outer deadline still expires the inner one.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("deadline exceeded")]
pub struct Expired;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn unbounded() -> Self {
        Self { at: None }
    }

    /// A zero timeout means no deadline.
    pub fn after(timeout: Duration) -> Self {
        if timeout.is_zero() {
            return Self::unbounded();
        }
        Self {
            at: Some(Instant::now() + timeout),
        }
    }

    /// The earlier of this deadline and `timeout` from now.
    pub fn child(&self, timeout: Duration) -> Self {
        let own = Self::after(timeout);
        match (self.at, own.at) {
            (Some(a), Some(b)) => Self { at: Some(a.min(b)) },
            (Some(a), None) => Self { at: Some(a) },
            (None, b) => Self { at: b },
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.at.is_some()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }

    /// Cooperative check for transfer loops.
    pub fn check(&self) -> Result<(), Expired> {
        if self.is_expired() {
            Err(Expired)
        } else {
            Ok(())
        }
    }

    /// Drive `fut` until it completes or the deadline passes; in the latter
    /// case the future is dropped, which aborts the transfer.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Expired> {
        match self.at {
            None => Ok(fut.await),
            Some(at) => tokio::time::timeout_at(at, fut).await.map_err(|_| Expired),
        }
    }
}
