//! Coalescing scheduler for debounced work.
//!
//! A request marks the work dirty and pushes its deadline to `now + quiet`.
//! The owner's event loop sleeps until [`Coalescer::deadline`] and then calls
//! [`Coalescer::take_due`]; bursts of requests collapse into one execution
//! after the burst goes quiet. [`Coalescer::take`] drains pending work
//! unconditionally for shutdown.

use std::time::Duration;

use tokio::time::Instant;

/// Trailing-edge debouncer driven by explicit instants.
#[derive(Debug, Clone)]
pub struct Coalescer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Coalescer {
    #[must_use]
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// Mark work pending; supersedes any earlier request.
    pub fn request(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Clear and report pending work whose deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Clear and report pending work regardless of its deadline.
    pub fn take(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

/// Sleep until `deadline`, or forever when there is nothing scheduled.
///
/// Meant as a `tokio::select!` branch beside the host's event source.
pub async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
