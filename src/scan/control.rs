//! Cancellation and deadlines for scan rounds

use crate::core::types::{MemoryError, MemoryResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What a round checks between chunk dispatches and inside long jobs
#[derive(Debug, Clone, Default)]
pub struct RoundControl {
    cancel: CancelToken,
    deadline: Option<(Instant, Duration)>,
}

impl RoundControl {
    /// A round that only stops when `cancel` fires
    pub fn new(cancel: CancelToken) -> Self {
        RoundControl {
            cancel,
            deadline: None,
        }
    }

    /// No cancellation source and no deadline
    pub fn unbounded() -> Self {
        RoundControl::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = timeout.map(|limit| (Instant::now() + limit, limit));
        self
    }

    pub fn token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Cheap check for hot loops
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.map_or(false, |(at, _)| Instant::now() >= at)
    }

    /// `Cancelled` wins over `Timeout` when both apply
    pub fn check(&self) -> MemoryResult<()> {
        if self.cancel.is_cancelled() {
            return Err(MemoryError::Cancelled);
        }
        match self.deadline {
            Some((at, limit)) if Instant::now() >= at => {
                Err(MemoryError::Timeout(limit.as_millis() as u64))
            }
            _ => Ok(()),
        }
    }
}
