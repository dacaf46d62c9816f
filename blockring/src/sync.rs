//! Blocking synchronization primitives shared by the ring endpoints.

use std::time::Duration;

pub mod semaphore;

pub use semaphore::{BoundedSemaphore, SemaphoreError};

/// Timeout specification for blocking operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}
