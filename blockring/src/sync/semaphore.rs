//! Counting semaphore with an upper bound on its resource count.
//!
//! The count lives behind a [`Mutex`] and waiters park on a [`Condvar`], so a
//! blocked [`BoundedSemaphore::lock`] suspends the calling thread instead of
//! spinning. Every wait re-checks the count in a loop, which makes the
//! semaphore immune to spurious wakeups.
//!
//! # Example
//!
//! ```
//! use blockring::sync::BoundedSemaphore;
//!
//! let sem = BoundedSemaphore::new(2, 1).unwrap();
//! assert!(sem.unlock_one());
//! assert!(!sem.unlock_one()); // already at max
//!
//! sem.lock();
//! assert!(sem.try_acquire());
//! assert!(!sem.try_acquire());
//! ```

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use minstant::Instant;
use thiserror::Error;

use super::Timeout;

/// Errors produced when constructing a [`BoundedSemaphore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SemaphoreError {
    /// The initial count is larger than the configured maximum.
    #[error("starting resources ({starting}) exceed maximum ({max})")]
    StartExceedsMax { starting: usize, max: usize },
}

/// A counting semaphore whose count stays within `[0, max_resources]`.
///
/// [`unlock_one`](Self::unlock_one) fails instead of overflowing the bound,
/// [`lock`](Self::lock) blocks while the count is zero.
#[derive(Debug)]
pub struct BoundedSemaphore {
    max_resources: usize,
    num_resources: Mutex<usize>,
    available: Condvar,
}

impl BoundedSemaphore {
    /// Creates a semaphore holding `starting_resources` out of `max_resources`.
    ///
    /// # Errors
    ///
    /// Returns [`SemaphoreError::StartExceedsMax`] if
    /// `starting_resources > max_resources`.
    pub fn new(max_resources: usize, starting_resources: usize) -> Result<Self, SemaphoreError> {
        if starting_resources > max_resources {
            return Err(SemaphoreError::StartExceedsMax {
                starting: starting_resources,
                max: max_resources,
            });
        }
        Ok(Self {
            max_resources,
            num_resources: Mutex::new(starting_resources),
            available: Condvar::new(),
        })
    }

    /// Creates an empty semaphore with room for `max_resources`.
    #[must_use]
    pub const fn with_max(max_resources: usize) -> Self {
        Self {
            max_resources,
            num_resources: Mutex::new(0),
            available: Condvar::new(),
        }
    }

    // The counter is only ever written as a whole `usize`, so a holder that
    // panicked cannot have left it half-updated.
    fn count(&self) -> MutexGuard<'_, usize> {
        self.num_resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes one resource available and wakes a single waiter.
    ///
    /// Returns `false`, leaving the count untouched, if the semaphore already
    /// holds `max_resources`.
    pub fn unlock_one(&self) -> bool {
        let mut count = self.count();
        if *count == self.max_resources {
            return false;
        }
        *count += 1;
        drop(count);
        self.available.notify_one();
        true
    }

    /// Parks on the condvar until the count is non-zero.
    fn wait_nonzero<'a>(&self, mut count: MutexGuard<'a, usize>) -> MutexGuard<'a, usize> {
        while *count == 0 {
            count = self
                .available
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
        count
    }

    /// Takes one resource, blocking the calling thread while none is available.
    pub fn lock(&self) {
        let mut count = self.wait_nonzero(self.count());
        *count -= 1;
    }

    /// Takes one resource if available, without blocking.
    pub fn try_acquire(&self) -> bool {
        let mut count = self.count();
        if *count > 0 {
            *count -= 1;
            return true;
        }
        false
    }

    /// Takes one resource, blocking for at most `timeout`.
    ///
    /// Returns `false` if the deadline passed with the count still at zero.
    /// [`Timeout::Infinite`] and durations too long to form a deadline behave
    /// like [`lock`](Self::lock).
    pub fn lock_timeout(&self, timeout: impl Into<Timeout>) -> bool {
        let timeout = timeout.into();
        let mut count = self.count();
        if *count > 0 {
            *count -= 1;
            return true;
        }

        let deadline = match timeout {
            Timeout::Infinite => None,
            // minstant converts through u64 nanoseconds; anything longer
            // cannot be represented as a deadline.
            Timeout::Duration(d) if d.as_nanos() <= u128::from(u64::MAX) => {
                Instant::now().checked_add(d)
            }
            Timeout::Duration(_) => None,
        };
        // A deadline past the clock's range is as good as no deadline.
        let Some(deadline) = deadline else {
            let mut count = self.wait_nonzero(count);
            *count -= 1;
            return true;
        };

        while *count == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .available
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            count = guard;
        }
        *count -= 1;
        true
    }

    /// Current number of available resources.
    ///
    /// This is a snapshot; the other side may change it before the caller acts.
    #[must_use]
    pub fn num_resources(&self) -> usize {
        *self.count()
    }

    #[must_use]
    pub const fn max_resources(&self) -> usize {
        self.max_resources
    }

    /// Snapshot: `true` when every resource is available.
    #[must_use]
    pub fn is_full(&self) -> bool {
        *self.count() == self.max_resources
    }

    /// Snapshot: `true` when no resource is available.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self.count() == 0
    }
}
