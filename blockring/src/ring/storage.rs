//! Slot storage and the per-side cursor logic shared by both endpoints.
//!
//! # Safety
//!
//! Slot bytes are reached through raw pointers into an `UnsafeCell` region.
//! Exclusive access to a slot comes from the semaphore protocol:
//!
//! - the producer may touch slot `writer_index` only while it holds a permit
//!   taken from `free`
//! - the consumer may touch slot `reader_index` only while it holds a permit
//!   taken from `filled`
//!
//! `free + filled + held permits == num_blocks`, so the two cursors can never
//! hold permits for the same slot at once.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::config::RingConfig;
use crate::sync::{BoundedSemaphore, Timeout};
use crate::trace::{debug, error, trace, warn};

use super::RingError;

/// Heap storage for all slots plus the two counting semaphores.
pub(crate) struct Storage {
    block_size_bytes: usize,
    num_blocks: usize,
    bytes: Box<[UnsafeCell<u8>]>,
    /// Slots the producer may fill. Starts full.
    pub(crate) free: BoundedSemaphore,
    /// Slots the consumer may read. Starts empty.
    pub(crate) filled: BoundedSemaphore,
}

// SAFETY: Storage is Sync because concurrent access to the slot bytes is
// mediated by the semaphore protocol described in the module docs, and the
// semaphores themselves are Sync.
unsafe impl Sync for Storage {}

impl Storage {
    /// Allocates zeroed storage for `config`.
    pub(crate) fn allocate(config: &RingConfig) -> Result<Self, RingError> {
        let total = config.validate()?;

        let mut bytes: Vec<UnsafeCell<u8>> = Vec::new();
        if bytes.try_reserve_exact(total).is_err() {
            error!(bytes = total, "slot storage allocation failed");
            return Err(RingError::Allocation { bytes: total });
        }
        bytes.resize_with(total, || UnsafeCell::new(0u8));

        let free = BoundedSemaphore::new(config.num_blocks, config.num_blocks)?;
        let filled = BoundedSemaphore::with_max(config.num_blocks);

        debug!(
            block_size_bytes = config.block_size_bytes,
            num_blocks = config.num_blocks,
            total_bytes = total,
            "ring storage allocated"
        );

        Ok(Self {
            block_size_bytes: config.block_size_bytes,
            num_blocks: config.num_blocks,
            bytes: bytes.into_boxed_slice(),
            free,
            filled,
        })
    }

    #[inline]
    pub(crate) const fn block_size_bytes(&self) -> usize {
        self.block_size_bytes
    }

    #[inline]
    pub(crate) const fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// Advances a cursor to the next slot index, wrapping to 0 at `num_blocks`.
    #[inline]
    pub(crate) const fn bump_cursor(&self, cursor: usize) -> usize {
        let next = cursor + 1;
        if next == self.num_blocks { 0 } else { next }
    }

    /// Pointer to the first byte of slot `index`.
    #[inline]
    fn block_ptr(&self, index: usize) -> NonNull<u8> {
        assert!(index < self.num_blocks, "slot index {index} out of range");
        // SAFETY: index < num_blocks, so the offset stays inside the
        // `block_size_bytes * num_blocks` allocation.
        let cell = unsafe { self.bytes.as_ptr().add(index * self.block_size_bytes) };
        // SAFETY: the pointer is derived from a live, non-empty boxed slice.
        unsafe { NonNull::new_unchecked(UnsafeCell::raw_get(cell)) }
    }
}

/// Which semaphore a side acquires from and which one it releases into.
pub(crate) trait Side {
    const NAME: &'static str;

    fn acquire_from(storage: &Storage) -> &BoundedSemaphore;

    fn release_to(storage: &Storage) -> &BoundedSemaphore;
}

/// Producer side: takes free slots, publishes filled ones.
pub(crate) struct WriteSide;

/// Consumer side: takes filled slots, returns free ones.
pub(crate) struct ReadSide;

impl Side for WriteSide {
    const NAME: &'static str = "producer";

    fn acquire_from(storage: &Storage) -> &BoundedSemaphore {
        &storage.free
    }

    fn release_to(storage: &Storage) -> &BoundedSemaphore {
        &storage.filled
    }
}

impl Side for ReadSide {
    const NAME: &'static str = "consumer";

    fn acquire_from(storage: &Storage) -> &BoundedSemaphore {
        &storage.filled
    }

    fn release_to(storage: &Storage) -> &BoundedSemaphore {
        &storage.free
    }
}

/// One side's position in the ring plus its outstanding-slot flag.
pub(crate) struct Cursor<S: Side> {
    storage: Arc<Storage>,
    index: usize,
    held: bool,
    _side: PhantomData<S>,
}

impl<S: Side> Cursor<S> {
    pub(crate) fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            index: 0,
            held: false,
            _side: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    #[inline]
    pub(crate) const fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub(crate) const fn is_held(&self) -> bool {
        self.held
    }

    /// Takes a permit for the current slot unless one is already held.
    pub(crate) fn acquire(&mut self) {
        if self.held {
            return;
        }
        let sem = S::acquire_from(&self.storage);
        if !sem.try_acquire() {
            trace!(side = S::NAME, index = self.index, "waiting for slot");
            sem.lock();
        }
        self.held = true;
    }

    /// Non-blocking [`acquire`](Self::acquire). Returns whether a permit is held.
    pub(crate) fn try_acquire(&mut self) -> bool {
        if !self.held && S::acquire_from(&self.storage).try_acquire() {
            self.held = true;
        }
        self.held
    }

    /// Bounded-wait [`acquire`](Self::acquire). Returns whether a permit is held.
    pub(crate) fn acquire_timeout(&mut self, timeout: Timeout) -> bool {
        if !self.held && S::acquire_from(&self.storage).lock_timeout(timeout) {
            self.held = true;
        }
        self.held
    }

    /// Hands the current slot to the other side and moves to the next one.
    ///
    /// Returns `false` without touching any state if no permit is held.
    pub(crate) fn release(&mut self) -> bool {
        if !self.held {
            warn!(side = S::NAME, index = self.index, "release without a held slot");
            return false;
        }
        self.held = false;
        self.index = self.storage.bump_cursor(self.index);
        let handed_over = S::release_to(&self.storage).unlock_one();
        debug_assert!(handed_over, "{} released past ring capacity", S::NAME);
        true
    }

    /// Pointer and length of the current slot.
    ///
    /// Dereferencing is only sound while [`is_held`](Self::is_held) is true.
    #[inline]
    pub(crate) fn block(&self) -> (NonNull<u8>, usize) {
        (
            self.storage.block_ptr(self.index),
            self.storage.block_size_bytes,
        )
    }
}
