//! Zero-copy SPSC ring of fixed-size byte slots.
//!
//! [`create`] allocates `num_blocks` slots of `block_size_bytes` each and
//! returns the only [`Producer`] and [`Consumer`] for them. Both sides work in
//! place on the ring's storage: the producer acquires a free slot, writes into
//! it and releases it to the consumer, which acquires it, reads it and
//! releases it back.
//!
//! # Overview
//!
//! - [`Producer`] - Write end, hands out [`WriteSlot`]s
//! - [`Consumer`] - Read end, hands out [`ReadSlot`]s
//! - Blocking, non-blocking and timed acquires on both ends
//!
//! Two [`BoundedSemaphore`](crate::sync::BoundedSemaphore)s carry the slot
//! counts: `free` starts at `num_blocks`, `filled` at zero. Each release moves
//! one permit from one semaphore to the other, so slots are consumed in the
//! order they were published and the producer never runs more than
//! `num_blocks` slots ahead of the consumer.
//!
//! # Example
//!
//! ```
//! let (mut producer, mut consumer) = blockring::create(8, 4).unwrap();
//!
//! let mut slot = producer.acquire();
//! slot[..5].copy_from_slice(b"hello");
//! slot.release();
//!
//! let slot = consumer.try_acquire().expect("slot was published");
//! assert_eq!(&slot[..5], b"hello");
//! slot.release();
//!
//! assert!(consumer.try_acquire().is_none());
//! ```
//!
//! # Thread Safety
//!
//! [`Producer`] and [`Consumer`] are [`Send`] but **not** [`Sync`] or
//! [`Clone`], and every slot operation takes `&mut self`. Exactly one thread
//! drives each side at a time.
//!
//! # Held slots
//!
//! Acquiring marks the side's current slot as held. Dropping a slot handle
//! without releasing it leaves the slot held: the next acquire returns the
//! same slot without waiting, and [`Producer::release`] /
//! [`Consumer::release`] can publish it later.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;

use crate::config::RingConfig;
use crate::sync::{SemaphoreError, Timeout};
use crate::trace::info;

mod slot;
mod storage;

pub use slot::{ReadSlot, WriteSlot};

use storage::{Cursor, ReadSide, Storage, WriteSide};

/// Errors creating a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    /// `block_size_bytes` was zero.
    #[error("block size must be non-zero")]
    ZeroBlockSize,
    /// `num_blocks` was zero.
    #[error("block count must be non-zero")]
    ZeroBlocks,
    /// `block_size_bytes * num_blocks` does not fit in `usize`.
    #[error("{num_blocks} blocks of {block_size_bytes} bytes overflow the address space")]
    CapacityOverflow {
        block_size_bytes: usize,
        num_blocks: usize,
    },
    /// The allocator could not provide the slot storage.
    #[error("failed to allocate {bytes} bytes of slot storage")]
    Allocation { bytes: usize },
    /// A slot-count semaphore rejected its initial count.
    #[error("semaphore error: {0}")]
    Semaphore(#[from] SemaphoreError),
}

/// Marker type to opt-out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Write end of the ring.
///
/// Only one producer exists per ring. It is [`Send`] so it can move to the
/// producing thread, but not [`Sync`].
pub struct Producer {
    cursor: Cursor<WriteSide>,
    _unsync: PhantomUnsync,
}

/// Read end of the ring.
///
/// Only one consumer exists per ring. See [`Producer`] for thread safety.
pub struct Consumer {
    cursor: Cursor<ReadSide>,
    _unsync: PhantomUnsync,
}

/// Creates a ring of `num_blocks` zeroed slots, each `block_size_bytes` long.
///
/// Returns the ring's `(Producer, Consumer)` pair. The storage is freed when
/// both endpoints have been dropped.
///
/// # Errors
///
/// Returns [`RingError`] if either dimension is zero, the total size overflows,
/// or the storage cannot be allocated.
///
/// # Example
///
/// ```
/// use blockring::RingError;
///
/// let (producer, consumer) = blockring::create(1024, 100).unwrap();
/// assert_eq!(producer.block_size_bytes(), 1024);
/// assert_eq!(consumer.num_blocks(), 100);
///
/// assert_eq!(blockring::create(0, 4).err(), Some(RingError::ZeroBlockSize));
/// ```
pub fn create(block_size_bytes: usize, num_blocks: usize) -> Result<(Producer, Consumer), RingError> {
    create_with(&RingConfig::new(block_size_bytes, num_blocks))
}

/// Creates a ring with the geometry in `config`.
///
/// # Errors
///
/// See [`create`].
pub fn create_with(config: &RingConfig) -> Result<(Producer, Consumer), RingError> {
    let storage = Arc::new(Storage::allocate(config)?);

    let producer = Producer {
        cursor: Cursor::new(Arc::clone(&storage)),
        _unsync: PhantomData,
    };

    let consumer = Consumer {
        cursor: Cursor::new(storage),
        _unsync: PhantomData,
    };

    info!(
        block_size_bytes = config.block_size_bytes,
        num_blocks = config.num_blocks,
        "ring created"
    );

    Ok((producer, consumer))
}

impl Producer {
    /// Acquires the next free slot, blocking until the consumer frees one.
    ///
    /// If the current slot is already held, returns it again without waiting.
    /// The write position only advances on release.
    pub fn acquire(&mut self) -> WriteSlot<'_> {
        self.cursor.acquire();
        // SAFETY: acquire() returns with a permit held.
        unsafe { WriteSlot::new(&mut self.cursor) }
    }

    /// Acquires the next free slot without blocking.
    ///
    /// Returns `None` if every slot is waiting to be read.
    pub fn try_acquire(&mut self) -> Option<WriteSlot<'_>> {
        if !self.cursor.try_acquire() {
            return None;
        }
        // SAFETY: try_acquire() returned true, so a permit is held.
        Some(unsafe { WriteSlot::new(&mut self.cursor) })
    }

    /// Acquires the next free slot, waiting at most `timeout`.
    ///
    /// Returns `None` if no slot was freed in time.
    pub fn acquire_timeout(&mut self, timeout: impl Into<Timeout>) -> Option<WriteSlot<'_>> {
        if !self.cursor.acquire_timeout(timeout.into()) {
            return None;
        }
        // SAFETY: acquire_timeout() returned true, so a permit is held.
        Some(unsafe { WriteSlot::new(&mut self.cursor) })
    }

    /// Publishes a slot whose handle was dropped without releasing it.
    ///
    /// Returns `false`, changing nothing, if no slot is held.
    pub fn release(&mut self) -> bool {
        self.cursor.release()
    }

    /// Returns `true` while a slot is acquired and not yet released.
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.cursor.is_held()
    }

    /// Index of the slot the next acquire returns.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.cursor.index()
    }

    /// Size of every slot in bytes.
    #[must_use]
    pub fn block_size_bytes(&self) -> usize {
        self.cursor.storage().block_size_bytes()
    }

    /// Number of slots in the ring.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.cursor.storage().num_blocks()
    }

    /// Snapshot of slots the producer can still acquire.
    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.cursor.storage().free.num_resources()
    }

    /// Snapshot of published slots the consumer has not acquired yet.
    #[must_use]
    pub fn filled_blocks(&self) -> usize {
        self.cursor.storage().filled.num_resources()
    }
}

impl Consumer {
    /// Acquires the next published slot, blocking until the producer fills one.
    ///
    /// If the current slot is already held, returns it again without waiting.
    /// The read position only advances on release.
    pub fn acquire(&mut self) -> ReadSlot<'_> {
        self.cursor.acquire();
        // SAFETY: acquire() returns with a permit held.
        unsafe { ReadSlot::new(&mut self.cursor) }
    }

    /// Acquires the next published slot without blocking.
    ///
    /// Returns `None` if nothing has been published.
    pub fn try_acquire(&mut self) -> Option<ReadSlot<'_>> {
        if !self.cursor.try_acquire() {
            return None;
        }
        // SAFETY: try_acquire() returned true, so a permit is held.
        Some(unsafe { ReadSlot::new(&mut self.cursor) })
    }

    /// Acquires the next published slot, waiting at most `timeout`.
    ///
    /// Returns `None` if nothing was published in time.
    pub fn acquire_timeout(&mut self, timeout: impl Into<Timeout>) -> Option<ReadSlot<'_>> {
        if !self.cursor.acquire_timeout(timeout.into()) {
            return None;
        }
        // SAFETY: acquire_timeout() returned true, so a permit is held.
        Some(unsafe { ReadSlot::new(&mut self.cursor) })
    }

    /// Frees a slot whose handle was dropped without releasing it.
    ///
    /// Returns `false`, changing nothing, if no slot is held.
    pub fn release(&mut self) -> bool {
        self.cursor.release()
    }

    /// Returns `true` while a slot is acquired and not yet released.
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.cursor.is_held()
    }

    /// Index of the slot the next acquire returns.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.cursor.index()
    }

    /// Size of every slot in bytes.
    #[must_use]
    pub fn block_size_bytes(&self) -> usize {
        self.cursor.storage().block_size_bytes()
    }

    /// Number of slots in the ring.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.cursor.storage().num_blocks()
    }

    /// Snapshot of published slots still waiting to be acquired.
    #[must_use]
    pub fn filled_blocks(&self) -> usize {
        self.cursor.storage().filled.num_resources()
    }

    /// Snapshot of slots the producer can still acquire.
    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.cursor.storage().free.num_resources()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn write_str(producer: &mut Producer, text: &str) {
        let mut slot = producer.acquire();
        slot[..text.len()].copy_from_slice(text.as_bytes());
        slot.release();
    }

    fn read_prefix(slot: &[u8], len: usize) -> &str {
        std::str::from_utf8(&slot[..len]).unwrap()
    }

    #[test]
    fn test_create_reports_geometry() {
        let (producer, consumer) = create(1024, 100).unwrap();
        assert_eq!(producer.block_size_bytes(), 1024);
        assert_eq!(producer.num_blocks(), 100);
        assert_eq!(consumer.block_size_bytes(), 1024);
        assert_eq!(consumer.num_blocks(), 100);
        assert_eq!(producer.free_blocks(), 100);
        assert_eq!(consumer.filled_blocks(), 0);
    }

    #[test]
    fn test_create_rejects_bad_geometry() {
        assert_eq!(create(0, 1).err(), Some(RingError::ZeroBlockSize));
        assert_eq!(create(1, 0).err(), Some(RingError::ZeroBlocks));
        assert!(matches!(
            create(usize::MAX, 2).err(),
            Some(RingError::CapacityOverflow { .. })
        ));
    }

    #[test]
    fn test_slots_start_zeroed_and_sized() {
        let (mut producer, _consumer) = create(16, 2).unwrap();
        let slot = producer.acquire();
        assert_eq!(slot.len(), 16);
        assert!(slot.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fifo_two_slots() {
        let (mut producer, mut consumer) = create(2, 2).unwrap();

        write_str(&mut producer, "A");
        write_str(&mut producer, "B");

        let slot = consumer.acquire();
        assert_eq!(read_prefix(&slot, 1), "A");
        drop(slot);

        // Still held: acquiring again yields the same slot.
        let slot = consumer.acquire();
        assert_eq!(slot.index(), 0);
        assert_eq!(read_prefix(&slot, 1), "A");
        slot.release();

        let slot = consumer.acquire();
        assert_eq!(read_prefix(&slot, 1), "B");
        slot.release();
    }

    #[test]
    fn test_single_slot_rewrite_before_release() {
        let (mut producer, mut consumer) = create(2, 1).unwrap();

        let mut slot = producer.acquire();
        slot[0] = b'A';
        drop(slot);

        let mut slot = producer.acquire();
        assert_eq!(slot[0], b'A');
        slot[0] = b'B';
        slot.release();

        // The only slot is now unread, so the producer must wait.
        assert!(producer.try_acquire().is_none());

        let slot = consumer.acquire();
        assert_eq!(slot[0], b'B');
        slot.release();

        assert!(producer.try_acquire().is_some());
    }

    #[test]
    fn test_try_acquire_empty_and_full() {
        let (mut producer, mut consumer) = create(2, 2).unwrap();

        assert!(consumer.try_acquire().is_none());
        assert!(!consumer.is_held());

        producer.try_acquire().unwrap().release();
        producer.try_acquire().unwrap().release();
        assert!(producer.try_acquire().is_none());
        assert!(!producer.is_held());
        assert_eq!(producer.free_blocks(), 0);
        assert_eq!(consumer.filled_blocks(), 2);
    }

    #[test]
    fn test_capacity_bounds_outstanding_writes() {
        let (mut producer, mut consumer) = create(4, 3).unwrap();

        for expected in 0..3 {
            let slot = producer.try_acquire().expect("slot available");
            assert_eq!(slot.index(), expected);
            slot.release();
        }
        assert!(producer.try_acquire().is_none());

        consumer.acquire().release();
        let slot = producer.try_acquire().expect("slot freed by consumer");
        assert_eq!(slot.index(), 0);
    }

    #[test]
    fn test_release_without_acquire_is_rejected() {
        let (mut producer, mut consumer) = create(4, 2).unwrap();

        for _ in 0..5 {
            assert!(!producer.release());
            assert!(!consumer.release());
        }
        assert_eq!(producer.position(), 0);
        assert_eq!(consumer.position(), 0);
        assert_eq!(producer.free_blocks(), 2);
        assert_eq!(consumer.filled_blocks(), 0);

        write_str(&mut producer, "x");
        assert!(!producer.release());
        assert_eq!(consumer.filled_blocks(), 1);
        assert_eq!(producer.position(), 1);
    }

    #[test]
    fn test_endpoint_release_publishes_dropped_handle() {
        let (mut producer, mut consumer) = create(4, 2).unwrap();

        let mut slot = producer.acquire();
        slot[0] = 7;
        drop(slot);
        assert!(producer.is_held());
        assert_eq!(consumer.filled_blocks(), 0);

        assert!(producer.release());
        assert!(!producer.is_held());
        assert!(!producer.release());

        let slot = consumer.try_acquire().unwrap();
        assert_eq!(slot[0], 7);
        drop(slot);
        assert!(consumer.release());
        assert!(!consumer.release());
        assert_eq!(producer.free_blocks(), 2);
    }

    #[test]
    fn test_repeated_acquire_returns_same_slot() {
        let (mut producer, _consumer) = create(4, 4).unwrap();

        for _ in 0..5 {
            let slot = producer.acquire();
            assert_eq!(slot.index(), 0);
        }
        assert_eq!(producer.free_blocks(), 3);

        assert!(producer.try_acquire().is_some());
        assert!(producer.acquire_timeout(Duration::ZERO).is_some());
        assert_eq!(producer.free_blocks(), 3);
    }

    #[test]
    fn test_indices_wrap_around() {
        let (mut producer, mut consumer) = create(1, 3).unwrap();

        for value in 0..10u8 {
            let mut slot = producer.acquire();
            assert_eq!(slot.index(), usize::from(value) % 3);
            slot[0] = value;
            slot.release();

            let slot = consumer.acquire();
            assert_eq!(slot.index(), usize::from(value) % 3);
            assert_eq!(slot[0], value);
            slot.release();
        }
    }

    #[test]
    fn test_acquire_timeout_expires() {
        let (mut producer, mut consumer) = create(1, 1).unwrap();

        assert!(consumer.acquire_timeout(Duration::from_millis(10)).is_none());

        producer.acquire().release();
        assert!(producer.acquire_timeout(Duration::from_millis(10)).is_none());

        let slot = consumer
            .acquire_timeout(Timeout::Infinite)
            .expect("published slot");
        slot.release();
    }

    #[test]
    fn test_acquire_timeout_accepts_unbounded_durations() {
        let (mut producer, mut consumer) = create(4, 2).unwrap();

        let mut slot = producer.acquire_timeout(Duration::MAX).expect("free slot");
        slot[0] = 9;
        slot.release();

        let slot = consumer
            .acquire_timeout(Duration::MAX)
            .expect("published slot");
        assert_eq!(slot[0], 9);
        slot.release();

        let reader = thread::spawn(move || {
            let slot = consumer
                .acquire_timeout(Duration::from_secs(u64::MAX))
                .expect("waits until published");
            let value = slot[0];
            slot.release();
            value
        });

        thread::sleep(Duration::from_millis(20));
        let mut slot = producer.acquire();
        slot[0] = 10;
        slot.release();
        assert_eq!(reader.join().unwrap(), 10);
    }

    #[test]
    fn test_blocking_acquire_waits_for_counterpart() {
        let (mut producer, mut consumer) = create(8, 1).unwrap();

        let reader = thread::spawn(move || {
            let slot = consumer.acquire();
            let value = slot[0];
            slot.release();
            value
        });

        thread::sleep(Duration::from_millis(20));
        let mut slot = producer.acquire();
        slot[0] = 42;
        slot.release();

        assert_eq!(reader.join().unwrap(), 42);
    }

    #[test]
    fn test_endpoint_outlives_peer() {
        let (mut producer, consumer) = create(4, 2).unwrap();
        drop(consumer);

        producer.acquire().release();
        producer.acquire().release();
        assert!(producer.try_acquire().is_none());
    }

    #[test]
    fn test_endpoints_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Producer>();
        assert_send::<Consumer>();
    }
}
