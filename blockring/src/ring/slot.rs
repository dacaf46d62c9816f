//! Borrowed views of a single held slot.
//!
//! A slot handle mutably borrows its endpoint, so while it is alive the
//! endpoint cannot hand out a second handle or release the slot behind its
//! back. Releasing through the handle consumes it:
//!
//! ```compile_fail
//! let (mut producer, _consumer) = blockring::create(4, 2).unwrap();
//! let slot = producer.acquire();
//! slot.release();
//! slot.release(); // use of moved value
//! ```
//!
//! The slot bytes cannot outlive the handle either:
//!
//! ```compile_fail
//! let (mut producer, _consumer) = blockring::create(4, 2).unwrap();
//! let bytes: &mut [u8] = {
//!     let mut slot = producer.acquire();
//!     &mut slot[..]
//! };
//! bytes[0] = 1;
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;

use super::storage::{Cursor, ReadSide, WriteSide};

/// Exclusive, writable view of the producer's current slot.
///
/// Dereferences to a `[u8]` of exactly `block_size_bytes`. Call
/// [`release`](Self::release) to publish the slot to the consumer; dropping
/// the handle instead keeps the slot held, and the next acquire on the
/// producer returns this same slot.
pub struct WriteSlot<'a> {
    cursor: &'a mut Cursor<WriteSide>,
    ptr: NonNull<u8>,
    len: usize,
}

impl<'a> WriteSlot<'a> {
    /// # Safety
    ///
    /// `cursor` must hold a permit for its current slot.
    pub(super) unsafe fn new(cursor: &'a mut Cursor<WriteSide>) -> Self {
        debug_assert!(cursor.is_held());
        let (ptr, len) = cursor.block();
        Self { cursor, ptr, len }
    }

    /// Position of this slot in the ring.
    #[must_use]
    pub fn index(&self) -> usize {
        self.cursor.index()
    }

    /// Publishes the slot to the consumer and advances the producer.
    pub fn release(self) {
        let released = self.cursor.release();
        debug_assert!(released, "write slot handle without a held permit");
    }
}

// Slices are only formed for the duration of a borrow of the handle, never
// stored, so none is alive once `release` hands the slot to the consumer.

impl Deref for WriteSlot<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: The held permit came from the free-slot semaphore, so the
        // consumer cannot reach this slot until release.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for WriteSlot<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: As in `deref`; `&mut self` rules out any other view of the
        // slot through this handle, and the handle is the only one.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl fmt::Debug for WriteSlot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSlot")
            .field("index", &self.index())
            .field("len", &self.len)
            .finish()
    }
}

/// Exclusive, read-only view of the consumer's current slot.
///
/// The bytes stay stable until [`release`](Self::release) returns the slot to
/// the producer. Dropping the handle keeps the slot held.
pub struct ReadSlot<'a> {
    cursor: &'a mut Cursor<ReadSide>,
    ptr: NonNull<u8>,
    len: usize,
}

impl<'a> ReadSlot<'a> {
    /// # Safety
    ///
    /// `cursor` must hold a permit for its current slot.
    pub(super) unsafe fn new(cursor: &'a mut Cursor<ReadSide>) -> Self {
        debug_assert!(cursor.is_held());
        let (ptr, len) = cursor.block();
        Self { cursor, ptr, len }
    }

    /// Position of this slot in the ring.
    #[must_use]
    pub fn index(&self) -> usize {
        self.cursor.index()
    }

    /// Returns the slot to the producer and advances the consumer.
    pub fn release(self) {
        let released = self.cursor.release();
        debug_assert!(released, "read slot handle without a held permit");
    }
}

impl Deref for ReadSlot<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: The held permit came from the filled-slot semaphore, whose
        // mutex orders the producer's writes before this read. The producer
        // cannot reuse the slot until the permit returns to the free side.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr().cast_const(), self.len) }
    }
}

impl fmt::Debug for ReadSlot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadSlot")
            .field("index", &self.index())
            .field("len", &self.len)
            .finish()
    }
}
