//! Lock-free SPSC ring buffer
//!
//! [`RingBuffer::new`] hands out exactly one [`Producer`] and one [`Consumer`].
//! Neither handle is `Clone` and both methods take `&mut self`, so the
//! single-writer/single-reader rule is enforced by ownership: move the
//! producer into the audio callback, keep the consumer on the control thread.
//!
//! Cursors increase monotonically (wrapping) and are reduced with a bitmask,
//! which is why the capacity must be a power of two. `write - read` is always
//! within `0..=N`.
//!
//! Memory ordering: each side owns one cursor. It reads its own cursor
//! relaxed, reads the other side's cursor with `Acquire`, and publishes its
//! own with `Release` after touching the slot. The release on `write`
//! publishes the slot contents to the consumer; the release on `read` tells
//! the producer the slot may be overwritten.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Keeps each cursor on its own cache line so producer and consumer don't
/// false-share.
#[repr(align(64))]
struct CachePadded<T>(T);

impl<T> Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// Shared storage behind a [`Producer`]/[`Consumer`] pair.
pub struct RingBuffer<T, const N: usize> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    write: CachePadded<AtomicUsize>,
    read: CachePadded<AtomicUsize>,
}

// SAFETY: slots are only accessed through the unique Producer (writes to
// unpublished slots) and the unique Consumer (reads of published slots); the
// cursor protocol guarantees they never touch the same slot at once.
unsafe impl<T: Send, const N: usize> Sync for RingBuffer<T, N> {}
unsafe impl<T: Send, const N: usize> Send for RingBuffer<T, N> {}

impl<T, const N: usize> RingBuffer<T, N> {
    const MASK: usize = {
        assert!(N.is_power_of_two(), "ring capacity must be a power of two");
        N - 1
    };

    /// Allocate the ring and split it. This is the only allocation.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Producer<T, N>, Consumer<T, N>) {
        let _ = Self::MASK;
        let slots = (0..N)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let ring = Arc::new(Self {
            slots,
            write: CachePadded(AtomicUsize::new(0)),
            read: CachePadded(AtomicUsize::new(0)),
        });
        (
            Producer {
                ring: Arc::clone(&ring),
            },
            Consumer { ring },
        )
    }

    pub const fn capacity() -> usize {
        N
    }

    /// Snapshot of the number of queued items. Under concurrent use the
    /// value may be stale by the time it is returned.
    fn size(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        write.wrapping_sub(read).min(N)
    }

    fn slot(&self, cursor: usize) -> *mut MaybeUninit<T> {
        self.slots[cursor & Self::MASK].get()
    }
}

impl<T, const N: usize> Drop for RingBuffer<T, N> {
    fn drop(&mut self) {
        let mut read = *self.read.0.get_mut();
        let write = *self.write.0.get_mut();
        while read != write {
            // SAFETY: slots in read..write were initialised by the producer
            // and never consumed; both handles are gone so access is exclusive.
            unsafe { (*self.slot(read)).assume_init_drop() };
            read = read.wrapping_add(1);
        }
    }
}

/// Writing half. Only one exists per ring.
pub struct Producer<T, const N: usize> {
    ring: Arc<RingBuffer<T, N>>,
}

impl<T, const N: usize> Producer<T, N> {
    /// Enqueue `item`, or hand it back if the ring is full.
    ///
    /// A full ring is the only backpressure signal; the caller decides
    /// whether to drop or retry.
    pub fn try_push(&mut self, item: T) -> Result<(), T> {
        let write = self.ring.write.load(Ordering::Relaxed);
        let read = self.ring.read.load(Ordering::Acquire);
        if write.wrapping_sub(read) == N {
            return Err(item);
        }
        // SAFETY: the slot is outside read..write, so the consumer will not
        // look at it until the store below publishes it.
        unsafe { (*self.ring.slot(write)).write(item) };
        self.ring
            .write
            .store(write.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Best-effort snapshot of queued items; may be stale immediately.
    pub fn size(&self) -> usize {
        self.ring.size()
    }

    /// Best-effort: the consumer may pop at any moment.
    pub fn is_full(&self) -> bool {
        self.ring.size() == N
    }

    pub fn is_empty(&self) -> bool {
        self.ring.size() == 0
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// True once the consumer has been dropped.
    pub fn is_abandoned(&self) -> bool {
        Arc::strong_count(&self.ring) == 1
    }
}

/// Reading half. Only one exists per ring.
pub struct Consumer<T, const N: usize> {
    ring: Arc<RingBuffer<T, N>>,
}

impl<T, const N: usize> Consumer<T, N> {
    /// Dequeue the oldest item. Items come out in push order.
    pub fn try_pop(&mut self) -> Option<T> {
        let read = self.ring.read.load(Ordering::Relaxed);
        let write = self.ring.write.load(Ordering::Acquire);
        if read == write {
            return None;
        }
        // SAFETY: the slot is inside read..write, initialised by the producer
        // and published by its release store, which the acquire above observed.
        let item = unsafe { (*self.ring.slot(read)).assume_init_read() };
        self.ring.read.store(read.wrapping_add(1), Ordering::Release);
        Some(item)
    }

    /// Look at the oldest item without removing it.
    pub fn peek(&self) -> Option<&T> {
        let read = self.ring.read.load(Ordering::Relaxed);
        let write = self.ring.write.load(Ordering::Acquire);
        if read == write {
            return None;
        }
        // SAFETY: as in try_pop; the slot stays valid until this consumer
        // advances `read`, which needs &mut self.
        Some(unsafe { (*self.ring.slot(read)).assume_init_ref() })
    }

    /// Best-effort snapshot of queued items; may be stale immediately.
    pub fn size(&self) -> usize {
        self.ring.size()
    }

    /// Best-effort: the producer may push at any moment.
    pub fn is_empty(&self) -> bool {
        self.ring.size() == 0
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// True once the producer has been dropped.
    pub fn is_abandoned(&self) -> bool {
        Arc::strong_count(&self.ring) == 1
    }
}

impl<T, const N: usize> Iterator for Consumer<T, N> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.try_pop()
    }
}
