//! Bounded lock-free single-producer multi-consumer ring queue.
//!
//! Each priority lane of the mesh worker is one of these rings. The main
//! thread is the only producer; worker threads race to consume. Slots carry
//! sequence stamps: a producer may write a slot only when its stamp equals
//! the tail position, and a consumer that wins the head CAS owns the slot's
//! contents until it bumps the stamp past the wrap point. The stamps are
//! what make the ownership hand-off sound across a full ring wrap, where a
//! bare head/tail comparison would let the producer overwrite a slot a slow
//! consumer is still reading.
//!
//! Ordering: consumers claim strictly increasing head positions, so tasks
//! leave the ring in the order the producer committed them (FIFO). Which
//! worker wins a given position is whichever CAS lands first.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Slot<T> {
    sequence: AtomicUsize,
    value: UnsafeCell<Option<T>>,
}

/// A bounded SPMC queue with busy-wait-on-full producer semantics.
pub struct SpmcRing<T> {
    slots: Box<[Slot<T>]>,
    mask: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// The ring hands each value from exactly one producer to exactly one
// consumer; slots are never aliased thanks to the sequence protocol.
unsafe impl<T: Send> Send for SpmcRing<T> {}
unsafe impl<T: Send> Sync for SpmcRing<T> {}

impl<T> SpmcRing<T> {
    /// Creates a ring holding up to `capacity` values.
    ///
    /// # Panics
    /// Panics if `capacity` is not a power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "ring capacity must be a power of two");
        let slots = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(None),
            })
            .collect();
        Self {
            slots,
            mask: capacity - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Enqueues a value, yielding while the ring is full.
    ///
    /// Must only be called from one thread at a time; the owning
    /// [`MeshWorker`](super::MeshWorker) enforces this by requiring `&mut`
    /// access for submission.
    pub fn push(&self, value: T) {
        let tail = self.tail.load(Ordering::Relaxed);
        let slot = &self.slots[tail & self.mask];

        // Wait for the slot to be consumed if the ring has wrapped onto it.
        // Capacity is sized so this is rare.
        while slot.sequence.load(Ordering::Acquire) != tail {
            std::thread::yield_now();
        }

        unsafe { *slot.value.get() = Some(value) };
        slot.sequence.store(tail.wrapping_add(1), Ordering::Release);
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
    }

    /// Attempts to dequeue the next value.
    ///
    /// # Returns
    /// `None` when the ring is observed empty; lock-free otherwise.
    pub fn pop(&self) -> Option<T> {
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[head & self.mask];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let expected = head.wrapping_add(1);

            if sequence == expected {
                // Slot is filled and unclaimed; race for the position.
                match self.head.compare_exchange_weak(
                    head,
                    expected,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let value = unsafe { (*slot.value.get()).take() };
                        // Free the slot for the producer's next lap.
                        slot.sequence
                            .store(head.wrapping_add(self.mask + 1), Ordering::Release);
                        debug_assert!(value.is_some());
                        return value;
                    }
                    Err(current) => head = current,
                }
            } else if sequence == head {
                // Slot not yet produced: the ring is empty at our position.
                return None;
            } else {
                // Another consumer claimed this position; catch up.
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// `true` when no committed value remains unclaimed.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Number of committed values not yet claimed.
    pub fn len(&self) -> usize {
        self.tail
            .load(Ordering::Acquire)
            .wrapping_sub(self.head.load(Ordering::Acquire))
    }
}
