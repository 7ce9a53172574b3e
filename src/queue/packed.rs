//! Packed-form MPMC queue
//!
//! The high-throughput backing store: every ring slot is a single 128-bit
//! atomic word holding the slot's epoch in the high half and its value in the
//! low half (see [`codec`](crate::queue::codec)). A push or pop replaces the
//! whole word with one compare-and-swap, so the hot path performs no heap
//! allocation and there is nothing to reclaim.
//!
//! The payload domain is [`NonZeroU64`]: zero is the reserved "slot is empty"
//! sentinel, and the type system keeps it out of the API instead of a runtime
//! check. Pointer-sized handles (connection ids, indices, tagged pointers)
//! fit this shape naturally; anything wider belongs in
//! [`MpmcQueue`](crate::queue::MpmcQueue).
//!
//! ## Epoch scheme
//!
//! Slot `i` starts empty at epoch `i`. A push at cursor `t` requires the slot
//! (`t % capacity`) to be empty at exactly epoch `t` and installs
//! `(t + capacity, value)`; a pop at cursor `h` requires the slot to be
//! occupied at exactly epoch `h + capacity` and installs
//! `(h + capacity, EMPTY)`. One full reuse cycle therefore advances the slot
//! epoch by exactly one lap, every (slot, epoch) pair is unique over the life
//! of the queue, and a thread acting on a stale cursor snapshot can tell from
//! the epoch alone that it must retry — the ABA hazard cannot bite.
//!
//! ## Example
//!
//! ```rust
//! use cycleq::queue::PackedQueue;
//! use core::num::NonZeroU64;
//!
//! let queue = PackedQueue::new(8)?;
//! queue.push(NonZeroU64::new(7).unwrap())?;
//! assert_eq!(queue.pop()?.get(), 7);
//! # Ok::<(), cycleq::Error>(())
//! ```

use crate::queue::{codec, DEFAULT_BACKOFF};
use crate::util::{Backoff, CachePadded};
use crate::{Error, Result};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::num::NonZeroU64;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use portable_atomic::AtomicU128;

/// A lock-free bounded MPMC queue over 64-bit handles.
///
/// Each slot is one [`AtomicU128`] carrying `(epoch, value)`; both halves are
/// always replaced together, so a torn cell is unobservable. `Full` and
/// `Empty` are terminal results returned without mutation; only CAS races and
/// epoch staleness retry internally, paced by the configured backoff.
///
/// All atomics use `SeqCst`, so callers need no extra memory-barrier
/// reasoning: once a cursor is observed advanced, the corresponding cell
/// content is visible.
#[derive(Debug)]
pub struct PackedQueue {
    // One packed (epoch, value) word per slot
    slots: Box<[CachePadded<AtomicU128>]>,

    // Ring size; slot index for cursor c is c % capacity
    capacity: u64,

    // Next logical position to pop, padded away from tail
    head: CachePadded<AtomicU64>,

    // Next logical position to push, padded away from head
    tail: CachePadded<AtomicU64>,

    // Sleep interval once a contended operation exhausts its spin budget
    backoff: Duration,

    // Retries observed across all operations, for observability only
    contended: CachePadded<AtomicU64>,
}

impl PackedQueue {
    /// Create a queue with the default backoff interval.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_backoff(capacity, DEFAULT_BACKOFF)
    }

    /// Create a queue that sleeps `backoff` between contended retries.
    ///
    /// A zero interval degrades to yielding the scheduler after the spin
    /// budget, which is still bounded retry, never an unbounded spin.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidCapacity`] when `capacity` is zero.
    pub fn with_backoff(capacity: usize, backoff: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity);
        }

        // Slot i starts empty, one lap away from its first push at cursor i
        let slots: Vec<CachePadded<AtomicU128>> = (0..capacity)
            .map(|i| CachePadded::new(AtomicU128::new(codec::pack(i as u64, codec::EMPTY))))
            .collect();

        Ok(Self {
            slots: slots.into_boxed_slice(),
            capacity: capacity as u64,
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            backoff,
            contended: CachePadded::new(AtomicU64::new(0)),
        })
    }

    /// Push a handle onto the queue.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Full`] when the queue holds `capacity` values; the
    /// queue is left untouched and the condition is reported immediately,
    /// never retried internally.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cycleq::queue::PackedQueue;
    /// use core::num::NonZeroU64;
    ///
    /// let queue = PackedQueue::new(1)?;
    /// let v = NonZeroU64::new(9).unwrap();
    /// assert!(queue.push(v).is_ok());
    /// assert_eq!(queue.push(v), Err(cycleq::Error::Full));
    /// # Ok::<(), cycleq::Error>(())
    /// ```
    pub fn push(&self, value: NonZeroU64) -> Result<()> {
        let mut backoff = Backoff::new(self.backoff);

        loop {
            let tail = self.tail.load(Ordering::SeqCst);
            let slot = &self.slots[(tail % self.capacity) as usize];
            let observed = slot.load(Ordering::SeqCst);
            let (epoch, stored) = codec::unpack(observed);

            if epoch == tail {
                if stored != codec::EMPTY {
                    // The value pushed one lap ago (it installed this epoch)
                    // was never consumed: the ring is full.
                    return Err(Error::Full);
                }

                let replacement = codec::pack(tail.wrapping_add(self.capacity), value.get());
                if slot
                    .compare_exchange(observed, replacement, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    // Only the CAS winner for cursor `tail` advances it.
                    let _ = self.tail.compare_exchange(
                        tail,
                        tail.wrapping_add(1),
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    );
                    return Ok(());
                }
            }

            // Lost the CAS or the cursor snapshot went stale; pace the retry.
            self.contended.fetch_add(1, Ordering::Relaxed);
            backoff.snooze();
        }
    }

    /// Pop the oldest handle from the queue.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Empty`] when no value is queued; repeated calls on
    /// an empty queue have no observable side effect.
    pub fn pop(&self) -> Result<NonZeroU64> {
        let mut backoff = Backoff::new(self.backoff);

        loop {
            let head = self.head.load(Ordering::SeqCst);
            let slot = &self.slots[(head % self.capacity) as usize];
            let observed = slot.load(Ordering::SeqCst);
            let (epoch, stored) = codec::unpack(observed);
            let vacated = head.wrapping_add(self.capacity);

            if epoch == vacated {
                if let Some(value) = NonZeroU64::new(stored) {
                    let replacement = codec::pack(vacated, codec::EMPTY);
                    if slot
                        .compare_exchange(
                            observed,
                            replacement,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        )
                        .is_ok()
                    {
                        let _ = self.head.compare_exchange(
                            head,
                            head.wrapping_add(1),
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        );
                        return Ok(value);
                    }
                }
                // Empty cell already at the vacated epoch: a racing consumer
                // finished this lap first and our head snapshot is stale.
            } else if epoch == head && stored == codec::EMPTY {
                // The push for this lap has not committed, so no undelivered
                // value can exist at this position.
                return Err(Error::Empty);
            }

            self.contended.fetch_add(1, Ordering::Relaxed);
            backoff.snooze();
        }
    }

    /// Approximate number of queued values.
    ///
    /// Exact when the queue is quiescent; may lag by in-flight operations
    /// under contention.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::SeqCst);
        let tail = self.tail.load(Ordering::SeqCst);
        tail.wrapping_sub(head).min(self.capacity) as usize
    }

    /// Whether the queue currently appears empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of values the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Total CAS retries paid across all operations so far.
    #[inline]
    pub fn contention_events(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }
}
