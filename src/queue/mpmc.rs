//! Boxed-form MPMC queue
//!
//! The generic backing store: every ring slot owns a heap-allocated node
//! `{epoch, value}` behind a [`crossbeam_epoch::Atomic`] pointer, and a push
//! or pop replaces the node wholesale with one pointer CAS. This buys
//! arbitrary element types at the price of one allocation per push; handles
//! that fit 64 bits should use [`PackedQueue`](crate::queue::PackedQueue)
//! instead.
//!
//! ## Safe reclamation
//!
//! A thread that loses a CAS race may still hold a reference to the node the
//! winner just superseded. Superseded nodes are therefore retired through an
//! epoch guard (`defer_destroy`) and freed only once every thread pinned at
//! the time has moved on — a loser can never observe freed memory. The value
//! inside a node sits in [`ManuallyDrop`] so the one pop that wins the CAS
//! moves it out exactly once and the deferred destruction frees only the
//! node's memory.
//!
//! ## Epoch scheme
//!
//! Identical to the packed form: slot `i` starts empty at epoch `i`; a push
//! at cursor `t` requires an empty node at exactly epoch `t` and installs an
//! occupied node at `t + capacity`; a pop at cursor `h` requires an occupied
//! node at exactly epoch `h + capacity` and installs an empty node at that
//! same epoch. Cursors only increase, and an unexpected epoch means the
//! cursor snapshot is stale — retry, never overwrite.
//!
//! ## Example
//!
//! ```rust
//! use cycleq::queue::MpmcQueue;
//!
//! let queue: MpmcQueue<String> = MpmcQueue::new(4)?;
//! queue.push("reusable".to_string())?;
//! assert_eq!(queue.pop()?, "reusable");
//! assert_eq!(queue.pop(), Err(cycleq::Error::Empty));
//! # Ok::<(), cycleq::Error>(())
//! ```

use crate::queue::DEFAULT_BACKOFF;
use crate::util::{Backoff, CachePadded};
use crate::{Error, Result};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::mem::ManuallyDrop;
use core::ptr;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use crossbeam_epoch::{self as epoch, Atomic, Owned};

/// One ring cell: an epoch tag plus an optional value, only ever replaced as
/// a whole. Nodes are immutable once published; mutation happens by swapping
/// the slot's pointer to a fresh node.
struct Node<T> {
    epoch: u64,
    value: Option<ManuallyDrop<T>>,
}

impl<T> Node<T> {
    fn empty(epoch: u64) -> Self {
        Self { epoch, value: None }
    }

    fn occupied(epoch: u64, value: T) -> Self {
        Self {
            epoch,
            value: Some(ManuallyDrop::new(value)),
        }
    }
}

/// A lock-free bounded MPMC queue for arbitrary element types.
///
/// Push and pop are CAS retry loops over per-slot nodes; `Full` and `Empty`
/// are terminal results returned without mutation, while CAS races and epoch
/// staleness retry internally behind the configured backoff. Successful
/// deliveries are globally FIFO and exactly-once: cursors only increase and
/// each cell changes hands through a single atomic swap.
///
/// All atomics use `SeqCst`; callers need no additional memory-barrier
/// reasoning.
#[derive(Debug)]
pub struct MpmcQueue<T> {
    // One node pointer per slot; never null after construction
    slots: Box<[CachePadded<Atomic<Node<T>>>]>,

    // Ring size; slot index for cursor c is c % capacity
    capacity: u64,

    // Next logical position to pop
    head: CachePadded<AtomicU64>,

    // Next logical position to push
    tail: CachePadded<AtomicU64>,

    // Sleep interval once a contended operation exhausts its spin budget
    backoff: Duration,

    // Retries observed across all operations, for observability only
    contended: CachePadded<AtomicU64>,
}

// Values are moved in and out with exclusive logical ownership (a slot CAS
// has exactly one winner), so sharing the queue only requires T: Send.
unsafe impl<T: Send> Send for MpmcQueue<T> {}
unsafe impl<T: Send> Sync for MpmcQueue<T> {}

impl<T> MpmcQueue<T> {
    /// Create a queue with the default backoff interval.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidCapacity`] when `capacity` is zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cycleq::queue::MpmcQueue;
    ///
    /// let queue: MpmcQueue<u32> = MpmcQueue::new(16)?;
    /// assert_eq!(queue.capacity(), 16);
    /// # Ok::<(), cycleq::Error>(())
    /// ```
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_backoff(capacity, DEFAULT_BACKOFF)
    }

    /// Create a queue that sleeps `backoff` between contended retries.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidCapacity`] when `capacity` is zero.
    pub fn with_backoff(capacity: usize, backoff: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity);
        }

        // Slot i starts empty, one lap away from its first push at cursor i
        let slots: Vec<CachePadded<Atomic<Node<T>>>> = (0..capacity)
            .map(|i| CachePadded::new(Atomic::new(Node::empty(i as u64))))
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

    /// Push a value onto the queue.
    ///
    /// The replacement node is allocated once and reused across CAS retries;
    /// losing a race costs no further allocation.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Full`] when the queue holds `capacity` values. The
    /// queue is untouched and the rejected value is dropped, matching the
    /// teardown rule that undelivered values are dropped, not delivered.
    pub fn push(&self, value: T) -> Result<()> {
        let guard = epoch::pin();
        let mut backoff = Backoff::new(self.backoff);
        let mut replacement = Owned::new(Node::occupied(0, value));

        loop {
            let tail = self.tail.load(Ordering::SeqCst);
            let slot = &self.slots[(tail % self.capacity) as usize];
            let observed = slot.load(Ordering::SeqCst, &guard);
            // Slots are populated at construction and only swapped, never
            // nulled, so the pointer is always valid here.
            let node = unsafe { observed.deref() };

            if node.epoch == tail {
                if node.value.is_some() {
                    // The value pushed one lap ago was never consumed: the
                    // ring is full. Drop the rejected value, free the node.
                    let mut node = replacement.into_box();
                    if let Some(value) = node.value.take() {
                        drop(ManuallyDrop::into_inner(value));
                    }
                    return Err(Error::Full);
                }

                replacement.epoch = tail.wrapping_add(self.capacity);
                match slot.compare_exchange(
                    observed,
                    replacement,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                    &guard,
                ) {
                    Ok(_) => {
                        // The superseded empty node may still be referenced
                        // by CAS losers; retire it behind the guard.
                        unsafe { guard.defer_destroy(observed) };
                        let _ = self.tail.compare_exchange(
                            tail,
                            tail.wrapping_add(1),
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        );
                        return Ok(());
                    }
                    Err(lost) => {
                        // Keep the allocation for the next attempt.
                        replacement = lost.new;
                    }
                }
            }

            self.contended.fetch_add(1, Ordering::Relaxed);
            backoff.snooze();
        }
    }

    /// Pop the oldest value from the queue.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Empty`] when no value is queued; repeated calls on
    /// an empty queue have no observable side effect.
    pub fn pop(&self) -> Result<T> {
        let guard = epoch::pin();
        let mut backoff = Backoff::new(self.backoff);
        let mut replacement = Owned::new(Node::<T>::empty(0));

        loop {
            let head = self.head.load(Ordering::SeqCst);
            let slot = &self.slots[(head % self.capacity) as usize];
            let observed = slot.load(Ordering::SeqCst, &guard);
            let node = unsafe { observed.deref() };
            let vacated = head.wrapping_add(self.capacity);

            if node.epoch == vacated {
                if let Some(stored) = node.value.as_ref() {
                    replacement.epoch = vacated;
                    match slot.compare_exchange(
                        observed,
                        replacement,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                        &guard,
                    ) {
                        Ok(_) => {
                            // Winning the CAS transfers ownership of the
                            // stored value; nodes are immutable once
                            // published, so this read moves out the only
                            // copy. The deferred destroy then frees the node
                            // without touching the value again.
                            let value = ManuallyDrop::into_inner(unsafe { ptr::read(stored) });
                            unsafe { guard.defer_destroy(observed) };
                            let _ = self.head.compare_exchange(
                                head,
                                head.wrapping_add(1),
                                Ordering::SeqCst,
                                Ordering::SeqCst,
                            );
                            return Ok(value);
                        }
                        Err(lost) => {
                            replacement = lost.new;
                        }
                    }
                }
                // Empty node already at the vacated epoch: a racing consumer
                // finished this lap first; head is stale.
            } else if node.epoch == head && node.value.is_none() {
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

impl<T> Drop for MpmcQueue<T> {
    fn drop(&mut self) {
        // Exclusive access: no guard needed. Every slot still owns exactly
        // one node; values in flight at teardown are dropped, not delivered.
        for slot in self.slots.iter() {
            let owned =
                unsafe { slot.load(Ordering::Relaxed, epoch::unprotected()).into_owned() };
            let mut node = owned.into_box();
            if let Some(value) = node.value.take() {
                drop(ManuallyDrop::into_inner(value));
            }
        }
    }
}
