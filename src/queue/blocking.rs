//! Bounded blocking queue
//!
//! The lock-based alternative backing: same `push`/`pop` contract as the
//! lock-free engines plus a `resize` operation, for callers that value
//! dynamic capacity over maximal concurrency.
//!
//! ## Locking design
//!
//! Two independent mutexes, one per side. The producer lock owns the tail
//! cursor and the full check; the consumer lock owns the head cursor and the
//! empty check. A `push` takes only the producer lock and a `pop` only the
//! consumer lock, so one active producer and one active consumer run in true
//! parallel; multiple producers (or consumers) serialize on their own side's
//! lock. The shared logical length is a single [`AtomicUsize`], written under
//! either lock and read lock-free — the one cross-side synchronization
//! point.
//!
//! `resize` takes both locks (always producer first, then consumer), which
//! gives it full exclusivity: it copies the live elements in FIFO order into
//! a fresh ring and resets the cursors.
//!
//! ## Example
//!
//! ```rust
//! use cycleq::queue::BlockingQueue;
//!
//! let queue = BlockingQueue::new(2)?;
//! queue.push(1)?;
//! queue.push(2)?;
//! assert_eq!(queue.push(3), Err(cycleq::Error::Full));
//!
//! queue.resize(4)?;
//! queue.push(3)?;
//! assert_eq!(queue.pop()?, 1);
//! # Ok::<(), cycleq::Error>(())
//! ```

use crate::metrics::{AtomicMetrics, MetricsCollector, PerformanceMetrics};
use crate::{Error, Result};
use std::boxed::Box;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use std::vec::Vec;

/// A bounded MPMC queue guarded by per-side locks, with dynamic capacity.
///
/// Not lock-free: a stalled producer can block other producers (and a
/// stalled consumer other consumers), but never the opposite side. Use this
/// variant when `resize` matters more than progress guarantees.
#[derive(Debug)]
pub struct BlockingQueue<T> {
    // Ring storage; the boxed slice itself is only replaced under both locks
    buffer: UnsafeCell<Box<[UnsafeCell<Option<T>>]>>,

    // Current ring size; rewritten only under both locks
    capacity: AtomicUsize,

    // Logical length, the cross-side synchronization point
    len: AtomicUsize,

    // Producer side: next slot index to write
    tail: Mutex<usize>,

    // Consumer side: next slot index to read
    head: Mutex<usize>,

    metrics: AtomicMetrics,
}

// A slot is written only by the side that logically owns it: the producer
// writes slot `tail` only while `len < capacity` (so the consumer has
// already vacated it), the consumer reads slot `head` only while `len > 0`
// (so the producer's write is already published by the len update).
unsafe impl<T: Send> Send for BlockingQueue<T> {}
unsafe impl<T: Send> Sync for BlockingQueue<T> {}

impl<T> BlockingQueue<T> {
    /// Create a queue with the given capacity.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity);
        }

        Ok(Self {
            buffer: UnsafeCell::new(Self::allocate(capacity)),
            capacity: AtomicUsize::new(capacity),
            len: AtomicUsize::new(0),
            tail: Mutex::new(0),
            head: Mutex::new(0),
            metrics: AtomicMetrics::default(),
        })
    }

    fn allocate(capacity: usize) -> Box<[UnsafeCell<Option<T>>]> {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || UnsafeCell::new(None));
        slots.into_boxed_slice()
    }

    /// Push a value onto the queue.
    ///
    /// Takes only the producer lock; a concurrent `pop` proceeds in
    /// parallel.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Full`] when the queue holds `capacity` values,
    /// leaving the queue untouched.
    pub fn push(&self, value: T) -> Result<()> {
        let start = Instant::now();
        let mut tail = self.lock_side(&self.tail);

        if self.len.load(Ordering::SeqCst) == self.capacity.load(Ordering::SeqCst) {
            self.metrics.record_rejection();
            return Err(Error::Full);
        }

        // len < capacity means the consumer already vacated this slot, so
        // the write cannot race a concurrent pop.
        unsafe {
            let buffer = &*self.buffer.get();
            *buffer[*tail].get() = Some(value);
        }
        *tail = (*tail + 1) % self.capacity.load(Ordering::SeqCst);
        self.len.fetch_add(1, Ordering::SeqCst);

        self.metrics.record_success(start.elapsed());
        Ok(())
    }

    /// Pop the oldest value from the queue.
    ///
    /// Takes only the consumer lock; a concurrent `push` proceeds in
    /// parallel.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Empty`] when no value is queued, with no
    /// observable side effect.
    pub fn pop(&self) -> Result<T> {
        let start = Instant::now();
        let mut head = self.lock_side(&self.head);

        if self.len.load(Ordering::SeqCst) == 0 {
            self.metrics.record_rejection();
            return Err(Error::Empty);
        }

        // len > 0 means the producer's write to this slot is published.
        let value = unsafe {
            let buffer = &*self.buffer.get();
            (*buffer[*head].get()).take()
        };

        match value {
            Some(value) => {
                *head = (*head + 1) % self.capacity.load(Ordering::SeqCst);
                self.len.fetch_sub(1, Ordering::SeqCst);
                self.metrics.record_success(start.elapsed());
                Ok(value)
            }
            // Unreachable while the len accounting holds; leave the cursors
            // where they are instead of compounding the inconsistency.
            None => {
                self.metrics.record_rejection();
                Err(Error::Empty)
            }
        }
    }

    /// Change the queue's capacity, preserving queued values and their
    /// order.
    ///
    /// Requires full exclusivity: both side locks are held for the duration,
    /// so no `push` or `pop` overlaps the copy.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidCapacity`] when `new_capacity` is zero and
    /// with [`Error::ResizeTooSmall`] when `new_capacity` is below the
    /// current length. Either way the queue is unchanged.
    pub fn resize(&self, new_capacity: usize) -> Result<()> {
        if new_capacity == 0 {
            return Err(Error::InvalidCapacity);
        }

        // Lock order: producer first, then consumer. resize is the only
        // operation taking both, so the order just has to be consistent
        // with itself.
        let mut tail = self.lock_side(&self.tail);
        let mut head = self.lock_side(&self.head);

        let len = self.len.load(Ordering::SeqCst);
        if new_capacity < len {
            return Err(Error::ResizeTooSmall);
        }

        let capacity = self.capacity.load(Ordering::SeqCst);
        let mut fresh = Self::allocate(new_capacity);

        // FIFO copy starting at the old head.
        unsafe {
            let old = &*self.buffer.get();
            for i in 0..len {
                let from = (*head + i) % capacity;
                *fresh[i].get_mut() = (*old[from].get()).take();
            }
            *self.buffer.get() = fresh;
        }

        self.capacity.store(new_capacity, Ordering::SeqCst);
        *head = 0;
        *tail = len % new_capacity;
        Ok(())
    }

    /// Current number of queued values.
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    /// Whether the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current capacity (changes across `resize`).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    fn lock_side<'a>(&self, side: &'a Mutex<usize>) -> MutexGuard<'a, usize> {
        if let Ok(guard) = side.try_lock() {
            return guard;
        }

        self.metrics.record_contention();

        // A panicking pusher/popper cannot leave a torn slot (slot writes
        // commit before the cursor moves), so poisoning carries no extra
        // information here.
        match side.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<T> MetricsCollector for BlockingQueue<T> {
    fn metrics(&self) -> PerformanceMetrics {
        self.metrics.snapshot()
    }

    fn reset_metrics(&self) {
        self.metrics.reset();
    }
}
