//! Loom model checking for the epoch-guarded ring
//!
//! Loom has no 128-bit atomics, so these tests drive a scaled-down replica
//! of the packed ring — same epoch classification, same CAS-then-advance
//! structure, with the epoch in the high 32 bits and the value in the low 32
//! bits of a `loom` `AtomicU64`. The properties checked are the ones the
//! real engines rely on: exactly-once delivery, no overwrite of a lapped
//! slot, and cursor advancement only after the slot CAS commits.

use loom::sync::atomic::{AtomicU64, Ordering};
use loom::sync::Arc;
use loom::thread;
use std::vec::Vec;

const EMPTY: u32 = 0;

fn pack(epoch: u32, value: u32) -> u64 {
    ((epoch as u64) << 32) | value as u64
}

fn unpack(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, word as u32)
}

/// Scaled-down replica of `PackedQueue` over loom atomics.
struct ModelRing {
    slots: Vec<AtomicU64>,
    capacity: u32,
    head: AtomicU64,
    tail: AtomicU64,
}

impl ModelRing {
    fn new(capacity: u32) -> Self {
        Self {
            slots: (0..capacity).map(|i| AtomicU64::new(pack(i, EMPTY))).collect(),
            capacity,
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
        }
    }

    fn push(&self, value: u32) -> Result<(), ()> {
        loop {
            let tail = self.tail.load(Ordering::SeqCst) as u32;
            let slot = &self.slots[(tail % self.capacity) as usize];
            let observed = slot.load(Ordering::SeqCst);
            let (epoch, stored) = unpack(observed);

            if epoch == tail {
                if stored != EMPTY {
                    return Err(());
                }
                let replacement = pack(tail.wrapping_add(self.capacity), value);
                if slot
                    .compare_exchange(observed, replacement, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    let _ = self.tail.compare_exchange(
                        tail as u64,
                        tail as u64 + 1,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    );
                    return Ok(());
                }
            }

            thread::yield_now();
        }
    }

    fn pop(&self) -> Option<u32> {
        loop {
            let head = self.head.load(Ordering::SeqCst) as u32;
            let slot = &self.slots[(head % self.capacity) as usize];
            let observed = slot.load(Ordering::SeqCst);
            let (epoch, stored) = unpack(observed);
            let vacated = head.wrapping_add(self.capacity);

            if epoch == vacated && stored != EMPTY {
                let replacement = pack(vacated, EMPTY);
                if slot
                    .compare_exchange(observed, replacement, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    let _ = self.head.compare_exchange(
                        head as u64,
                        head as u64 + 1,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    );
                    return Some(stored);
                }
            } else if epoch == head && stored == EMPTY {
                return None;
            }

            thread::yield_now();
        }
    }
}

#[test]
fn loom_spsc_fifo_delivery() {
    loom::model(|| {
        let ring = Arc::new(ModelRing::new(2));

        let producer = thread::spawn({
            let ring = Arc::clone(&ring);
            move || {
                ring.push(1).unwrap();
                ring.push(2).unwrap();
            }
        });

        let consumer = thread::spawn({
            let ring = Arc::clone(&ring);
            move || {
                let mut received = Vec::new();
                while received.len() < 2 {
                    if let Some(value) = ring.pop() {
                        received.push(value);
                    } else {
                        thread::yield_now();
                    }
                }
                received
            }
        });

        producer.join().unwrap();
        let received = consumer.join().unwrap();
        assert_eq!(received, [1, 2]);
    });
}

#[test]
fn loom_racing_producers_never_overwrite() {
    loom::model(|| {
        let ring = Arc::new(ModelRing::new(2));

        let first = thread::spawn({
            let ring = Arc::clone(&ring);
            move || ring.push(1).unwrap()
        });
        let second = thread::spawn({
            let ring = Arc::clone(&ring);
            move || ring.push(2).unwrap()
        });

        first.join().unwrap();
        second.join().unwrap();

        // Both values must be present exactly once, in some order.
        let mut drained = [ring.pop(), ring.pop()];
        drained.sort_unstable();
        assert_eq!(drained, [Some(1), Some(2)]);
        assert_eq!(ring.pop(), None);
    });
}

#[test]
fn loom_racing_consumers_deliver_exactly_once() {
    loom::model(|| {
        let ring = Arc::new(ModelRing::new(1));
        ring.push(7).unwrap();

        let first = thread::spawn({
            let ring = Arc::clone(&ring);
            move || ring.pop()
        });
        let second = thread::spawn({
            let ring = Arc::clone(&ring);
            move || ring.pop()
        });

        let results = [first.join().unwrap(), second.join().unwrap()];

        // One consumer gets the value, the other observes Empty.
        assert_eq!(
            results.iter().filter(|r| r.is_some()).count(),
            1,
            "value delivered exactly once: {results:?}"
        );
        assert!(results.contains(&Some(7)));
    });
}

#[test]
fn loom_full_slot_reuse_across_laps() {
    loom::model(|| {
        let ring = Arc::new(ModelRing::new(1));

        let producer = thread::spawn({
            let ring = Arc::clone(&ring);
            move || {
                // Two laps over the single slot.
                while ring.push(1).is_err() {
                    thread::yield_now();
                }
                while ring.push(2).is_err() {
                    thread::yield_now();
                }
            }
        });

        let consumer = thread::spawn({
            let ring = Arc::clone(&ring);
            move || {
                let mut received = Vec::new();
                while received.len() < 2 {
                    if let Some(value) = ring.pop() {
                        received.push(value);
                    } else {
                        thread::yield_now();
                    }
                }
                received
            }
        });

        producer.join().unwrap();
        let received = consumer.join().unwrap();
        assert_eq!(received, [1, 2]);
    });
}
