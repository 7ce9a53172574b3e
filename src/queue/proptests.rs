//! Property-based tests for the queue backings
//!
//! These verify the contract invariants over generated workloads: FIFO
//! delivery, the `[0, capacity]` length bound, exact codec round-trips, and
//! resize preservation.

use crate::queue::{codec, BlockingQueue, MpmcQueue, PackedQueue};
use core::num::NonZeroU64;
use proptest::prelude::*;
use std::vec::Vec;

proptest! {
    #[test]
    fn prop_codec_round_trips(epoch in any::<u64>(), value in any::<u64>()) {
        let word = codec::pack(epoch, value);
        prop_assert_eq!(codec::unpack(word), (epoch, value));
    }

    #[test]
    fn prop_codec_halves_are_independent(
        epoch_a in any::<u64>(),
        epoch_b in any::<u64>(),
        value in any::<u64>(),
    ) {
        // Re-tagging a value with a different epoch must leave it intact.
        let first = codec::pack(epoch_a, value);
        let second = codec::pack(epoch_b, codec::value_of(first));
        prop_assert_eq!(codec::value_of(second), value);
        prop_assert_eq!(codec::epoch_of(second), epoch_b);
    }

    #[test]
    fn prop_boxed_fifo_single_thread(values in prop::collection::vec(any::<i64>(), 1..200)) {
        let queue = MpmcQueue::new(values.len()).unwrap();
        for &value in &values {
            prop_assert!(queue.push(value).is_ok());
        }
        for &expected in &values {
            prop_assert_eq!(queue.pop(), Ok(expected));
        }
        prop_assert_eq!(queue.pop(), Err(crate::Error::Empty));
    }

    #[test]
    fn prop_packed_fifo_single_thread(values in prop::collection::vec(1..u64::MAX, 1..200)) {
        let queue = PackedQueue::new(values.len()).unwrap();
        for &value in &values {
            prop_assert!(queue.push(NonZeroU64::new(value).unwrap()).is_ok());
        }
        for &expected in &values {
            prop_assert_eq!(queue.pop().map(NonZeroU64::get), Ok(expected));
        }
    }

    #[test]
    fn prop_len_never_exceeds_capacity(
        capacity in 1usize..32,
        operations in prop::collection::vec(any::<bool>(), 1..200),
    ) {
        let queue = PackedQueue::new(capacity).unwrap();
        let mut expected_len = 0usize;

        for (i, &is_push) in operations.iter().enumerate() {
            if is_push {
                if queue.push(NonZeroU64::new(i as u64 + 1).unwrap()).is_ok() {
                    expected_len += 1;
                }
            } else if queue.pop().is_ok() {
                expected_len -= 1;
            }

            prop_assert_eq!(queue.len(), expected_len);
            prop_assert!(queue.len() <= capacity);
        }
    }

    #[test]
    fn prop_rejected_pushes_preserve_content(
        capacity in 1usize..16,
        extra in 1usize..8,
    ) {
        let queue = MpmcQueue::new(capacity).unwrap();
        for value in 0..capacity {
            prop_assert!(queue.push(value).is_ok());
        }
        for value in 0..extra {
            prop_assert_eq!(queue.push(capacity + value), Err(crate::Error::Full));
        }
        for value in 0..capacity {
            prop_assert_eq!(queue.pop(), Ok(value));
        }
    }

    #[test]
    fn prop_resize_preserves_fifo(
        initial in prop::collection::vec(any::<u32>(), 1..40),
        growth in 0usize..40,
    ) {
        let queue = BlockingQueue::new(initial.len()).unwrap();
        for &value in &initial {
            prop_assert!(queue.push(value).is_ok());
        }

        let new_capacity = initial.len() + growth;
        prop_assert!(queue.resize(new_capacity).is_ok());
        prop_assert_eq!(queue.capacity(), new_capacity);

        let drained: Vec<u32> = core::iter::from_fn(|| queue.pop().ok()).collect();
        prop_assert_eq!(drained, initial);
    }

    #[test]
    fn prop_resize_below_len_always_fails(
        values in prop::collection::vec(any::<u16>(), 2..30),
    ) {
        let queue = BlockingQueue::new(values.len()).unwrap();
        for &value in &values {
            prop_assert!(queue.push(value).is_ok());
        }

        prop_assert_eq!(queue.resize(values.len() - 1), Err(crate::Error::ResizeTooSmall));
        // And nothing moved.
        let drained: Vec<u16> = core::iter::from_fn(|| queue.pop().ok()).collect();
        prop_assert_eq!(drained, values);
    }
}
