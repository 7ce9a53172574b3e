//! Queue implementations
//!
//! Three bounded MPMC queues sharing one contract (`push` fails `Full`,
//! `pop` fails `Empty`, both without mutation) over different backings:
//!
//! | Queue | Payload | Progress | Extra |
//! |-------|---------|----------|-------|
//! | [`PackedQueue`] | `NonZeroU64` handles | lock-free | no allocation per op |
//! | [`MpmcQueue`] | any `T` | lock-free | one node alloc per push |
//! | [`BlockingQueue`] | any `T` | two-lock | `resize` |
//!
//! ## Choosing a backing
//!
//! Reach for [`PackedQueue`] when the payload is handle-sized — a connection
//! id, an index into an arena, a tagged pointer. The slot is one atomic word
//! (see [`codec`]) and a push is a single 128-bit CAS. [`MpmcQueue`] carries
//! arbitrary types by boxing each value into an epoch-tagged node and
//! reclaiming superseded nodes through `crossbeam-epoch`. [`BlockingQueue`]
//! gives up lock-freedom to offer `resize` under full exclusivity.
//!
//! Both lock-free engines defeat the ABA hazard the same way: every slot
//! carries a monotonically increasing epoch (`slot_index + k * capacity`),
//! replaced together with the value in one CAS, so a thread with a stale
//! cursor snapshot detects the lap purely from the epoch and retries instead
//! of overwriting. Retries are paced by a bounded spin-then-sleep backoff;
//! `Full` and `Empty` are never retried internally.

pub mod codec;
pub mod packed;

// The boxed engine pins crossbeam-epoch's global collector and the blocking
// engine sleeps on mutexes; both need std. The packed engine is the no_std
// survivor.
#[cfg(feature = "std")]
pub mod blocking;
#[cfg(feature = "std")]
pub mod mpmc;

pub use packed::PackedQueue;

#[cfg(feature = "std")]
pub use blocking::BlockingQueue;
#[cfg(feature = "std")]
pub use mpmc::MpmcQueue;

use core::time::Duration;

/// Sleep interval between contended retries unless overridden with
/// `with_backoff`.
pub const DEFAULT_BACKOFF: Duration = Duration::from_micros(50);


#[cfg(test)]
mod proptests;

#[cfg(test)]
mod loom_tests;
