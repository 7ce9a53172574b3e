//! Work hand-off example
//!
//! Uses the two lock-free backings side by side: job descriptions (owned
//! strings) travel through the boxed queue, job ids through the packed
//! queue. Producers and consumers hammer both from several threads and the
//! totals line up at the end.

use cycleq::queue::{MpmcQueue, PackedQueue};
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

const PRODUCERS: u64 = 3;
const CONSUMERS: usize = 3;
const JOBS_PER_PRODUCER: u64 = 1_000;

fn main() -> Result<(), cycleq::Error> {
    let descriptions: Arc<MpmcQueue<String>> = Arc::new(MpmcQueue::new(128)?);
    let ids = Arc::new(PackedQueue::new(128)?);
    let id_sum = Arc::new(AtomicU64::new(0));
    let mut threads = Vec::new();

    for producer in 0..PRODUCERS {
        let descriptions = Arc::clone(&descriptions);
        let ids = Arc::clone(&ids);
        threads.push(thread::spawn(move || {
            for i in 0..JOBS_PER_PRODUCER {
                let id = producer * JOBS_PER_PRODUCER + i + 1;
                while descriptions.push(format!("job-{id}")).is_err() {
                    thread::yield_now();
                }
                while ids.push(NonZeroU64::new(id).unwrap()).is_err() {
                    thread::yield_now();
                }
            }
        }));
    }

    let total_jobs = PRODUCERS * JOBS_PER_PRODUCER;
    let per_consumer = total_jobs / CONSUMERS as u64;
    for _ in 0..CONSUMERS {
        let descriptions = Arc::clone(&descriptions);
        let ids = Arc::clone(&ids);
        let id_sum = Arc::clone(&id_sum);
        threads.push(thread::spawn(move || {
            let mut taken = 0;
            while taken < per_consumer {
                if let Ok(id) = ids.pop() {
                    id_sum.fetch_add(id.get(), Ordering::Relaxed);
                    taken += 1;
                }
                if let Ok(description) = descriptions.pop() {
                    assert!(description.starts_with("job-"));
                }
                thread::yield_now();
            }
        }));
    }

    for thread in threads {
        thread.join().expect("worker thread");
    }

    // Drain what the consumers' fixed budgets left behind.
    while descriptions.pop().is_ok() {}

    let expected: u64 = (1..=total_jobs).sum();
    assert_eq!(id_sum.load(Ordering::Relaxed), expected);
    println!(
        "handed off {total_jobs} jobs; id checksum {expected} verified, {} retries paid",
        ids.contention_events()
    );
    Ok(())
}
