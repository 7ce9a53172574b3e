//! Performance metrics
//!
//! Standardized operation counters for the queue implementations: successes,
//! capacity rejections, contention events, and latency, collected with
//! relaxed atomics so recording never perturbs the operations it measures.
//! The blocking queue records full latency; the lock-free engines expose
//! their own retry counters (`contention_events`) since timing every CAS
//! attempt would dominate the hot path.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

/// A point-in-time snapshot of a structure's operation counters.
#[derive(Debug, Default, Clone)]
pub struct PerformanceMetrics {
    /// Total number of operations performed
    pub total_operations: u64,
    /// Operations that completed with a value or an accepted push
    pub successful_operations: u64,
    /// Operations rejected with `Full` or `Empty`
    pub rejected_operations: u64,
    /// Retries or lock waits caused by contention
    pub contended_operations: u64,
    /// Average operation time in nanoseconds
    pub avg_operation_time_ns: u64,
    /// Maximum operation time in nanoseconds
    pub max_operation_time_ns: u64,
}

impl PerformanceMetrics {
    /// Fraction of operations that succeeded, as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            (self.successful_operations as f64 / self.total_operations as f64) * 100.0
        }
    }

    /// Fraction of operations that hit contention, as a percentage.
    pub fn contention_rate(&self) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            (self.contended_operations as f64 / self.total_operations as f64) * 100.0
        }
    }

    /// Average operation time as a [`Duration`].
    pub fn avg_operation_time(&self) -> Duration {
        Duration::from_nanos(self.avg_operation_time_ns)
    }

    /// Maximum operation time as a [`Duration`].
    pub fn max_operation_time(&self) -> Duration {
        Duration::from_nanos(self.max_operation_time_ns)
    }
}

/// Lock-free recorder behind each instrumented structure.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    total: AtomicU64,
    successful: AtomicU64,
    rejected: AtomicU64,
    contended: AtomicU64,
    total_time_ns: AtomicU64,
    max_time_ns: AtomicU64,
}

impl AtomicMetrics {
    /// Record a successful operation and how long it took.
    pub fn record_success(&self, duration: Duration) {
        let duration_ns = duration.as_nanos() as u64;

        self.total.fetch_add(1, Ordering::Relaxed);
        self.successful.fetch_add(1, Ordering::Relaxed);
        self.total_time_ns.fetch_add(duration_ns, Ordering::Relaxed);

        let mut current_max = self.max_time_ns.load(Ordering::Relaxed);
        while duration_ns > current_max {
            match self.max_time_ns.compare_exchange_weak(
                current_max,
                duration_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current_max = observed,
            }
        }
    }

    /// Record an operation rejected with `Full` or `Empty`.
    pub fn record_rejection(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retry or lock wait caused by contention.
    pub fn record_contention(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot of the counters.
    pub fn snapshot(&self) -> PerformanceMetrics {
        let total = self.total.load(Ordering::Relaxed);
        let total_time = self.total_time_ns.load(Ordering::Relaxed);

        PerformanceMetrics {
            total_operations: total,
            successful_operations: self.successful.load(Ordering::Relaxed),
            rejected_operations: self.rejected.load(Ordering::Relaxed),
            contended_operations: self.contended.load(Ordering::Relaxed),
            avg_operation_time_ns: if total > 0 { total_time / total } else { 0 },
            max_operation_time_ns: self.max_time_ns.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.successful.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
        self.contended.store(0, Ordering::Relaxed);
        self.total_time_ns.store(0, Ordering::Relaxed);
        self.max_time_ns.store(0, Ordering::Relaxed);
    }
}

/// Trait for structures that expose performance metrics.
pub trait MetricsCollector {
    /// Get current performance metrics
    fn metrics(&self) -> PerformanceMetrics;

    /// Reset all metrics
    fn reset_metrics(&self);
}
