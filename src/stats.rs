//! Contention-tolerant hit/miss/eviction/load counters.
//!
//! Plain `AtomicU64` counters, each on its own cache line via
//! `crossbeam_utils::CachePadded`, following the same padding-for-concurrent-
//! writers approach the teacher applies to its ring slots.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

#[derive(Default)]
pub(crate) struct StatsCounters {
    hit_count: CachePadded<AtomicU64>,
    miss_count: CachePadded<AtomicU64>,
    eviction_count: CachePadded<AtomicU64>,
    load_success_count: CachePadded<AtomicU64>,
    load_failure_count: CachePadded<AtomicU64>,
    total_load_nanos: CachePadded<AtomicU64>,
}

impl StatsCounters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.miss_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.eviction_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load_success(&self, elapsed_nanos: u64) {
        self.load_success_count.fetch_add(1, Ordering::Relaxed);
        self.total_load_nanos.fetch_add(elapsed_nanos, Ordering::Relaxed);
    }

    pub(crate) fn record_load_failure(&self, elapsed_nanos: u64) {
        self.load_failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_load_nanos.fetch_add(elapsed_nanos, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            eviction_count: self.eviction_count.load(Ordering::Relaxed),
            load_success_count: self.load_success_count.load(Ordering::Relaxed),
            load_failure_count: self.load_failure_count.load(Ordering::Relaxed),
            total_load_nanos: self.total_load_nanos.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of cache statistics, exposed by `Cache::stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub eviction_count: u64,
    pub load_success_count: u64,
    pub load_failure_count: u64,
    pub total_load_nanos: u64,
}

impl CacheStats {
    pub fn request_count(&self) -> u64 {
        self.hit_count + self.miss_count
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.request_count();
        if total == 0 {
            1.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }

    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }

    pub fn load_count(&self) -> u64 {
        self.load_success_count + self.load_failure_count
    }

    pub fn average_load_penalty_nanos(&self) -> f64 {
        let loads = self.load_count();
        if loads == 0 {
            0.0
        } else {
            self.total_load_nanos as f64 / loads as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_is_one_when_no_requests_have_happened() {
        let counters = StatsCounters::new();
        assert_eq!(counters.snapshot().hit_rate(), 1.0);
    }

    #[test]
    fn hit_rate_reflects_recorded_hits_and_misses() {
        let counters = StatsCounters::new();
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.request_count(), 3);
        assert!((snapshot.hit_rate() - (2.0 / 3.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn average_load_penalty_divides_by_total_loads() {
        let counters = StatsCounters::new();
        counters.record_load_success(100);
        counters.record_load_failure(300);
        assert_eq!(counters.snapshot().average_load_penalty_nanos(), 200.0);
    }
}
