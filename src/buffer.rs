//! Striped, lossy, lock-free capture of hot-path access events.
//!
//! See `SPEC_FULL.md` §4.2 for why each stripe is a bounded
//! `crossbeam_queue::ArrayQueue` rather than the teacher's SPSC `Ring`: the
//! teacher's ring requires a producer to `register()` before writing, which
//! fits a fixed worker pool (e.g. `span_collector`) but not a cache whose
//! callers are arbitrary, unregistered application threads. Each stripe must
//! therefore tolerate multiple concurrent producers.

use crossbeam_queue::ArrayQueue;
use crossbeam_utils::CachePadded;
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::record::AccessRecord;

static NEXT_THREAD_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static THREAD_ID: Cell<usize> = Cell::new(usize::MAX);
}

fn thread_stripe_id() -> usize {
    THREAD_ID.with(|cell| {
        let mut id = cell.get();
        if id == usize::MAX {
            id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
            cell.set(id);
        }
        id
    })
}

/// Striped collection of bounded MPMC queues, one per stripe.
///
/// `record()` never blocks: a full stripe silently drops the record, which
/// is acceptable because the frequency sketch and LRU approximation the
/// drain feeds are eventually consistent by design.
pub(crate) struct StripedBuffer<K> {
    stripes: Box<[CachePadded<ArrayQueue<AccessRecord<K>>>]>,
    mask: usize,
}

impl<K> StripedBuffer<K> {
    /// Creates a buffer with `stripe_count` stripes (rounded up to the next
    /// power of two) each holding up to `capacity_per_stripe` records.
    pub(crate) fn new(stripe_count: usize, capacity_per_stripe: usize) -> Self {
        let stripe_count = stripe_count.max(1).next_power_of_two();
        let stripes = (0..stripe_count)
            .map(|_| CachePadded::new(ArrayQueue::new(capacity_per_stripe.max(1))))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            stripes,
            mask: stripe_count - 1,
        }
    }

    /// Default stripe count: the next power of two at or above the number
    /// of logical CPUs, matching the teacher's own stripe-sizing heuristic
    /// for MPSC producer counts.
    pub(crate) fn default_stripe_count() -> usize {
        num_cpus::get().max(1).next_power_of_two()
    }

    #[inline]
    fn stripe_for_current_thread(&self) -> &ArrayQueue<AccessRecord<K>> {
        let idx = thread_stripe_id() & self.mask;
        &self.stripes[idx]
    }

    /// Records an access event on the calling thread's stripe. Returns
    /// `true` if the record was queued, `false` if that stripe was full and
    /// the record was dropped.
    pub(crate) fn record(&self, record: AccessRecord<K>) -> bool {
        self.stripe_for_current_thread().push(record).is_ok()
    }

    /// Returns `true` if any stripe has crossed the soft drain-trigger
    /// threshold (a fraction of its capacity).
    pub(crate) fn any_stripe_over_threshold(&self, threshold: usize) -> bool {
        self.stripes.iter().any(|s| s.len() >= threshold)
    }

    /// Drains up to `max_per_stripe` records from each stripe, applying
    /// `handler` to each in FIFO order per stripe. Cross-stripe ordering is
    /// not preserved, which `SPEC_FULL.md` §5 permits ("access-record
    /// ordering is preserved per stripe, not globally").
    pub(crate) fn drain_into(&self, max_per_stripe: usize, mut handler: impl FnMut(AccessRecord<K>)) -> usize {
        let mut total = 0;
        for stripe in self.stripes.iter() {
            for _ in 0..max_per_stripe {
                match stripe.pop() {
                    Some(record) => {
                        handler(record);
                        total += 1;
                    }
                    None => break,
                }
            }
        }
        total
    }

    pub(crate) fn stripe_count(&self) -> usize {
        self.stripes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_round_trip_in_fifo_order_per_thread() {
        let buf: StripedBuffer<u32> = StripedBuffer::new(1, 8);
        for i in 0..4u64 {
            assert!(buf.record(AccessRecord::write(std::sync::Arc::new(i as u32), i, i)));
        }
        let mut seen = Vec::new();
        buf.drain_into(8, |r| seen.push(r.hash));
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn overflow_is_dropped_not_blocking() {
        let buf: StripedBuffer<u32> = StripedBuffer::new(1, 2);
        assert!(buf.record(AccessRecord::write(std::sync::Arc::new(1), 1, 0)));
        assert!(buf.record(AccessRecord::write(std::sync::Arc::new(2), 2, 0)));
        assert!(!buf.record(AccessRecord::write(std::sync::Arc::new(3), 3, 0)));
    }

    #[test]
    fn stripe_count_rounds_up_to_power_of_two() {
        let buf: StripedBuffer<u32> = StripedBuffer::new(3, 4);
        assert_eq!(buf.stripe_count(), 4);
    }
}
