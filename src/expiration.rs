//! Expire-after-write and expire-after-access bookkeeping.
//!
//! `SPEC_FULL.md` §4.5: a strict write-order FIFO handles TTL (deadlines
//! only move forward in insertion order for a fixed TTL, the same
//! monotonic-queue shape `moka::sync::Cache` uses for its `write_order`
//! deque), while TTI is checked against the policy's own recency order
//! since "access order" is exactly what the window/probation/protected
//! deques already track.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::invariants::debug_assert_monotonic_write_order;

struct WriteOrderSlot<K> {
    key: Arc<K>,
    hash: u64,
    expire_at_nanos: u64,
}

/// Bounded-scan expiration engine. One instance per cache; the maintenance
/// thread and lazy on-read checks share it.
pub(crate) struct ExpirationEngine<K> {
    write_order: VecDeque<WriteOrderSlot<K>>,
    expire_after_write_nanos: Option<u64>,
    /// Caps how many candidates an eager scan inspects per region per
    /// sweep, bounding worst-case maintenance latency (`SPEC_FULL.md` §4.5).
    scan_budget_per_region: usize,
}

impl<K> ExpirationEngine<K> {
    /// `expire_after_access_nanos` is not tracked by the engine itself: TTI
    /// is checked against `Entry::last_access_nanos` directly (`CacheInner`
    /// keeps its own copy for that comparison), so the write-order queue
    /// here only ever needs the write deadline.
    pub(crate) fn new(expire_after_write_nanos: Option<u64>, maximum_size: usize) -> Self {
        Self {
            write_order: VecDeque::new(),
            expire_after_write_nanos,
            scan_budget_per_region: (maximum_size / 4).clamp(1, 256),
        }
    }

    pub(crate) fn scan_budget_per_region(&self) -> usize {
        self.scan_budget_per_region
    }

    /// Computes the expire-after-write deadline for an entry created "now",
    /// if TTL is configured.
    pub(crate) fn write_deadline(&self, now_nanos: u64) -> Option<u64> {
        self.expire_after_write_nanos.map(|ttl| now_nanos + ttl)
    }

    pub(crate) fn track_write(&mut self, key: Arc<K>, hash: u64, expire_at_nanos: u64) {
        if let Some(back) = self.write_order.back() {
            debug_assert_monotonic_write_order!(back.expire_at_nanos, expire_at_nanos);
        }
        self.write_order.push_back(WriteOrderSlot {
            key,
            hash,
            expire_at_nanos,
        });
    }

    /// Pops every write-order entry whose TTL has elapsed by `now_nanos`,
    /// up to `budget` entries, invoking `handler` for each. The queue is a
    /// strict FIFO, so the scan can stop at the first unexpired head.
    pub(crate) fn drain_expired_by_write(
        &mut self,
        now_nanos: u64,
        budget: usize,
        mut handler: impl FnMut(Arc<K>, u64),
    ) {
        let mut taken = 0;
        while taken < budget {
            match self.write_order.front() {
                Some(slot) if slot.expire_at_nanos <= now_nanos => {
                    let slot = self.write_order.pop_front().expect("checked by front()");
                    handler(slot.key, slot.hash);
                    taken += 1;
                }
                _ => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_order_expires_in_fifo_order() {
        let mut engine: ExpirationEngine<u32> = ExpirationEngine::new(Some(100), 1000);
        engine.track_write(Arc::new(1), 1, 100);
        engine.track_write(Arc::new(2), 2, 200);
        engine.track_write(Arc::new(3), 3, 300);

        let mut expired = Vec::new();
        engine.drain_expired_by_write(250, 10, |key, _hash| expired.push(*key));
        assert_eq!(expired, vec![1, 2]);
    }

    #[test]
    fn scan_budget_is_bounded_above() {
        let engine: ExpirationEngine<u32> = ExpirationEngine::new(None, 10_000);
        assert_eq!(engine.scan_budget_per_region(), 256);
    }

    #[test]
    fn no_ttl_means_no_deadline() {
        let engine: ExpirationEngine<u32> = ExpirationEngine::new(None, 100);
        assert_eq!(engine.write_deadline(1_000), None);
    }
}
