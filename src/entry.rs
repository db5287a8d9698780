//! The value stored per key: an immutable payload plus the handful of
//! fields the maintenance path mutates concurrently with readers.
//!
//! `SPEC_FULL.md` §4.4's Design Notes resolve the "what is mutable"
//! question explicitly: value and weight never change after insertion
//! (a `put()` of an existing key installs a brand-new `Entry`, it does not
//! mutate one in place); only the last-access timestamp and the owning
//! policy node id are touched outside of insertion, and both are plain
//! atomics so a reader never takes a lock.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// One resident value plus its bookkeeping.
///
/// Single-flight coalescing for a *missing* key lives in
/// `CacheInner::inflight` (keyed by key, since no `Entry` exists yet for a
/// miss); this struct only tracks the single-flight gate for a *refresh* of
/// an already-resident entry, via `refresh_in_flight`.
pub(crate) struct Entry<V> {
    pub(crate) value: Arc<V>,
    pub(crate) weight: u32,
    pub(crate) created_at_nanos: u64,
    /// `None` means no expire-after-write deadline is configured.
    pub(crate) expire_write_at_nanos: Option<u64>,
    /// Recomputed on every access when expire-after-access is configured;
    /// `u64::MAX` sentinel means "not tracked".
    last_access_nanos: AtomicU64,
    /// Arena slot id owned by the policy; `u32::MAX` until the drain has
    /// processed this entry's write record and actually linked it in.
    node_id: AtomicU32,
    /// Set once a refresh for this entry has been dispatched and not yet
    /// completed, so concurrent readers don't fan out duplicate reloads.
    refresh_in_flight: AtomicBool,
    /// Wall-clock nanos of the last successful load, used to decide
    /// whether a read is due for `refresh_after_write`.
    loaded_at_nanos: AtomicI64,
}

impl<V> Entry<V> {
    pub(crate) fn new(
        value: Arc<V>,
        weight: u32,
        created_at_nanos: u64,
        expire_write_at_nanos: Option<u64>,
    ) -> Self {
        Self {
            value,
            weight,
            created_at_nanos,
            expire_write_at_nanos,
            last_access_nanos: AtomicU64::new(created_at_nanos),
            node_id: AtomicU32::new(u32::MAX),
            refresh_in_flight: AtomicBool::new(false),
            loaded_at_nanos: AtomicI64::new(created_at_nanos as i64),
        }
    }

    pub(crate) fn node_id(&self) -> u32 {
        self.node_id.load(Ordering::Acquire)
    }

    pub(crate) fn set_node_id(&self, id: u32) {
        self.node_id.store(id, Ordering::Release);
    }

    pub(crate) fn last_access_nanos(&self) -> u64 {
        self.last_access_nanos.load(Ordering::Relaxed)
    }

    pub(crate) fn touch(&self, now_nanos: u64) {
        self.last_access_nanos.store(now_nanos, Ordering::Relaxed);
    }

    pub(crate) fn is_expired_by_write(&self, now_nanos: u64) -> bool {
        matches!(self.expire_write_at_nanos, Some(deadline) if now_nanos >= deadline)
    }

    pub(crate) fn is_expired_by_access(&self, now_nanos: u64, tti_nanos: Option<u64>) -> bool {
        match tti_nanos {
            Some(tti) => now_nanos.saturating_sub(self.last_access_nanos()) >= tti,
            None => false,
        }
    }

    pub(crate) fn loaded_at_nanos(&self) -> i64 {
        self.loaded_at_nanos.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_loaded(&self, now_nanos: u64) {
        self.loaded_at_nanos.store(now_nanos as i64, Ordering::Relaxed);
    }

    pub(crate) fn try_start_refresh(&self) -> bool {
        self.refresh_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn finish_refresh(&self) {
        self.refresh_in_flight.store(false, Ordering::Release);
    }
}
