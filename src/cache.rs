//! The public `Cache<K, V, S>` handle tying together the table, the
//! W-TinyLFU policy, the striped access buffer, the drain coordinator, the
//! expiration engine, the loader orchestrator, statistics, and listeners
//! (`SPEC_FULL.md` §6).

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::builder::CacheBuilder;
use crate::buffer::StripedBuffer;
use crate::drain::DrainCoordinator;
use crate::entry::Entry;
use crate::error::LoaderError;
use crate::expiration::ExpirationEngine;
use crate::key::hash_key;
use crate::listener::{CacheEventListener, EvictReason};
use crate::loader::{AsyncLoader, CompletionHandle, Loader};
use crate::maintenance::MaintenanceHandle;
use crate::policy::Policy;
use crate::record::AccessRecord;
use crate::stats::{CacheStats, StatsCounters};
use crate::table::Table;
use crate::views::{EntriesView, KeysView, ValuesView};

/// Identifier returned by `Cache::add_listener`, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Monotonic clock used for every internal deadline comparison
/// (`SPEC_FULL.md` §9 Design Notes: wall-clock is never read on an internal
/// path).
struct Clock {
    epoch: Instant,
}

impl Clock {
    fn new() -> Self {
        Self { epoch: Instant::now() }
    }

    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

type Weigher<K, V> = Arc<dyn Fn(&K, &V) -> u32 + Send + Sync>;

/// Soft trigger: a stripe is considered "pressured" once it's a quarter
/// full, well before `ArrayQueue` would start dropping records.
const DRAIN_TRIGGER_FRACTION_DIVISOR: usize = 4;
const MAX_DRAIN_PASSES_PER_TRIGGER: usize = 16;
const MAINTENANCE_TICK_INTERVAL: Duration = Duration::from_millis(100);
const STRIPE_CAPACITY: usize = 256;

struct CacheInner<K, V, S> {
    table: Table<K, V, S>,
    policy: Mutex<Policy<K>>,
    buffer: StripedBuffer<K>,
    drain_coordinator: DrainCoordinator,
    expiration: Mutex<ExpirationEngine<K>>,
    stats: StatsCounters,
    record_stats: bool,
    listeners: Mutex<Vec<(u64, Arc<dyn CacheEventListener<K, V>>)>>,
    next_listener_id: AtomicU64,
    build_hasher: S,
    weigher: Option<Weigher<K, V>>,
    maximum_weight: Option<u64>,
    total_weight: AtomicU64,
    expire_after_access_nanos: Option<u64>,
    refresh_after_write_nanos: Option<u64>,
    loader: Option<Arc<dyn Loader<K, V>>>,
    async_loader: Option<Arc<dyn AsyncLoader<K, V>>>,
    inflight: DashMap<Arc<K>, CompletionHandle<V>, S>,
    clock: Clock,
    maintenance: Mutex<Option<MaintenanceHandle>>,
}

impl<K, V, S> CacheInner<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn hash_of(&self, key: &K) -> u64 {
        hash_key(&self.build_hasher, key)
    }

    fn maybe_trigger_drain(&self) {
        let threshold = STRIPE_CAPACITY / DRAIN_TRIGGER_FRACTION_DIVISOR;
        if !self.buffer.any_stripe_over_threshold(threshold) {
            return;
        }
        self.run_drain();
    }

    fn run_drain(&self) {
        let ran = self.drain_coordinator.drain_if_owner(|| {
            for _ in 0..MAX_DRAIN_PASSES_PER_TRIGGER {
                let drained = self.drain_one_pass();
                if drained == 0 {
                    break;
                }
            }
        });
        if ran.is_none() {
            // Someone else is already draining; give them a bounded window
            // to finish so this thread doesn't act on a stale policy view.
            self.drain_coordinator.await_idle();
        }
    }

    fn drain_one_pass(&self) -> usize {
        let mut policy = self.policy.lock();
        let mut evicted = Vec::new();
        let drained = self.buffer.drain_into(STRIPE_CAPACITY, |record| {
            match record.kind {
                crate::record::AccessKind::Read => {
                    policy.record_access(record.hash);
                    if let Some(entry) = self.table.get(&record.key) {
                        let node_id = entry.node_id();
                        if node_id != u32::MAX {
                            policy.on_read(node_id);
                        }
                    }
                }
                crate::record::AccessKind::Write => {
                    policy.record_access(record.hash);
                    if let Some(entry) = self.table.get(&record.key) {
                        if entry.node_id() == u32::MAX {
                            let decision = policy.insert(Arc::clone(&record.key), record.hash);
                            entry.set_node_id(decision.node_id);
                            if let Some((victim_key, _victim_hash, reason)) = decision.evicted {
                                evicted.push((victim_key, reason.into()));
                            }
                        }
                    }
                }
                crate::record::AccessKind::Evict => {
                    tracing::trace!(
                        hash = record.hash,
                        timestamp_nanos = record.timestamp_nanos,
                        "observed out-of-band evict record"
                    );
                }
            }
        });
        drop(policy);

        for (key, reason) in evicted {
            self.finish_eviction(&key, reason);
        }

        drained
    }

    fn finish_eviction(&self, key: &K, reason: EvictReason) {
        if let Some((key_arc, entry)) = self.table.remove(key) {
            self.total_weight.fetch_sub(u64::from(entry.weight), Ordering::Relaxed);
            if self.record_stats {
                self.stats.record_eviction();
            }
            let hash = self.hash_of(&key_arc);
            self.buffer.record(AccessRecord::evict(Arc::clone(&key_arc), hash, self.clock.now_nanos()));
            self.fire_on_evict(&key_arc, &entry.value, reason);
            self.enforce_weight_bound();
        }
    }

    /// Weight-bound backstop (`SPEC_FULL.md` §9 Open Question resolution,
    /// documented in DESIGN.md): the node-count-based W-TinyLFU policy
    /// does not itself reason about weight, so once the normal admission
    /// pass finishes, evict additional cold entries until total weight is
    /// back under `maximum_weight`.
    fn enforce_weight_bound(&self) {
        let Some(maximum_weight) = self.maximum_weight else {
            return;
        };
        loop {
            if self.total_weight.load(Ordering::Relaxed) <= maximum_weight {
                return;
            }
            let victim = self.policy.lock().evict_coldest();
            let Some((victim_key, _hash)) = victim else {
                return;
            };
            if let Some((key_arc, entry)) = self.table.remove(&victim_key) {
                self.total_weight.fetch_sub(u64::from(entry.weight), Ordering::Relaxed);
                if self.record_stats {
                    self.stats.record_eviction();
                }
                let hash = self.hash_of(&key_arc);
                self.buffer.record(AccessRecord::evict(Arc::clone(&key_arc), hash, self.clock.now_nanos()));
                self.fire_on_evict(&key_arc, &entry.value, EvictReason::Weight);
            }
        }
    }

    fn insert_internal(&self, key: Arc<K>, value: Arc<V>, weight: u32) {
        let now = self.clock.now_nanos();
        let hash = self.hash_of(&key);
        let expire_at = self.expiration.lock().write_deadline(now);
        let entry = Arc::new(Entry::new(Arc::clone(&value), weight, now, expire_at));
        entry.mark_loaded(now);

        let previous = self.table.insert(Arc::clone(&key), Arc::clone(&entry));
        if let Some(previous) = previous {
            self.total_weight.fetch_sub(u64::from(previous.weight), Ordering::Relaxed);
            let node_id = previous.node_id();
            if node_id != u32::MAX {
                self.policy.lock().remove(node_id);
            }
            self.fire_on_evict(&key, &previous.value, EvictReason::Replaced);
        }
        self.total_weight.fetch_add(u64::from(weight), Ordering::Relaxed);

        if let Some(deadline) = expire_at {
            self.expiration.lock().track_write(Arc::clone(&key), hash, deadline);
        }

        self.buffer.record(AccessRecord::write(Arc::clone(&key), hash, now));
        self.maybe_trigger_drain();
        self.enforce_weight_bound();
        self.fire_on_put(&key, &value);
    }

    fn remove_internal(&self, key: &K) -> Option<Arc<V>> {
        let (key_arc, entry) = self.table.remove(key)?;
        self.total_weight.fetch_sub(u64::from(entry.weight), Ordering::Relaxed);
        let node_id = entry.node_id();
        if node_id != u32::MAX {
            self.policy.lock().remove(node_id);
        }
        self.fire_on_remove(&key_arc, &entry.value);
        Some(Arc::clone(&entry.value))
    }

    /// Removes `key_arc` from the table only if it is still mapped to
    /// `expected` (`Table::remove_if_same`), so a write-order or
    /// idle-scan candidate that was re-put with a fresher deadline since
    /// it was queued for expiration is never evicted out from under the
    /// newer entry. Returns whether the removal actually happened.
    fn remove_expired_if_same(&self, key_arc: &Arc<K>, expected: &Arc<Entry<V>>) -> bool {
        if !self.table.remove_if_same(key_arc, expected) {
            return false;
        }
        self.total_weight.fetch_sub(u64::from(expected.weight), Ordering::Relaxed);
        let node_id = expected.node_id();
        if node_id != u32::MAX {
            self.policy.lock().remove(node_id);
        }
        self.fire_on_expire(key_arc, &expected.value);
        true
    }

    fn get_entry_checked(&self, key: &K) -> Option<(Arc<K>, Arc<Entry<V>>)> {
        let now = self.clock.now_nanos();
        let (key_arc, entry) = self.table.get_with_key(key)?;

        if entry.is_expired_by_write(now) || entry.is_expired_by_access(now, self.expire_after_access_nanos) {
            self.remove_expired_if_same(&key_arc, &entry);
            return None;
        }

        entry.touch(now);
        let hash = self.hash_of(key);
        self.buffer.record(AccessRecord::read(Arc::clone(&key_arc), hash, now));
        self.maybe_trigger_drain();
        Some((key_arc, entry))
    }

    fn run_maintenance_tick(&self) {
        self.maybe_trigger_drain();
        let now = self.clock.now_nanos();

        let mut expired_by_write = Vec::new();
        {
            let mut expiration = self.expiration.lock();
            let budget = expiration.scan_budget_per_region();
            expiration.drain_expired_by_write(now, budget, |key, _hash| expired_by_write.push(key));
        }
        for key_arc in expired_by_write {
            // The write-order slot only records that *a* deadline for this
            // key elapsed; a later `put()` for the same key installs a
            // fresh entry with its own, later deadline without removing
            // the stale slot. Re-check the entry actually resident now
            // before evicting it.
            if let Some((current_key_arc, entry)) = self.table.get_with_key(&key_arc) {
                if entry.is_expired_by_write(now) {
                    self.remove_expired_if_same(&current_key_arc, &entry);
                }
            }
        }

        if let Some(tti) = self.expire_after_access_nanos {
            let budget = self.expiration.lock().scan_budget_per_region();
            let candidates = self.policy.lock().coldest_candidates(budget);
            for (key, _hash, _node_id) in candidates {
                if let Some((key_arc, entry)) = self.table.get_with_key(&key) {
                    if entry.is_expired_by_access(now, Some(tti)) {
                        self.remove_expired_if_same(&key_arc, &entry);
                    }
                }
            }
        }
    }

    /// Runs one listener callback, isolating a panic inside it so a single
    /// misbehaving listener can neither poison the data path it was
    /// invoked from nor take down other listeners (`SPEC_FULL.md` §7:
    /// "listener failure is isolated per listener; the cache logs and
    /// continues").
    fn guard_listener_call(&self, listener_id: u64, call: impl FnOnce() + std::panic::UnwindSafe) {
        if let Err(payload) = std::panic::catch_unwind(call) {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "<non-string panic payload>".to_owned());
            tracing::error!(listener_id, message = %message, "cache event listener panicked");
        }
    }

    fn fire_on_put(&self, key: &Arc<K>, value: &Arc<V>) {
        for (id, listener) in self.listeners.lock().iter() {
            self.guard_listener_call(*id, std::panic::AssertUnwindSafe(|| listener.on_put(key, value)));
        }
    }

    fn fire_on_remove(&self, key: &Arc<K>, value: &Arc<V>) {
        for (id, listener) in self.listeners.lock().iter() {
            self.guard_listener_call(*id, std::panic::AssertUnwindSafe(|| listener.on_remove(key, value)));
        }
    }

    fn fire_on_evict(&self, key: &Arc<K>, value: &Arc<V>, reason: EvictReason) {
        for (id, listener) in self.listeners.lock().iter() {
            self.guard_listener_call(*id, std::panic::AssertUnwindSafe(|| listener.on_evict(key, value, reason)));
        }
    }

    fn fire_on_expire(&self, key: &Arc<K>, value: &Arc<V>) {
        for (id, listener) in self.listeners.lock().iter() {
            self.guard_listener_call(*id, std::panic::AssertUnwindSafe(|| listener.on_expire(key, value)));
        }
    }

    fn fire_on_load(&self, key: &Arc<K>) {
        for (id, listener) in self.listeners.lock().iter() {
            self.guard_listener_call(*id, std::panic::AssertUnwindSafe(|| listener.on_load(key)));
        }
    }

    fn fire_on_load_error(&self, key: &Arc<K>, error: &LoaderError) {
        tracing::warn!(?error, "loader failed");
        for (id, listener) in self.listeners.lock().iter() {
            self.guard_listener_call(*id, std::panic::AssertUnwindSafe(|| listener.on_load_error(key, error)));
        }
    }

    fn fire_on_clear(&self) {
        for (id, listener) in self.listeners.lock().iter() {
            self.guard_listener_call(*id, std::panic::AssertUnwindSafe(|| listener.on_clear()));
        }
    }
}

/// A bounded, concurrent key/value cache with W-TinyLFU eviction.
///
/// Cheap to clone: every clone shares the same underlying table, policy,
/// and maintenance thread (mirrors the teacher's `Channel<T>` and
/// `moka::sync::Cache` clone semantics).
pub struct Cache<K, V, S = RandomState> {
    inner: Arc<CacheInner<K, V, S>>,
}

impl<K, V, S> Clone for Cache<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Cache<K, V, RandomState>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn builder() -> CacheBuilder<K, V, RandomState> {
        CacheBuilder::new()
    }
}

impl<K, V, S> Cache<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub(crate) fn from_builder(builder: CacheBuilder<K, V, S>) -> Self {
        let maximum_size = builder.maximum_size_or_default();
        let sketch_capacity = maximum_size.max(16) as usize;
        let build_hasher = builder.build_hasher_value();
        let initial_capacity = builder.initial_capacity_value();
        let concurrency_level = builder.concurrency_level_value();
        let expire_after_write_nanos = builder.expire_after_write_value().map(|d| d.as_nanos() as u64);
        let expire_after_access_nanos = builder.expire_after_access_value().map(|d| d.as_nanos() as u64);
        let refresh_after_write_nanos = builder.refresh_after_write_value().map(|d| d.as_nanos() as u64);
        let listeners = builder
            .listeners_value()
            .into_iter()
            .enumerate()
            .map(|(i, l)| (i as u64, l))
            .collect::<Vec<_>>();
        let next_listener_id = listeners.len() as u64;

        let inner = Arc::new_cyclic(|weak: &Weak<CacheInner<K, V, S>>| {
            let weak_for_tick = weak.clone();
            let maintenance = MaintenanceHandle::spawn(MAINTENANCE_TICK_INTERVAL, move || {
                if let Some(inner) = weak_for_tick.upgrade() {
                    inner.run_maintenance_tick();
                }
            });

            CacheInner {
                table: Table::with_capacity_and_concurrency(initial_capacity, concurrency_level, build_hasher.clone()),
                policy: Mutex::new(Policy::new(maximum_size as usize, sketch_capacity)),
                buffer: StripedBuffer::new(StripedBuffer::<K>::default_stripe_count(), STRIPE_CAPACITY),
                drain_coordinator: DrainCoordinator::new(),
                expiration: Mutex::new(ExpirationEngine::new(expire_after_write_nanos, maximum_size as usize)),
                stats: StatsCounters::new(),
                record_stats: builder.record_stats_value(),
                listeners: Mutex::new(listeners),
                next_listener_id: AtomicU64::new(next_listener_id),
                build_hasher: build_hasher.clone(),
                weigher: builder.weigher_fn(),
                maximum_weight: builder.maximum_weight_value(),
                total_weight: AtomicU64::new(0),
                expire_after_access_nanos,
                refresh_after_write_nanos,
                loader: builder.loader_value(),
                async_loader: builder.async_loader_value(),
                inflight: DashMap::with_hasher(build_hasher),
                clock: Clock::new(),
                maintenance: Mutex::new(Some(maintenance)),
            }
        });

        Self { inner }
    }

    fn weight_of(&self, key: &K, value: &V) -> u32 {
        self.inner.weigher.as_ref().map_or(1, |w| w(key, value))
    }

    /// Inserts or replaces a value for `key`.
    pub fn put(&self, key: K, value: V) {
        let weight = self.weight_of(&key, &value);
        self.inner.insert_internal(Arc::new(key), Arc::new(value), weight);
    }

    /// Looks up `key`, invoking the builder-configured loader on a miss.
    /// Returns `None` on a miss with no loader configured, or if the
    /// loader fails.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        if let Some((key_arc, entry)) = self.inner.get_entry_checked(key) {
            if self.inner.record_stats {
                self.inner.stats.record_hit();
            }
            self.maybe_dispatch_refresh(&key_arc, &entry);
            return Some(Arc::clone(&entry.value));
        }
        if self.inner.record_stats {
            self.inner.stats.record_miss();
        }
        let loader = self.inner.loader.clone()?;
        self.load_single_flight(key, move |k| loader.load(k)).ok()
    }

    /// Looks up `key`, never invoking a loader.
    pub fn get_if_present(&self, key: &K) -> Option<Arc<V>> {
        match self.inner.get_entry_checked(key) {
            Some((key_arc, entry)) => {
                if self.inner.record_stats {
                    self.inner.stats.record_hit();
                }
                self.maybe_dispatch_refresh(&key_arc, &entry);
                Some(Arc::clone(&entry.value))
            }
            None => {
                if self.inner.record_stats {
                    self.inner.stats.record_miss();
                }
                None
            }
        }
    }

    /// Looks up `key`, invoking `loader` on a miss (single-flight: a second
    /// call for the same key while a load is in progress waits on the
    /// first rather than invoking `loader` again).
    pub fn get_with(
        &self,
        key: &K,
        loader: impl Fn(&K) -> Result<V, LoaderError>,
    ) -> Result<Arc<V>, LoaderError> {
        if let Some((key_arc, entry)) = self.inner.get_entry_checked(key) {
            if self.inner.record_stats {
                self.inner.stats.record_hit();
            }
            self.maybe_dispatch_refresh(&key_arc, &entry);
            return Ok(Arc::clone(&entry.value));
        }
        if self.inner.record_stats {
            self.inner.stats.record_miss();
        }
        self.load_single_flight(key, loader)
    }

    fn load_single_flight(
        &self,
        key: &K,
        loader: impl FnOnce(&K) -> Result<V, LoaderError>,
    ) -> Result<Arc<V>, LoaderError> {
        let key_arc = Arc::new(key.clone());

        let handle = match self.inner.inflight.entry(Arc::clone(&key_arc)) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => {
                return occupied.get().clone().wait();
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let handle = CompletionHandle::new();
                vacant.insert(handle.clone());
                handle
            }
        };

        let start = self.inner.clock.now_nanos();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| loader(key)))
            .unwrap_or_else(|_| Err(LoaderError::Panicked));
        let elapsed = self.inner.clock.now_nanos().saturating_sub(start);

        let outcome = match result {
            Ok(value) => {
                let value_arc = Arc::new(value);
                if self.inner.record_stats {
                    self.inner.stats.record_load_success(elapsed);
                }
                let weight = self.weight_of(key, &value_arc);
                self.inner.insert_internal(Arc::clone(&key_arc), Arc::clone(&value_arc), weight);
                self.inner.fire_on_load(&key_arc);
                Ok(value_arc)
            }
            Err(err) => {
                if self.inner.record_stats {
                    self.inner.stats.record_load_failure(elapsed);
                }
                self.inner.fire_on_load_error(&key_arc, &err);
                Err(err)
            }
        };

        self.inner.inflight.remove(&key_arc);
        handle.complete(outcome.clone());
        outcome
    }

    fn maybe_dispatch_refresh(&self, key_arc: &Arc<K>, entry: &Arc<Entry<V>>) {
        let Some(loader) = self.inner.loader.clone() else {
            return;
        };
        let now = self.inner.clock.now_nanos();
        let refresh_after = self.inner.refresh_after_write_nanos;
        let inner = Arc::clone(&self.inner);
        let key_for_thread = Arc::clone(key_arc);
        let entry_for_thread = Arc::clone(entry);

        crate::refresh::dispatch_if_due(entry, now, refresh_after, move || {
            let start = inner.clock.now_nanos();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| loader.load(&key_for_thread)))
                .unwrap_or_else(|_| Err(LoaderError::Panicked));
            let elapsed = inner.clock.now_nanos().saturating_sub(start);
            match result {
                Ok(value) => {
                    if inner.record_stats {
                        inner.stats.record_load_success(elapsed);
                    }
                    let value_arc = Arc::new(value);
                    let weight = inner.weigher.as_ref().map_or(1, |w| w(&key_for_thread, &value_arc));
                    inner.insert_internal(Arc::clone(&key_for_thread), value_arc, weight);
                    inner.fire_on_load(&key_for_thread);
                    // The successful reload installed a brand-new `Entry`
                    // for this key; the stale one this closure was
                    // dispatched against is no longer reachable from the
                    // table, but its refresh gate is still released here
                    // so nothing else needs to reason about it.
                    entry_for_thread.finish_refresh();
                }
                Err(err) => {
                    if inner.record_stats {
                        inner.stats.record_load_failure(elapsed);
                    }
                    inner.fire_on_load_error(&key_for_thread, &err);
                    // On failure the old value (and this same `Entry`)
                    // remains resident until it expires, so the gate must
                    // be released or it can never be refreshed again.
                    entry_for_thread.finish_refresh();
                }
            }
        });
    }

    /// Async variant of [`Cache::get`]: dispatches work to a detached
    /// thread and returns a `CompletionHandle` the caller can block on
    /// (`.wait()`) or poll (`.try_get()`), per `SPEC_FULL.md` §4.7 — the
    /// cache owns no executor, so nothing here is a real `Future`.
    pub fn get_async(&self, key: &K) -> CompletionHandle<V>
    where
        K: Clone,
    {
        let handle = CompletionHandle::new();
        if let Some((key_arc, entry)) = self.inner.get_entry_checked(key) {
            if self.inner.record_stats {
                self.inner.stats.record_hit();
            }
            self.maybe_dispatch_refresh(&key_arc, &entry);
            handle.complete(Ok(Arc::clone(&entry.value)));
            return handle;
        }
        if self.inner.record_stats {
            self.inner.stats.record_miss();
        }
        let Some(async_loader) = self.inner.async_loader.clone() else {
            handle.complete(Err(LoaderError::from_message("no async loader configured")));
            return handle;
        };
        let cache = self.clone();
        let key_owned = key.clone();
        let completion = handle.clone();
        std::thread::spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                async_loader.load_blocking(&key_owned)
            }))
            .unwrap_or_else(|_| Err(LoaderError::Panicked));
            let key_arc = Arc::new(key_owned);
            match result {
                Ok(value) => {
                    let value_arc = Arc::new(value);
                    let weight = cache.weight_of(&key_arc, &value_arc);
                    cache
                        .inner
                        .insert_internal(Arc::clone(&key_arc), Arc::clone(&value_arc), weight);
                    cache.inner.fire_on_load(&key_arc);
                    completion.complete(Ok(value_arc));
                }
                Err(err) => {
                    cache.inner.fire_on_load_error(&key_arc, &err);
                    completion.complete(Err(err));
                }
            }
        });
        handle
    }

    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.inner.remove_internal(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.table.contains_key(key)
    }

    pub fn size(&self) -> u64 {
        self.inner.table.len() as u64
    }

    pub fn weight(&self) -> u64 {
        self.inner.total_weight.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.inner.table.clear();
        self.inner.policy.lock().clear();
        self.inner.total_weight.store(0, Ordering::Relaxed);
        self.inner.fire_on_clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    pub fn keys(&self) -> KeysView<K> {
        let mut keys = Vec::with_capacity(self.inner.table.len());
        self.inner.table.for_each(|k, _| keys.push(Arc::clone(k)));
        KeysView::new(keys)
    }

    pub fn values(&self) -> ValuesView<V> {
        let mut values = Vec::with_capacity(self.inner.table.len());
        self.inner.table.for_each(|_, e| values.push(Arc::clone(&e.value)));
        ValuesView::new(values)
    }

    pub fn entries(&self) -> EntriesView<K, V> {
        let mut entries = Vec::with_capacity(self.inner.table.len());
        self.inner
            .table
            .for_each(|k, e| entries.push((Arc::clone(k), Arc::clone(&e.value))));
        EntriesView::new(entries)
    }

    pub fn add_listener(&self, listener: impl CacheEventListener<K, V> + 'static) -> ListenerId {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        ListenerId(id)
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.inner.listeners.lock().retain(|(existing, _)| *existing != id.0);
    }

    /// Idempotent: stops the maintenance thread and drains any remaining
    /// records. Safe to call more than once.
    pub fn shutdown(&self) {
        self.inner.run_drain();
        if let Some(handle) = self.inner.maintenance.lock().take() {
            handle.shutdown();
        }
    }

    pub fn close(&self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn wait_until(mut check: impl FnMut() -> bool, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        check()
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache: Cache<String, String> = Cache::builder().maximum_size(10).build();
        cache.put("k".to_owned(), "v".to_owned());
        assert_eq!(cache.get_if_present(&"k".to_owned()).as_deref(), Some(&"v".to_owned()));
    }

    #[test]
    fn second_put_replaces_the_first() {
        let cache: Cache<String, u32> = Cache::builder().maximum_size(10).build();
        cache.put("k".to_owned(), 1);
        cache.put("k".to_owned(), 2);
        assert_eq!(cache.get_if_present(&"k".to_owned()).map(|v| *v), Some(2));
    }

    #[test]
    fn remove_then_get_is_a_miss() {
        let cache: Cache<String, u32> = Cache::builder().maximum_size(10).build();
        cache.put("k".to_owned(), 1);
        assert!(cache.remove(&"k".to_owned()).is_some());
        assert!(cache.get_if_present(&"k".to_owned()).is_none());
    }

    #[test]
    fn clear_empties_the_cache_and_is_idempotent() {
        let cache: Cache<String, u32> = Cache::builder().maximum_size(10).build();
        cache.put("a".to_owned(), 1);
        cache.put("b".to_owned(), 2);
        cache.clear();
        assert_eq!(cache.size(), 0);
        assert!(cache.get_if_present(&"a".to_owned()).is_none());
        cache.clear();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn inserting_beyond_capacity_keeps_size_bounded_after_drain() {
        let cache: Cache<u32, u32> = Cache::builder().maximum_size(3).build();
        for i in 0..50u32 {
            cache.put(i, i);
        }
        cache.shutdown();
        assert!(cache.size() <= 3);
    }

    #[test]
    fn weight_bound_is_respected_after_drain() {
        let cache: Cache<String, String> = Cache::builder()
            .maximum_weight(10)
            .weigher(|_k: &String, v: &String| v.len() as u32)
            .build();
        cache.put("x".to_owned(), "aaa".to_owned());
        cache.put("y".to_owned(), "bbbbb".to_owned());
        cache.put("z".to_owned(), "cc".to_owned());
        cache.put("w".to_owned(), "dd".to_owned());
        cache.shutdown();
        assert!(cache.weight() <= 10);
    }

    #[test]
    fn expire_after_write_evicts_on_read() {
        let cache: Cache<String, String> = Cache::builder()
            .maximum_size(10)
            .expire_after_write(Duration::from_millis(30))
            .build();
        cache.put("k".to_owned(), "v".to_owned());
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get_if_present(&"k".to_owned()).is_none());
    }

    #[test]
    fn concurrent_misses_for_the_same_key_coalesce_to_one_load() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let cache: Cache<String, String> = Cache::builder().maximum_size(10).build();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let invocations = Arc::clone(&invocations);
            handles.push(std::thread::spawn(move || {
                cache
                    .get_with(&"k".to_owned(), |_| {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(20));
                        Ok::<_, LoaderError>("v".to_owned())
                    })
                    .unwrap()
            }));
        }
        for h in handles {
            assert_eq!(*h.join().unwrap(), "v");
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hot_keys_survive_a_scan_of_cold_keys() {
        let cache: Cache<u32, u32> = Cache::builder().maximum_size(100).build();
        for _ in 0..1000 {
            for k in 0..10u32 {
                cache.put(k, k);
                cache.get_if_present(&k);
            }
        }
        for k in 10..10_000u32 {
            cache.put(k, k);
        }
        cache.shutdown();
        for k in 0..10u32 {
            assert!(cache.contains_key(&k), "hot key {k} should have survived the scan");
        }
    }

    #[test]
    fn stats_hit_and_miss_counts_sum_to_request_count() {
        let cache: Cache<u32, u32> = Cache::builder().maximum_size(10).build();
        cache.put(1, 1);
        cache.get_if_present(&1);
        cache.get_if_present(&2);
        let stats = cache.stats();
        assert_eq!(stats.hit_count + stats.miss_count, stats.request_count());
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
    }

    #[test]
    fn listener_is_notified_on_eviction_by_weight() {
        struct Counter(AtomicUsize);
        impl CacheEventListener<String, String> for Arc<Counter> {
            fn on_evict(&self, _key: &Arc<String>, _value: &Arc<String>, reason: EvictReason) {
                if reason == EvictReason::Weight {
                    self.0.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let cache: Cache<String, String> = Cache::builder()
            .maximum_weight(4)
            .weigher(|_k: &String, v: &String| v.len() as u32)
            .listener(Arc::clone(&counter))
            .build();
        cache.put("a".to_owned(), "aa".to_owned());
        cache.put("b".to_owned(), "aa".to_owned());
        cache.put("c".to_owned(), "aa".to_owned());
        cache.shutdown();
        assert!(counter.0.load(Ordering::SeqCst) >= 1);
        let _ = wait_until(|| true, Duration::from_millis(1));
    }
}
