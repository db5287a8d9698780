//! `CacheBuilder`: explicit configuration fields plus named profile presets
//! that individual setters can still override afterward.
//!
//! Grounded on the teacher's `Config` / `LOW_LATENCY_CONFIG` /
//! `HIGH_THROUGHPUT_CONFIG` pattern (a plain struct with a couple of named
//! const presets), generalized here into an enum of presets applied through
//! a builder method so a caller can layer explicit overrides on top.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::listener::CacheEventListener;
use crate::loader::{AsyncLoader, Loader};

/// Named starting points for common cache shapes. Applying a profile sets
/// every field it covers; setter calls made afterward still win.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Balanced defaults; what `CacheBuilder::new()` starts from anyway.
    Default,
    /// Few writes, many repeated reads: larger protected segment bias via a
    /// bigger overall size, no expiration.
    ReadHeavy,
    /// Frequent overwrites of the same keys: shorter TTL, smaller size.
    WriteHeavy,
    /// User/HTTP session storage: expire-after-access dominates.
    Session,
    /// Request/response memoization: short TTL, refresh-ahead enabled.
    Api,
    /// Expensive derived computations: long TTL, refresh-after-write.
    Compute,
    /// Favor a small footprint over hit rate.
    MemoryEfficient,
    /// Favor throughput: larger size, no expiration overhead.
    HighPerformance,
}

type Weigher<K, V> = Arc<dyn Fn(&K, &V) -> u32 + Send + Sync>;

pub struct CacheBuilder<K, V, S = RandomState> {
    maximum_size: Option<u64>,
    maximum_weight: Option<u64>,
    weigher: Option<Weigher<K, V>>,
    initial_capacity: Option<usize>,
    expire_after_write: Option<Duration>,
    expire_after_access: Option<Duration>,
    refresh_after_write: Option<Duration>,
    build_hasher: S,
    listeners: Vec<Arc<dyn CacheEventListener<K, V>>>,
    loader: Option<Arc<dyn Loader<K, V>>>,
    async_loader: Option<Arc<dyn AsyncLoader<K, V>>>,
    record_stats: bool,
    concurrency_level: Option<usize>,
}

impl<K, V> CacheBuilder<K, V, RandomState>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            maximum_size: None,
            maximum_weight: None,
            weigher: None,
            initial_capacity: None,
            expire_after_write: None,
            expire_after_access: None,
            refresh_after_write: None,
            build_hasher: RandomState::new(),
            listeners: Vec::new(),
            loader: None,
            async_loader: None,
            record_stats: true,
            concurrency_level: None,
        }
    }
}

impl<K, V> Default for CacheBuilder<K, V, RandomState>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> CacheBuilder<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub fn maximum_size(mut self, maximum_size: u64) -> Self {
        self.maximum_size = Some(maximum_size);
        self
    }

    pub fn maximum_weight(mut self, maximum_weight: u64) -> Self {
        self.maximum_weight = Some(maximum_weight);
        self
    }

    pub fn weigher(mut self, weigher: impl Fn(&K, &V) -> u32 + Send + Sync + 'static) -> Self {
        self.weigher = Some(Arc::new(weigher));
        self
    }

    pub fn initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = Some(initial_capacity);
        self
    }

    pub fn expire_after_write(mut self, duration: Duration) -> Self {
        self.expire_after_write = Some(duration);
        self
    }

    pub fn expire_after_access(mut self, duration: Duration) -> Self {
        self.expire_after_access = Some(duration);
        self
    }

    pub fn refresh_after_write(mut self, duration: Duration) -> Self {
        self.refresh_after_write = Some(duration);
        self
    }

    pub fn listener(mut self, listener: impl CacheEventListener<K, V> + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Sets the default synchronous loader used by `Cache::get` on a miss.
    pub fn loader(mut self, loader: impl Loader<K, V> + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Sets the default asynchronous loader used by `Cache::get_async` on a
    /// miss.
    pub fn async_loader(mut self, loader: impl AsyncLoader<K, V> + 'static) -> Self {
        self.async_loader = Some(Arc::new(loader));
        self
    }

    pub fn record_stats(mut self, record_stats: bool) -> Self {
        self.record_stats = record_stats;
        self
    }

    /// Hints at the expected number of concurrently-writing threads. Used
    /// to size the concurrent table's internal sharding.
    pub fn concurrency_level(mut self, concurrency_level: usize) -> Self {
        self.concurrency_level = Some(concurrency_level);
        self
    }

    pub fn build_hasher<S2>(self, build_hasher: S2) -> CacheBuilder<K, V, S2>
    where
        S2: BuildHasher + Clone + Send + Sync + 'static,
    {
        CacheBuilder {
            maximum_size: self.maximum_size,
            maximum_weight: self.maximum_weight,
            weigher: self.weigher,
            initial_capacity: self.initial_capacity,
            expire_after_write: self.expire_after_write,
            expire_after_access: self.expire_after_access,
            refresh_after_write: self.refresh_after_write,
            build_hasher,
            listeners: self.listeners,
            loader: self.loader,
            async_loader: self.async_loader,
            record_stats: self.record_stats,
            concurrency_level: self.concurrency_level,
        }
    }

    /// Applies a named preset. Call this before any explicit setters you
    /// want to take precedence.
    pub fn profile(mut self, profile: Profile) -> Self {
        match profile {
            Profile::Default => {}
            Profile::ReadHeavy => {
                self.maximum_size = Some(self.maximum_size.unwrap_or(100_000));
            }
            Profile::WriteHeavy => {
                self.maximum_size = Some(self.maximum_size.unwrap_or(10_000));
                self.expire_after_write = Some(Duration::from_secs(60));
            }
            Profile::Session => {
                self.maximum_size = Some(self.maximum_size.unwrap_or(50_000));
                self.expire_after_access = Some(Duration::from_secs(30 * 60));
            }
            Profile::Api => {
                self.maximum_size = Some(self.maximum_size.unwrap_or(20_000));
                self.expire_after_write = Some(Duration::from_secs(5 * 60));
                self.refresh_after_write = Some(Duration::from_secs(4 * 60));
            }
            Profile::Compute => {
                self.maximum_size = Some(self.maximum_size.unwrap_or(5_000));
                self.expire_after_write = Some(Duration::from_secs(60 * 60));
                self.refresh_after_write = Some(Duration::from_secs(45 * 60));
            }
            Profile::MemoryEfficient => {
                self.maximum_size = Some(self.maximum_size.unwrap_or(1_000));
            }
            Profile::HighPerformance => {
                self.maximum_size = Some(self.maximum_size.unwrap_or(1_000_000));
            }
        }
        self
    }

    pub fn build(self) -> Cache<K, V, S> {
        Cache::from_builder(self)
    }

    pub(crate) fn maximum_size_or_default(&self) -> u64 {
        self.maximum_size.unwrap_or(10_000)
    }

    pub(crate) fn maximum_weight_value(&self) -> Option<u64> {
        self.maximum_weight
    }

    pub(crate) fn weigher_fn(&self) -> Option<Weigher<K, V>> {
        self.weigher.clone()
    }

    pub(crate) fn initial_capacity_value(&self) -> usize {
        self.initial_capacity.unwrap_or(16)
    }

    pub(crate) fn expire_after_write_value(&self) -> Option<Duration> {
        self.expire_after_write
    }

    pub(crate) fn expire_after_access_value(&self) -> Option<Duration> {
        self.expire_after_access
    }

    pub(crate) fn refresh_after_write_value(&self) -> Option<Duration> {
        self.refresh_after_write
    }

    pub(crate) fn build_hasher_value(&self) -> S {
        self.build_hasher.clone()
    }

    pub(crate) fn listeners_value(&self) -> Vec<Arc<dyn CacheEventListener<K, V>>> {
        self.listeners.clone()
    }

    pub(crate) fn loader_value(&self) -> Option<Arc<dyn Loader<K, V>>> {
        self.loader.clone()
    }

    pub(crate) fn async_loader_value(&self) -> Option<Arc<dyn AsyncLoader<K, V>>> {
        self.async_loader.clone()
    }

    pub(crate) fn record_stats_value(&self) -> bool {
        self.record_stats
    }

    pub(crate) fn concurrency_level_value(&self) -> usize {
        self.concurrency_level.unwrap_or_else(num_cpus::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_sets_defaults_that_explicit_setters_can_override() {
        let builder: CacheBuilder<String, String> =
            CacheBuilder::new().profile(Profile::Session).maximum_size(123);
        assert_eq!(builder.maximum_size_or_default(), 123);
        assert!(builder.expire_after_access_value().is_some());
    }

    #[test]
    fn default_maximum_size_is_applied_when_unset() {
        let builder: CacheBuilder<String, String> = CacheBuilder::new();
        assert_eq!(builder.maximum_size_or_default(), 10_000);
    }
}
