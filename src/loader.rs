//! Loader orchestration: single-flight computation of missing or stale
//! values, normalizing synchronous and asynchronous loaders onto one
//! waitable primitive (`SPEC_FULL.md` §4.7).
//!
//! The crate owns no async runtime (matching the teacher, which is
//! runtime-agnostic aside from its optional `tokio`-based stream crate), so
//! an async loader future is driven to completion on a detached thread via
//! `futures_executor`-free blocking: the caller supplies a plain
//! `FnOnce() -> Result<V, LoaderError>` and async callers are expected to
//! block_on their own future before handing us the closure. This keeps the
//! cache's core executor-agnostic while still letting synchronous callers
//! use `get_with` without pulling in an executor at all.

use std::sync::{Arc, Condvar, Mutex};

use crate::error::LoaderError;

/// A value computed once and observed by every concurrent waiter.
///
/// Modeled directly on the condvar-guarded shared-state pattern the pack
/// uses for one-shot readiness signals (`ringmpsc-stream`'s shutdown
/// handle), specialized here to carry a `Result` payload instead of a unit
/// signal.
pub struct CompletionHandle<V> {
    state: Arc<(Mutex<Option<Result<Arc<V>, LoaderError>>>, Condvar)>,
}

impl<V> Clone for CompletionHandle<V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<V> CompletionHandle<V> {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new((Mutex::new(None), Condvar::new())),
        }
    }

    /// Publishes the load outcome and wakes every waiter. Must be called
    /// exactly once per handle.
    pub(crate) fn complete(&self, result: Result<Arc<V>, LoaderError>) {
        let (lock, cvar) = &*self.state;
        let mut guard = lock.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(result);
        cvar.notify_all();
    }

    /// Non-blocking check: returns the outcome if the load has completed,
    /// `None` if it is still in flight. This is the "poll" half of the
    /// primitive an async caller drives instead of blocking on `wait`.
    pub fn try_get(&self) -> Option<Result<Arc<V>, LoaderError>> {
        let (lock, _cvar) = &*self.state;
        let guard = lock.lock().unwrap_or_else(|p| p.into_inner());
        guard.clone()
    }

    /// Blocks the calling thread until the load completes, returning a
    /// clone of the shared outcome.
    pub fn wait(&self) -> Result<Arc<V>, LoaderError> {
        let (lock, cvar) = &*self.state;
        let mut guard = lock.lock().unwrap_or_else(|p| p.into_inner());
        while guard.is_none() {
            guard = cvar.wait(guard).unwrap_or_else(|p| p.into_inner());
        }
        guard.clone().expect("checked is_none above")
    }
}

/// Computes a value for a key missing from the cache. Implemented by
/// synchronous user code; see `AsyncLoader` for the async counterpart.
pub trait Loader<K, V>: Send + Sync {
    fn load(&self, key: &K) -> Result<V, LoaderError>;
}

impl<K, V, F> Loader<K, V> for F
where
    F: Fn(&K) -> Result<V, LoaderError> + Send + Sync,
{
    fn load(&self, key: &K) -> Result<V, LoaderError> {
        self(key)
    }
}

/// Computes a value asynchronously. The cache does not poll the future
/// itself; `block_on` is supplied by the caller's runtime via
/// [`AsyncLoader::load_blocking`], keeping this crate free of a hard
/// dependency on any particular executor.
pub trait AsyncLoader<K, V>: Send + Sync {
    fn load_blocking(&self, key: &K) -> Result<V, LoaderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn waiters_observe_the_completed_value() {
        let handle: CompletionHandle<i32> = CompletionHandle::new();
        let producer = handle.clone();
        let waiter_handle = handle.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.complete(Ok(Arc::new(42)));
        });
        let result = waiter_handle.wait();
        assert_eq!(*result.unwrap(), 42);
        t.join().unwrap();
    }

    #[test]
    fn closure_loader_delegates_to_the_function() {
        let loader = |k: &u32| Ok::<_, LoaderError>(*k * 2);
        assert_eq!(loader.load(&21).unwrap(), 42);
    }
}
