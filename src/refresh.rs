//! Lazy `refresh_after_write` trigger (`SPEC_FULL.md` §4.6).
//!
//! A read that finds a stale-but-not-yet-expired value returns it
//! immediately and, at most once per staleness window, dispatches a
//! reload on a detached thread so the next reader sees a fresh value
//! without ever blocking on this one's read. `Entry::try_start_refresh`
//! provides the single-flight gate.

use std::sync::Arc;

use crate::entry::Entry;

pub(crate) fn is_due_for_refresh<V>(
    entry: &Entry<V>,
    now_nanos: u64,
    refresh_after_write_nanos: Option<u64>,
) -> bool {
    match refresh_after_write_nanos {
        Some(threshold) => {
            let loaded_at = entry.loaded_at_nanos().max(0) as u64;
            now_nanos.saturating_sub(loaded_at) >= threshold
        }
        None => false,
    }
}

/// Attempts to claim the single-flight refresh slot on `entry` and, if
/// successful, runs `reload` on a detached thread. Returns `true` if a
/// reload was actually dispatched by this call.
///
/// The maintenance thread must never be the one blocked on `reload`
/// (loaders are arbitrary user code), hence the detached
/// `std::thread::spawn` rather than running it inline.
pub(crate) fn dispatch_if_due<V>(
    entry: &Arc<Entry<V>>,
    now_nanos: u64,
    refresh_after_write_nanos: Option<u64>,
    reload: impl FnOnce() + Send + 'static,
) -> bool
where
    V: Send + Sync + 'static,
{
    if !is_due_for_refresh(entry, now_nanos, refresh_after_write_nanos) {
        return false;
    }
    if !entry.try_start_refresh() {
        return false;
    }
    std::thread::spawn(reload);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn not_due_without_a_configured_threshold() {
        let entry = Arc::new(Entry::new(Arc::new(1u32), 1, 0, None));
        assert!(!is_due_for_refresh(&entry, 1_000_000, None));
    }

    #[test]
    fn due_once_threshold_elapsed_and_dispatch_is_single_flight() {
        let entry = Arc::new(Entry::new(Arc::new(1u32), 1, 0, None));
        assert!(is_due_for_refresh(&entry, 1_000, Some(500)));

        let ran = Arc::new(AtomicBool::new(false));
        let ran1 = Arc::clone(&ran);
        let dispatched_first = dispatch_if_due(&entry, 1_000, Some(500), move || {
            ran1.store(true, Ordering::SeqCst);
        });
        assert!(dispatched_first);

        let dispatched_second = dispatch_if_due(&entry, 1_000, Some(500), || {});
        assert!(!dispatched_second, "single-flight gate should reject a concurrent refresh");

        for _ in 0..1000 {
            if ran.load(Ordering::SeqCst) {
                break;
            }
            std::thread::yield_now();
        }
        assert!(ran.load(Ordering::SeqCst));
    }
}
