//! Single-drainer coordination for the striped access buffer.
//!
//! `SPEC_FULL.md` §4.3: an `IDLE -> SCHEDULED -> DRAINING -> IDLE` state
//! machine on one `AtomicU8`, advanced with compare-exchange so that only
//! one thread ever drains the buffers at a time while every other thread
//! that notices pressure can cheaply no-op instead of queueing behind a
//! lock. The legal-transition shape mirrors the CAS-driven status fields
//! the teacher uses to hand off ring segments between producer and
//! consumer in `ringmpsc::channel`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};

use crate::backoff::Backoff;
use crate::invariants::debug_assert_legal_drain_transition;

const IDLE: u8 = 0;
const SCHEDULED: u8 = 1;
const DRAINING: u8 = 2;

pub(crate) struct DrainCoordinator {
    status: AtomicU8,
}

impl DrainCoordinator {
    pub(crate) fn new() -> Self {
        Self {
            status: AtomicU8::new(IDLE),
        }
    }

    /// Called by any thread that observes drain pressure (a full-ish
    /// stripe, a maintenance tick, an explicit flush). Returns `true` if
    /// this call is the one that should actually perform the drain.
    pub(crate) fn try_become_drainer(&self) -> bool {
        if self
            .status
            .compare_exchange(IDLE, SCHEDULED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        debug_assert_legal_drain_transition!(IDLE, SCHEDULED);
        match self
            .status
            .compare_exchange(SCHEDULED, DRAINING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                debug_assert_legal_drain_transition!(SCHEDULED, DRAINING);
                true
            }
            Err(_) => false,
        }
    }

    fn finish(&self) {
        let previous = self.status.swap(IDLE, Ordering::AcqRel);
        debug_assert_legal_drain_transition!(previous, IDLE);
    }

    /// Runs `drain_fn` if this thread wins the race to become the drainer,
    /// returning whatever it returns. A panicking drain body is caught so a
    /// single malformed handler callback cannot wedge the coordinator in
    /// `DRAINING` forever; the panic is re-raised on this thread after the
    /// status is restored to `IDLE`.
    pub(crate) fn drain_if_owner<R>(&self, drain_fn: impl FnOnce() -> R) -> Option<R> {
        if !self.try_become_drainer() {
            return None;
        }
        let result = catch_unwind(AssertUnwindSafe(drain_fn));
        self.finish();
        match result {
            Ok(value) => Some(value),
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.status.load(Ordering::Acquire) == IDLE
    }

    /// Explicit-flush trigger (`SPEC_FULL.md` §4.3 trigger (c)): when this
    /// thread loses the race to become the drainer, spin-wait a bounded
    /// amount for the current drainer to finish rather than returning with
    /// a possibly-stale policy view, matching the teacher's
    /// `Backoff`-driven spin/yield/give-up shape instead of busy-looping
    /// unbounded.
    pub(crate) fn await_idle(&self) {
        let mut backoff = Backoff::new();
        while !self.is_idle() && !backoff.is_completed() {
            backoff.snooze();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn only_one_thread_wins_the_drain_race() {
        let coordinator = Arc::new(DrainCoordinator::new());
        let wins = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = Arc::clone(&coordinator);
            let wins = Arc::clone(&wins);
            handles.push(thread::spawn(move || {
                if coordinator.drain_if_owner(|| ()).is_some() {
                    wins.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(wins.load(std::sync::atomic::Ordering::Relaxed) >= 1);
        assert!(coordinator.is_idle());
    }

    #[test]
    fn coordinator_recovers_after_a_panicking_drain() {
        let coordinator = DrainCoordinator::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            coordinator.drain_if_owner(|| panic!("boom"))
        }));
        assert!(result.is_err());
        assert!(coordinator.is_idle());
    }
}
