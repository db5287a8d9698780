//! Background maintenance thread: periodic drain flush plus expiration
//! sweeps (`SPEC_FULL.md` §4.5/§4.6 "eager" paths).
//!
//! The shutdown handshake follows the same idempotent, wait-on-a-condition
//! shape as `ringmpsc_stream::shutdown::ShutdownHandle`, adapted from that
//! module's `tokio::sync::Notify`/oneshot pairing to a plain
//! `parking_lot::Condvar` since this crate's maintenance loop is a regular
//! OS thread rather than an async task — the cache core owns no runtime.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct ShutdownState {
    requested: Mutex<bool>,
    condvar: Condvar,
}

pub(crate) struct MaintenanceHandle {
    state: Arc<ShutdownState>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl MaintenanceHandle {
    /// Spawns a thread that calls `tick` every `interval` until
    /// [`MaintenanceHandle::shutdown`] is called.
    pub(crate) fn spawn(interval: Duration, mut tick: impl FnMut() + Send + 'static) -> Self {
        let state = Arc::new(ShutdownState {
            requested: Mutex::new(false),
            condvar: Condvar::new(),
        });
        let worker_state = Arc::clone(&state);
        let join = std::thread::Builder::new()
            .name("tlfu-cache-maintenance".to_owned())
            .spawn(move || loop {
                let mut requested = worker_state.requested.lock();
                if *requested {
                    return;
                }
                let timed_out = worker_state.condvar.wait_for(&mut requested, interval);
                let should_stop = *requested;
                drop(requested);
                if should_stop {
                    return;
                }
                if timed_out.timed_out() {
                    tick();
                }
            })
            .expect("failed to spawn maintenance thread");

        Self {
            state,
            join: Mutex::new(Some(join)),
        }
    }

    /// Idempotent: safe to call more than once, and safe to call from
    /// `Drop`.
    pub(crate) fn shutdown(&self) {
        {
            let mut requested = self.state.requested.lock();
            *requested = true;
            self.state.condvar.notify_all();
        }
        if let Some(join) = self.join.lock().take() {
            let _ = join.join();
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn tick_runs_at_least_once_before_shutdown() {
        let counter = Arc::new(AtomicUsize::new(0));
        let worker_counter = Arc::clone(&counter);
        let handle = MaintenanceHandle::spawn(Duration::from_millis(5), move || {
            worker_counter.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(40));
        handle.shutdown();
        assert!(counter.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let handle = MaintenanceHandle::spawn(Duration::from_secs(60), || {});
        handle.shutdown();
        handle.shutdown();
    }
}
