//! A bounded, concurrent in-process key/value cache with W-TinyLFU
//! admission, optional size or weight bounds, TTL/TTI expiration,
//! refresh-after-write, single-flight loading, event notifications, and a
//! contention-tolerant statistics plane.
//!
//! Callers interact with [`Cache`] through a handle built from
//! [`CacheBuilder`]:
//!
//! ```ignore
//! use tlfu_cache::{Cache, CacheBuilder};
//!
//! let cache: Cache<String, String> = Cache::builder()
//!     .maximum_size(10_000)
//!     .build();
//! cache.put("k".to_owned(), "v".to_owned());
//! assert_eq!(cache.get_if_present(&"k".to_owned()).as_deref(), Some(&"v".to_owned()));
//! ```
//!
//! The implementation mirrors Caffeine/`moka`: a small admission window
//! feeds a frequency-gated segmented main space (probationary/protected),
//! fed by a lossy striped access buffer drained by a single coordinator
//! thread at a time.

mod backoff;
mod builder;
mod buffer;
mod cache;
mod drain;
mod entry;
mod error;
mod expiration;
mod invariants;
mod key;
mod listener;
mod loader;
mod maintenance;
mod policy;
mod record;
mod refresh;
mod sketch;
mod stats;
mod table;
mod views;

pub use builder::{CacheBuilder, Profile};
pub use cache::{Cache, ListenerId};
pub use error::{CacheError, LoaderError};
pub use listener::{CacheEventListener, EvictReason};
pub use loader::{AsyncLoader, CompletionHandle, Loader};
pub use stats::CacheStats;
pub use views::{EntriesView, KeysView, ValuesView};
