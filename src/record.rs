//! Access records captured on the hot path and consumed by the drain.

use std::sync::Arc;

/// The kind of access a record describes. See `SPEC_FULL.md` §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessKind {
    Read,
    Write,
    Evict,
}

/// A small value capturing one access event, queued by a caller thread and
/// drained by the policy. Carries the key itself (not just its hash) since
/// the drain must be able to locate the entry's arena slot and, for writes,
/// link a brand-new node.
pub(crate) struct AccessRecord<K> {
    pub(crate) key: Arc<K>,
    pub(crate) hash: u64,
    pub(crate) kind: AccessKind,
    pub(crate) timestamp_nanos: u64,
}

impl<K> AccessRecord<K> {
    pub(crate) fn read(key: Arc<K>, hash: u64, timestamp_nanos: u64) -> Self {
        Self {
            key,
            hash,
            kind: AccessKind::Read,
            timestamp_nanos,
        }
    }

    pub(crate) fn write(key: Arc<K>, hash: u64, timestamp_nanos: u64) -> Self {
        Self {
            key,
            hash,
            kind: AccessKind::Write,
            timestamp_nanos,
        }
    }

    pub(crate) fn evict(key: Arc<K>, hash: u64, timestamp_nanos: u64) -> Self {
        Self {
            key,
            hash,
            kind: AccessKind::Evict,
            timestamp_nanos,
        }
    }
}
