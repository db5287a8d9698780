//! Debug assertion macros for cache invariants.
//!
//! These macros provide runtime checks for the invariants documented in
//! `SPEC_FULL.md` §3. They are only active in debug builds
//! (`#[cfg(debug_assertions)]`), so there is zero overhead in release
//! builds. Used by `policy`, `table`, and `drain`.

// =============================================================================
// INV-POL-01: Single Residency
// =============================================================================

/// Assert that a node belongs to exactly one policy region at a time.
///
/// **Invariant**: a node's `region` tag matches the deque it is linked into.
macro_rules! debug_assert_single_residency {
    ($expected:expr, $actual:expr) => {
        debug_assert!(
            $expected == $actual,
            "INV-POL-01 violated: node region tag {:?} does not match deque {:?}",
            $actual,
            $expected
        )
    };
}

// =============================================================================
// INV-POL-02: Bounded Region
// =============================================================================

/// Assert that a region's length never exceeds its configured capacity.
macro_rules! debug_assert_region_bounded {
    ($name:literal, $len:expr, $cap:expr) => {
        debug_assert!(
            $len <= $cap,
            "INV-POL-02 violated: region {} holds {} entries, capacity is {}",
            $name,
            $len,
            $cap
        )
    };
}

// =============================================================================
// INV-SKT-01: Counter Saturation
// =============================================================================

/// Assert that a frequency sketch counter never exceeds the 4-bit ceiling.
macro_rules! debug_assert_counter_bounded {
    ($counter:expr) => {
        debug_assert!(
            $counter <= 15,
            "INV-SKT-01 violated: counter value {} exceeds 4-bit ceiling",
            $counter
        )
    };
}

// =============================================================================
// INV-DRN-01: Single Drainer
// =============================================================================

/// Assert that the drain status transition observed is one of the legal
/// triples in the `IDLE -> SCHEDULED -> DRAINING -> IDLE` state machine.
macro_rules! debug_assert_legal_drain_transition {
    ($from:expr, $to:expr) => {
        debug_assert!(
            matches!(($from, $to), (0, 1) | (1, 2) | (2, 0) | (1, 0)),
            "INV-DRN-01 violated: illegal drain status transition {} -> {}",
            $from,
            $to
        )
    };
}

// =============================================================================
// INV-EXP-01: Monotonic Write-Order
// =============================================================================

/// Assert that entries pushed to the write-order expiry queue arrive in
/// non-decreasing creation-time order (the queue is a FIFO over insertion
/// order, which is only valid as an expiry order under a fixed TTL).
macro_rules! debug_assert_monotonic_write_order {
    ($prev:expr, $next:expr) => {
        debug_assert!(
            $next >= $prev,
            "INV-EXP-01 violated: write-order timestamp went from {} to {}",
            $prev,
            $next
        )
    };
}

pub(crate) use debug_assert_counter_bounded;
pub(crate) use debug_assert_legal_drain_transition;
pub(crate) use debug_assert_monotonic_write_order;
pub(crate) use debug_assert_region_bounded;
pub(crate) use debug_assert_single_residency;
