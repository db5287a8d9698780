//! W-TinyLFU admission and eviction policy.
//!
//! Three logical regions — admission window, main-probationary, and
//! main-protected — implemented as doubly linked lists over a stable arena
//! of `u32` slot ids (`SPEC_FULL.md` §4.4 and the Design Notes on avoiding
//! intrusive pointers). `Entry<K, V>` holds the id of its current slot so
//! the drain can locate it in O(1) without a secondary index.

use std::sync::Arc;

use crate::invariants::{debug_assert_region_bounded, debug_assert_single_residency};
use crate::key::spread;
use crate::sketch::FrequencySketch;

const NIL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Region {
    Window,
    Probation,
    Protected,
}

/// Why an entry left the cache. Mirrors the public `EvictReason` exposed to
/// listeners (`SPEC_FULL.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictReason {
    Size,
    Weight,
    Expired,
    Explicit,
    Replaced,
}

struct Node<K> {
    key: Arc<K>,
    hash: u64,
    region: Region,
    prev: u32,
    next: u32,
}

/// Arena of policy nodes. Freed slots are pushed onto `free` and reused by
/// the next `alloc`, which is the arena's own free list acting as the
/// object pool called for in the Design Notes — no separate pooled-entry
/// path exists to reproduce the source's discard-then-reallocate bug.
struct Arena<K> {
    nodes: Vec<Node<K>>,
    free: Vec<u32>,
}

impl<K> Arena<K> {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
        }
    }

    fn alloc(&mut self, key: Arc<K>, hash: u64, region: Region) -> u32 {
        let node = Node {
            key,
            hash,
            region,
            prev: NIL,
            next: NIL,
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id as usize] = node;
            id
        } else {
            self.nodes.push(node);
            (self.nodes.len() - 1) as u32
        }
    }

    fn free(&mut self, id: u32) -> Arc<K> {
        let key = Arc::clone(&self.nodes[id as usize].key);
        self.free.push(id);
        key
    }

    #[inline]
    fn get(&self, id: u32) -> &Node<K> {
        &self.nodes[id as usize]
    }

    #[inline]
    fn get_mut(&mut self, id: u32) -> &mut Node<K> {
        &mut self.nodes[id as usize]
    }
}

/// A doubly linked list of arena slot ids. `head` is the least-recently-used
/// end (the eviction/promotion candidate); `push_back` always inserts at the
/// most-recently-used end, mirroring the `peek_front`/`push_back` naming the
/// pack's own TinyLFU cache (`moka::common::deque`) uses for the same
/// structure.
struct Deque {
    head: u32,
    tail: u32,
    len: usize,
}

impl Deque {
    fn new() -> Self {
        Self {
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    fn push_back<K>(&mut self, arena: &mut Arena<K>, id: u32, region: Region) {
        {
            let node = arena.get_mut(id);
            node.region = region;
            node.prev = self.tail;
            node.next = NIL;
        }
        if self.tail != NIL {
            arena.get_mut(self.tail).next = id;
        } else {
            self.head = id;
        }
        self.tail = id;
        self.len += 1;
    }

    fn unlink<K>(&mut self, arena: &mut Arena<K>, id: u32) {
        let (prev, next) = {
            let node = arena.get(id);
            (node.prev, node.next)
        };
        if prev != NIL {
            arena.get_mut(prev).next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            arena.get_mut(next).prev = prev;
        } else {
            self.tail = prev;
        }
        let node = arena.get_mut(id);
        node.prev = NIL;
        node.next = NIL;
        self.len -= 1;
    }

    fn move_to_back<K>(&mut self, arena: &mut Arena<K>, id: u32) {
        let region = arena.get(id).region;
        self.unlink(arena, id);
        self.push_back(arena, id, region);
    }

    fn peek_front(&self) -> Option<u32> {
        (self.head != NIL).then_some(self.head)
    }

    fn pop_front<K>(&mut self, arena: &mut Arena<K>) -> Option<u32> {
        let id = self.peek_front()?;
        self.unlink(arena, id);
        Some(id)
    }
}

/// Outcome of admitting a freshly written key.
pub(crate) struct AdmitDecision<K> {
    /// The arena slot id for the key just written. `Entry::node_id` should
    /// be updated to this value.
    pub(crate) node_id: u32,
    /// A key evicted to make room, if any, with the reason to report to
    /// listeners.
    pub(crate) evicted: Option<(Arc<K>, u64, EvictReason)>,
}

pub(crate) struct Policy<K> {
    arena: Arena<K>,
    window: Deque,
    probation: Deque,
    protected: Deque,
    window_capacity: usize,
    main_capacity: usize,
    protected_capacity: usize,
    sketch: FrequencySketch,
}

impl<K> Policy<K> {
    /// Builds a policy for `maximum_size` entries with the standard
    /// W-TinyLFU ratios: window ~1%, protected ~80% of main, probation the
    /// remainder (`SPEC_FULL.md` §4.4).
    pub(crate) fn new(maximum_size: usize, sketch_capacity: usize) -> Self {
        let maximum_size = maximum_size.max(1);
        let window_capacity = ((maximum_size as f64) * 0.01).ceil().max(1.0) as usize;
        let main_capacity = maximum_size.saturating_sub(window_capacity).max(1);
        let protected_capacity = ((main_capacity as f64) * 0.8).round() as usize;
        Self {
            arena: Arena::new(),
            window: Deque::new(),
            probation: Deque::new(),
            protected: Deque::new(),
            window_capacity,
            main_capacity,
            protected_capacity,
            sketch: FrequencySketch::with_capacity(sketch_capacity),
        }
    }

    pub(crate) fn record_access(&mut self, hash: u64) {
        self.sketch.increment(hash);
    }

    pub(crate) fn len(&self) -> usize {
        self.window.len + self.probation.len + self.protected.len
    }

    /// Access-path update on a cache hit (`SPEC_FULL.md` §4.4 "Access
    /// path").
    pub(crate) fn on_read(&mut self, node_id: u32) {
        let region = self.arena.get(node_id).region;
        match region {
            Region::Window => self.window.move_to_back(&mut self.arena, node_id),
            Region::Protected => self.protected.move_to_back(&mut self.arena, node_id),
            Region::Probation => {
                self.probation.unlink(&mut self.arena, node_id);
                self.protected.push_back(&mut self.arena, node_id, Region::Protected);
                debug_assert_single_residency!(Region::Protected, self.arena.get(node_id).region);
                if self.protected.len > self.protected_capacity {
                    if let Some(demoted) = self.protected.pop_front(&mut self.arena) {
                        self.probation.push_back(&mut self.arena, demoted, Region::Probation);
                    }
                }
                debug_assert_region_bounded!(
                    "protected",
                    self.protected.len,
                    self.protected_capacity + 1
                );
            }
        }
    }

    /// Insertion path (`SPEC_FULL.md` §4.4 "Insertion path"). Places the new
    /// key at the head of the window and, if the window overflows, attempts
    /// to promote its tail candidate into the main space.
    pub(crate) fn insert(&mut self, key: Arc<K>, hash: u64) -> AdmitDecision<K> {
        let node_id = self.arena.alloc(Arc::clone(&key), hash, Region::Window);
        self.window.push_back(&mut self.arena, node_id, Region::Window);

        if self.window.len <= self.window_capacity {
            return AdmitDecision {
                node_id,
                evicted: None,
            };
        }

        let candidate_id = match self.window.pop_front(&mut self.arena) {
            Some(id) => id,
            None => {
                return AdmitDecision {
                    node_id,
                    evicted: None,
                }
            }
        };
        let candidate_hash = self.arena.get(candidate_id).hash;

        let total_main = self.probation.len + self.protected.len;
        if total_main < self.main_capacity {
            self.probation.push_back(&mut self.arena, candidate_id, Region::Probation);
            return AdmitDecision {
                node_id,
                evicted: None,
            };
        }

        let victim_id = match self.probation.peek_front() {
            Some(id) => id,
            None => {
                // All of main is currently in protected; nothing to compare
                // against, so the candidate is admitted on the spot.
                self.probation.push_back(&mut self.arena, candidate_id, Region::Probation);
                return AdmitDecision {
                    node_id,
                    evicted: None,
                };
            }
        };
        let victim_hash = self.arena.get(victim_id).hash;

        if self.should_admit(candidate_hash, victim_hash) {
            self.probation.unlink(&mut self.arena, victim_id);
            let victim_key = self.arena.free(victim_id);
            self.probation.push_back(&mut self.arena, candidate_id, Region::Probation);
            AdmitDecision {
                node_id,
                evicted: Some((victim_key, victim_hash, EvictReason::Size)),
            }
        } else {
            let discarded_key = self.arena.free(candidate_id);
            AdmitDecision {
                node_id,
                evicted: Some((discarded_key, candidate_hash, EvictReason::Size)),
            }
        }
    }

    /// `SPEC_FULL.md` §4.4 step 3: admit iff the candidate is strictly more
    /// frequent than the victim; on an exact tie, admit with probability
    /// 1/2 via a cheap hash-derived bit rather than rejecting outright, to
    /// avoid pathological tie patterns. Window graduates are treated as
    /// always within the policy's "recently admitted" age threshold, since
    /// the window itself is bounded to the most recent ~1% of writes.
    fn should_admit(&self, candidate_hash: u64, victim_hash: u64) -> bool {
        let candidate_freq = self.sketch.frequency(candidate_hash);
        let victim_freq = self.sketch.frequency(victim_hash);
        match candidate_freq.cmp(&victim_freq) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => spread(candidate_hash ^ victim_hash) & 1 == 0,
        }
    }

    /// Removes a node from whichever region it currently occupies (explicit
    /// remove or lazy/eager expiration), returning its key.
    pub(crate) fn remove(&mut self, node_id: u32) -> Arc<K> {
        let region = self.arena.get(node_id).region;
        match region {
            Region::Window => self.window.unlink(&mut self.arena, node_id),
            Region::Probation => self.probation.unlink(&mut self.arena, node_id),
            Region::Protected => self.protected.unlink(&mut self.arena, node_id),
        }
        self.arena.free(node_id)
    }

    /// Evicts one entry to relieve weight pressure, preferring the coldest
    /// region first (probation, then protected, then window). Used by the
    /// cache's weight-bound backstop pass; see `SPEC_FULL.md` §4.4 Open
    /// Question resolution on weight-bounded caches in DESIGN.md.
    pub(crate) fn evict_coldest(&mut self) -> Option<(Arc<K>, u64)> {
        if let Some(id) = self.probation.pop_front(&mut self.arena) {
            return Some(self.finish_evict(id));
        }
        if let Some(id) = self.protected.pop_front(&mut self.arena) {
            return Some(self.finish_evict(id));
        }
        if let Some(id) = self.window.pop_front(&mut self.arena) {
            return Some(self.finish_evict(id));
        }
        None
    }

    fn finish_evict(&mut self, id: u32) -> (Arc<K>, u64) {
        let hash = self.arena.get(id).hash;
        (self.arena.free(id), hash)
    }

    /// Returns up to `per_region_limit` of the least-recently-touched nodes
    /// in each region, oldest first, without mutating any list. Used by the
    /// eager expiration scan (`SPEC_FULL.md` §4.5) as a bounded candidate
    /// set: expiration is about recency, so the coldest end of each region
    /// is where expired entries accumulate first.
    pub(crate) fn coldest_candidates(&self, per_region_limit: usize) -> Vec<(Arc<K>, u64, u32)> {
        let mut out = Vec::with_capacity(per_region_limit * 3);
        for deque in [&self.window, &self.probation, &self.protected] {
            let mut id = deque.head;
            let mut taken = 0;
            while id != NIL && taken < per_region_limit {
                let node = self.arena.get(id);
                out.push((Arc::clone(&node.key), node.hash, id));
                id = node.next;
                taken += 1;
            }
        }
        out
    }

    /// Drops every node without individually firing eviction bookkeeping;
    /// used by `clear()`.
    pub(crate) fn clear(&mut self) {
        self.arena.nodes.clear();
        self.arena.free.clear();
        self.window = Deque::new();
        self.probation = Deque::new();
        self.protected = Deque::new();
    }
}
