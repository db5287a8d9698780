//! Concurrent key/value table.
//!
//! A thin wrapper over `dashmap::DashMap`, the pack's standard choice for a
//! sharded concurrent hash table (seen throughout `harborgrid-justin-caddy`
//! and `harborgrid-justin-rusty-db`). The table only ever stores the latest
//! `Entry` per key; all W-TinyLFU bookkeeping lives in `Policy`, addressed
//! through `Entry::node_id`.

use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use dashmap::DashMap;

use crate::entry::Entry;

pub(crate) struct Table<K, V, S> {
    map: DashMap<Arc<K>, Arc<Entry<V>>, S>,
}

impl<K, V, S> Table<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone,
{
    pub(crate) fn with_hasher(hasher: S) -> Self {
        Self {
            map: DashMap::with_hasher(hasher),
        }
    }

    /// Builds a table pre-sized for `initial_capacity` entries and sharded
    /// for roughly `concurrency_level` concurrently-writing threads
    /// (`SPEC_FULL.md` §6, `initial_capacity`/`concurrency_level` builder
    /// options). `DashMap` requires a power-of-two shard count.
    pub(crate) fn with_capacity_and_concurrency(initial_capacity: usize, concurrency_level: usize, hasher: S) -> Self {
        let shard_amount = concurrency_level.max(1).next_power_of_two();
        Self {
            map: DashMap::with_capacity_and_hasher_and_shard_amount(initial_capacity, hasher, shard_amount),
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<Arc<Entry<V>>> {
        self.map.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Like `get`, but also returns the table's own `Arc<K>` for the key,
    /// needed to enqueue an access record without re-allocating the key.
    pub(crate) fn get_with_key(&self, key: &K) -> Option<(Arc<K>, Arc<Entry<V>>)> {
        self.map
            .get(key)
            .map(|r| (Arc::clone(r.key()), Arc::clone(r.value())))
    }

    pub(crate) fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Inserts a new entry, returning the previous one if the key was
    /// already present (the caller is responsible for treating it as
    /// `Replaced`).
    pub(crate) fn insert(&self, key: Arc<K>, entry: Arc<Entry<V>>) -> Option<Arc<Entry<V>>> {
        self.map.insert(key, entry)
    }

    pub(crate) fn remove(&self, key: &K) -> Option<(Arc<K>, Arc<Entry<V>>)> {
        self.map.remove(key)
    }

    /// Removes the mapping only if it still points at `expected`, guarding
    /// against racing with a concurrent `put()` for the same key.
    pub(crate) fn remove_if_same(&self, key: &K, expected: &Arc<Entry<V>>) -> bool {
        self.map
            .remove_if(key, |_, v| Arc::ptr_eq(v, expected))
            .is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn clear(&self) {
        self.map.clear();
    }

    pub(crate) fn for_each(&self, mut f: impl FnMut(&Arc<K>, &Arc<Entry<V>>)) {
        for entry in self.map.iter() {
            f(entry.key(), entry.value());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::RandomState;

    #[test]
    fn insert_then_get_round_trips() {
        let table: Table<&str, u32, RandomState> = Table::with_hasher(RandomState::new());
        let entry = Arc::new(Entry::new(Arc::new(7u32), 1, 0, None));
        table.insert(Arc::new("k"), Arc::clone(&entry));
        let got = table.get(&"k").unwrap();
        assert_eq!(*got.value, 7);
    }

    #[test]
    fn remove_if_same_rejects_stale_expected() {
        let table: Table<&str, u32, RandomState> = Table::with_hasher(RandomState::new());
        let e1 = Arc::new(Entry::new(Arc::new(1u32), 1, 0, None));
        let e2 = Arc::new(Entry::new(Arc::new(2u32), 1, 0, None));
        table.insert(Arc::new("k"), e1.clone());
        table.insert(Arc::new("k"), e2.clone());
        assert!(!table.remove_if_same(&"k", &e1));
        assert!(table.remove_if_same(&"k", &e2));
    }
}
