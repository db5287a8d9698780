//! Point-in-time snapshot views over the cache's contents (`SPEC_FULL.md`
//! §6). Each view materializes a `Vec` under one pass over the table rather
//! than holding any lock across iteration, so a concurrent writer never
//! blocks on a long-lived view.

use std::sync::Arc;

pub struct KeysView<K> {
    keys: std::vec::IntoIter<Arc<K>>,
}

impl<K> KeysView<K> {
    pub(crate) fn new(keys: Vec<Arc<K>>) -> Self {
        Self {
            keys: keys.into_iter(),
        }
    }
}

impl<K> Iterator for KeysView<K> {
    type Item = Arc<K>;

    fn next(&mut self) -> Option<Self::Item> {
        self.keys.next()
    }
}

pub struct ValuesView<V> {
    values: std::vec::IntoIter<Arc<V>>,
}

impl<V> ValuesView<V> {
    pub(crate) fn new(values: Vec<Arc<V>>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }
}

impl<V> Iterator for ValuesView<V> {
    type Item = Arc<V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.values.next()
    }
}

pub struct EntriesView<K, V> {
    entries: std::vec::IntoIter<(Arc<K>, Arc<V>)>,
}

impl<K, V> EntriesView<K, V> {
    pub(crate) fn new(entries: Vec<(Arc<K>, Arc<V>)>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }
}

impl<K, V> Iterator for EntriesView<K, V> {
    type Item = (Arc<K>, Arc<V>);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}
