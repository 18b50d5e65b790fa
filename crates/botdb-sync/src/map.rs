//! Thread-safe observable map.

use std::hash::Hash;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::hook::ChangeHook;

/// Key-unique map guarded by a reader/writer lock.
///
/// Entries keep their first-insertion order, and removal never reorders the
/// remaining entries, so the map doubles as a FIFO keyed queue. Callers that
/// only need a plain map can ignore the ordering.
#[derive(Debug)]
pub struct ConcurrentMap<K, V> {
    inner: RwLock<IndexMap<K, V>>,
    hook: Option<ChangeHook>,
}

impl<K, V> Default for ConcurrentMap<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(IndexMap::new()),
            hook: None,
        }
    }
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(hook: ChangeHook) -> Self {
        Self::from_entries(std::iter::empty(), Some(hook))
    }

    /// Create a map pre-populated with `entries` in iteration order.
    /// Population does not fire the hook; later duplicates overwrite earlier ones.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (K, V)>,
        hook: Option<ChangeHook>,
    ) -> Self {
        Self {
            inner: RwLock::new(entries.into_iter().collect()),
            hook,
        }
    }

    /// Add or update an entry. Returns true if the map changed; writing the
    /// value a key already holds is a no-op.
    pub fn insert(&self, key: K, value: V) -> bool {
        let changed = {
            let mut map = self.inner.write();
            match map.get_mut(&key) {
                Some(current) if *current == value => false,
                Some(current) => {
                    *current = value;
                    true
                }
                None => {
                    map.insert(key, value);
                    true
                }
            }
        };
        if changed {
            self.notify();
        }
        changed
    }

    /// Add an entry only if the key is absent. Returns true if inserted.
    pub fn insert_new(&self, key: K, value: V) -> bool {
        let inserted = {
            let mut map = self.inner.write();
            if map.contains_key(&key) {
                false
            } else {
                map.insert(key, value);
                true
            }
        };
        if inserted {
            self.notify();
        }
        inserted
    }

    /// Append every entry whose key is absent, keeping the batch's relative
    /// order. Fires the hook at most once. Returns the number inserted.
    pub fn extend_new(&self, entries: impl IntoIterator<Item = (K, V)>) -> usize {
        let inserted = {
            let mut map = self.inner.write();
            let mut inserted = 0;
            for (key, value) in entries {
                if !map.contains_key(&key) {
                    map.insert(key, value);
                    inserted += 1;
                }
            }
            inserted
        };
        if inserted > 0 {
            self.notify();
        }
        inserted
    }

    /// Remove an entry without disturbing the order of the others.
    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.inner.write().shift_remove(key);
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    /// Remove every entry for which `keep` returns false. Fires the hook at
    /// most once per call. Returns the number removed.
    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) -> usize {
        let removed = {
            let mut map = self.inner.write();
            let before = map.len();
            map.retain(|k, v| keep(k, v));
            before - map.len()
        };
        if removed > 0 {
            self.notify();
        }
        removed
    }

    pub fn clear(&self) -> bool {
        let changed = {
            let mut map = self.inner.write();
            let had_entries = !map.is_empty();
            map.clear();
            had_entries
        };
        if changed {
            self.notify();
        }
        changed
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Oldest entry by first insertion.
    pub fn first(&self) -> Option<(K, V)> {
        self.inner
            .read()
            .first()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Entries matching `predicate`, in insertion order.
    pub fn filter(&self, mut predicate: impl FnMut(&K, &V) -> bool) -> Vec<(K, V)> {
        self.inner
            .read()
            .iter()
            .filter(|(k, v)| predicate(k, v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Copy of all entries, in insertion order.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.filter(|_, _| true)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    fn notify(&self) {
        ChangeHook::fire(&self.hook);
    }
}
