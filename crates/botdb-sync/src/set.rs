//! Thread-safe unordered set.

use std::collections::HashSet;
use std::hash::Hash;

use parking_lot::RwLock;

use crate::hook::ChangeHook;

/// A set of unique members guarded by a reader/writer lock.
///
/// `add` of an existing member and `remove` of an absent one are no-ops and
/// do not fire the hook.
#[derive(Debug)]
pub struct ConcurrentSet<T> {
    inner: RwLock<HashSet<T>>,
    hook: Option<ChangeHook>,
}

impl<T> Default for ConcurrentSet<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashSet::new()),
            hook: None,
        }
    }
}

impl<T: Eq + Hash + Clone> ConcurrentSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty set that fires `hook` after every change.
    pub fn with_hook(hook: ChangeHook) -> Self {
        Self::from_items(std::iter::empty(), Some(hook))
    }

    /// Create a set pre-populated with `items`. Population does not fire the hook.
    pub fn from_items(items: impl IntoIterator<Item = T>, hook: Option<ChangeHook>) -> Self {
        Self {
            inner: RwLock::new(items.into_iter().collect()),
            hook,
        }
    }

    /// Add a member. Returns true if it was not present.
    pub fn add(&self, item: T) -> bool {
        let added = self.inner.write().insert(item);
        if added {
            ChangeHook::fire(&self.hook);
        }
        added
    }

    /// Add many members under one write lock. Fires the hook at most once.
    /// Returns the number of members that were newly added.
    pub fn extend(&self, items: impl IntoIterator<Item = T>) -> usize {
        let added = {
            let mut set = self.inner.write();
            let mut added = 0;
            for item in items {
                if set.insert(item) {
                    added += 1;
                }
            }
            added
        };
        if added > 0 {
            ChangeHook::fire(&self.hook);
        }
        added
    }

    /// Remove a member. Returns true if it was present.
    pub fn remove(&self, item: &T) -> bool {
        let removed = self.inner.write().remove(item);
        if removed {
            ChangeHook::fire(&self.hook);
        }
        removed
    }

    /// Replace the whole content. Fires the hook only if the content differs.
    pub fn replace_with(&self, items: impl IntoIterator<Item = T>) -> bool {
        let next: HashSet<T> = items.into_iter().collect();
        let changed = {
            let mut set = self.inner.write();
            if *set == next {
                false
            } else {
                *set = next;
                true
            }
        };
        if changed {
            ChangeHook::fire(&self.hook);
        }
        changed
    }

    /// Remove every member. Returns true if the set was non-empty.
    pub fn clear(&self) -> bool {
        let changed = {
            let mut set = self.inner.write();
            let had_items = !set.is_empty();
            set.clear();
            had_items
        };
        if changed {
            ChangeHook::fire(&self.hook);
        }
        changed
    }

    pub fn contains(&self, item: &T) -> bool {
        self.inner.read().contains(item)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Copy of the current members, in unspecified order.
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.read().iter().cloned().collect()
    }
}
