//! Thread-safe index-addressable list.

use parking_lot::RwLock;
use thiserror::Error;

use crate::hook::ChangeHook;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// A vector guarded by a reader/writer lock.
///
/// # Enumeration
///
/// [`ConcurrentList::with_iter`] holds the read lock for as long as the
/// closure runs. Other readers proceed, but every writer waits until the
/// enumeration returns. Keep the closure short or take a
/// [`snapshot`](ConcurrentList::snapshot) instead.
#[derive(Debug)]
pub struct ConcurrentList<T> {
    inner: RwLock<Vec<T>>,
    hook: Option<ChangeHook>,
}

impl<T> Default for ConcurrentList<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Vec::new()),
            hook: None,
        }
    }
}

impl<T: Clone + PartialEq> ConcurrentList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(hook: ChangeHook) -> Self {
        Self::from_items(std::iter::empty(), Some(hook))
    }

    pub fn from_items(items: impl IntoIterator<Item = T>, hook: Option<ChangeHook>) -> Self {
        Self {
            inner: RwLock::new(items.into_iter().collect()),
            hook,
        }
    }

    pub fn get(&self, index: usize) -> Result<T, ListError> {
        let list = self.inner.read();
        list.get(index)
            .cloned()
            .ok_or(ListError::IndexOutOfRange {
                index,
                len: list.len(),
            })
    }

    /// Overwrite the element at `index`. Returns true if the value changed.
    pub fn set(&self, index: usize, value: T) -> Result<bool, ListError> {
        let changed = {
            let mut list = self.inner.write();
            let len = list.len();
            let slot = list
                .get_mut(index)
                .ok_or(ListError::IndexOutOfRange { index, len })?;
            if *slot == value {
                false
            } else {
                *slot = value;
                true
            }
        };
        if changed {
            self.notify();
        }
        Ok(changed)
    }

    pub fn push(&self, value: T) {
        self.inner.write().push(value);
        self.notify();
    }

    /// Insert at `index`, shifting later elements. `index == len` appends.
    pub fn insert(&self, index: usize, value: T) -> Result<(), ListError> {
        {
            let mut list = self.inner.write();
            if index > list.len() {
                return Err(ListError::IndexOutOfRange {
                    index,
                    len: list.len(),
                });
            }
            list.insert(index, value);
        }
        self.notify();
        Ok(())
    }

    pub fn remove_at(&self, index: usize) -> Result<T, ListError> {
        let removed = {
            let mut list = self.inner.write();
            if index >= list.len() {
                return Err(ListError::IndexOutOfRange {
                    index,
                    len: list.len(),
                });
            }
            list.remove(index)
        };
        self.notify();
        Ok(removed)
    }

    /// Remove the first element equal to `value`. Returns true if one was found.
    pub fn remove(&self, value: &T) -> bool {
        let removed = {
            let mut list = self.inner.write();
            match list.iter().position(|item| item == value) {
                Some(index) => {
                    list.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.notify();
        }
        removed
    }

    /// Replace the whole content. Fires the hook only if the content differs.
    pub fn replace_with(&self, items: impl IntoIterator<Item = T>) -> bool {
        let next: Vec<T> = items.into_iter().collect();
        let changed = {
            let mut list = self.inner.write();
            if *list == next {
                false
            } else {
                *list = next;
                true
            }
        };
        if changed {
            self.notify();
        }
        changed
    }

    pub fn contains(&self, value: &T) -> bool {
        self.inner.read().contains(value)
    }

    pub fn index_of(&self, value: &T) -> Option<usize> {
        self.inner.read().iter().position(|item| item == value)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.inner.read().clone()
    }

    /// Run `f` over the live elements with the read lock held throughout.
    /// Writers block until `f` returns.
    pub fn with_iter<R>(&self, f: impl FnOnce(std::slice::Iter<'_, T>) -> R) -> R {
        let list = self.inner.read();
        f(list.iter())
    }

    fn notify(&self) {
        ChangeHook::fire(&self.hook);
    }
}
