//! Change notification shared by all containers.

use std::fmt;
use std::sync::Arc;

/// Callback invoked after a container's state changed.
///
/// Supplied once at construction. The owner decides what a change means
/// (typically: mark a document dirty and wake its writer).
#[derive(Clone)]
pub struct ChangeHook(Arc<dyn Fn() + Send + Sync>);

impl ChangeHook {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn fire(hook: &Option<ChangeHook>) {
        if let Some(hook) = hook {
            (hook.0)();
        }
    }
}

impl fmt::Debug for ChangeHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChangeHook")
    }
}
