//! botdb-sync — concurrent containers for botdb.
//!
//! Each container wraps its collection in a `parking_lot::RwLock`: many
//! readers or one writer at a time. Mutating operations that change the
//! collection invoke the container's [`ChangeHook`] *after* the write guard
//! has been dropped, so a hook never runs under the container lock and may
//! freely read the container again.
//!
//! Operations that leave the collection unchanged (adding an existing member,
//! removing an absent key, writing an identical value) do not invoke the hook.

pub mod hook;
pub mod list;
pub mod map;
pub mod set;

pub use hook::ChangeHook;
pub use list::{ConcurrentList, ListError};
pub use map::ConcurrentMap;
pub use set::ConcurrentSet;
