//! botdb-state — persisted runtime state for long-lived bots.
//!
//! Each bot owns one [`BotDatabase`]: secret scalars, app-id sets, a
//! decaying exclusion map and an ordered redemption queue, bound to a single
//! JSON file.
//!
//! # Architecture
//!
//! Collections are `botdb-sync` containers whose change hooks mark the
//! document dirty. A per-document [`Persister`] task coalesces those marks
//! into atomic whole-file writes (temporary file + rename), off the caller's
//! thread. Mutations never wait on disk I/O; durability is eventual, and
//! [`BotDatabase::flush`] is the explicit barrier for orderly shutdown.
//!
//! `BotDatabase` is `Send` + `Sync` and is normally shared as
//! `Arc<BotDatabase>` across a bot's tasks.

pub mod authenticator;
pub mod database;
pub mod document;
pub mod error;
pub mod fs;
pub mod maintenance;
pub mod persist;
pub mod registry;

pub use authenticator::MobileAuthenticator;
pub use database::{AppSet, BotDatabase, DatabaseOptions};
pub use document::DatabaseFile;
pub use error::{StateError, StateResult};
pub use fs::{LocalFs, StateFs};
#[cfg(any(test, feature = "test-util"))]
pub use fs::MemoryFs;
pub use maintenance::Sweeper;
pub use persist::{Lifecycle, Persister};
pub use registry::DatabaseRegistry;

pub use botdb_core::{AppId, MaintenanceConfig, PersistenceConfig, SteamId, UnixTime};
