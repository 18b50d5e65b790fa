pub mod config;
pub mod types;

pub use config::{BotDbConfig, ConfigError, MaintenanceConfig, PersistenceConfig};
pub use types::*;
