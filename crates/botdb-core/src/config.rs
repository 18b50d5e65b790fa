//! botdb.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 250;
const DEFAULT_TEMP_SUFFIX: &str = "tmp";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;

/// Errors raised while reading or writing `botdb.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotDbConfig {
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

/// Settings for the background writer of each state document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Delay between the first mutation and the physical write. Mutations
    /// landing inside the window share one write.
    pub save_debounce_ms: Option<u64>,
    /// Pretty-print the JSON document.
    pub pretty: Option<bool>,
    /// Extension of the temporary file used for atomic replacement.
    pub temp_suffix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    pub sweep_interval_secs: Option<u64>,
}

impl PersistenceConfig {
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms.unwrap_or(DEFAULT_SAVE_DEBOUNCE_MS))
    }

    pub fn pretty(&self) -> bool {
        self.pretty.unwrap_or(true)
    }

    pub fn temp_suffix(&self) -> &str {
        self.temp_suffix.as_deref().unwrap_or(DEFAULT_TEMP_SUFFIX)
    }

    /// Config with no debounce delay (tests, one-shot tools).
    pub fn immediate() -> Self {
        Self {
            save_debounce_ms: Some(0),
            ..Self::default()
        }
    }
}

impl MaintenanceConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(
            self.sweep_interval_secs
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        )
    }
}

impl BotDbConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BotDbConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(suffix) = &self.persistence.temp_suffix {
            if suffix.is_empty() || suffix.contains(['/', '\\']) {
                return Err(ConfigError::Invalid(format!(
                    "persistence.temp_suffix must be a plain extension, got {suffix:?}"
                )));
            }
        }
        if self.maintenance.sweep_interval_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "maintenance.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
