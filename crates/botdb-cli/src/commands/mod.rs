pub mod inspect;
pub mod sweep;

use std::path::Path;

use anyhow::Context;
use botdb_core::BotDbConfig;
use botdb_state::{BotDatabase, DatabaseOptions};

/// Open an existing state file. A missing file is an error here: the CLI
/// never creates state for a bot.
pub(crate) async fn open_existing(path: &Path, config: &BotDbConfig) -> anyhow::Result<BotDatabase> {
    if !path.is_file() {
        anyhow::bail!("no state file at {}", path.display());
    }
    let options = DatabaseOptions::default()
        .with_persistence(config.persistence.clone())
        .with_bot("botdb-cli");
    BotDatabase::create_or_load(path, options)
        .await
        .with_context(|| format!("loading {}", path.display()))
}
