use std::path::Path;

use anyhow::Context;
use tracing::info;

use botdb_core::{BotDbConfig, UnixTime, now_secs};

/// Sweep expired exclusions from the file at `path` and write it back.
/// Returns the number of exclusions removed.
pub async fn sweep(path: &Path, config: &BotDbConfig, now: Option<UnixTime>) -> anyhow::Result<usize> {
    let db = super::open_existing(path, config).await?;
    let now = now.unwrap_or_else(now_secs);

    let removed = db.sweep_expired(now)?;
    db.flush()
        .await
        .with_context(|| format!("saving {}", path.display()))?;
    db.close().await;

    info!(path = %path.display(), removed, now, "sweep complete");
    Ok(removed)
}
