//! DatabaseRegistry — the open state documents of a host process.
//!
//! A host runs many bots, each with its own document. The registry hands
//! out one [`BotDatabase`] per bot and refuses to open a second document on
//! a file that another bot (or the same bot) already owns.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::database::{BotDatabase, DatabaseOptions};
use crate::error::{StateError, StateResult};

pub struct DatabaseRegistry {
    options: DatabaseOptions,
    /// Open documents: bot name → document.
    open: RwLock<HashMap<String, Arc<BotDatabase>>>,
}

impl DatabaseRegistry {
    /// Create a registry opening every document with `options`.
    /// The per-bot name in `options.bot` is overridden on each open.
    pub fn new(options: DatabaseOptions) -> Self {
        Self {
            options,
            open: RwLock::new(HashMap::new()),
        }
    }

    /// Load or create the document for `bot` at `path`.
    pub async fn open(&self, bot: &str, path: impl AsRef<Path>) -> StateResult<Arc<BotDatabase>> {
        if bot.trim().is_empty() {
            return Err(StateError::InvalidArgument("bot name is empty".to_string()));
        }
        let path = normalize(path.as_ref());

        let mut open = self.open.write().await;
        if let Some(existing) = open.get(bot) {
            return Err(StateError::AlreadyOpen {
                path: existing.path().display().to_string(),
                owner: bot.to_string(),
            });
        }
        if let Some((owner, _)) = open.iter().find(|(_, db)| db.path() == path) {
            return Err(StateError::AlreadyOpen {
                path: path.display().to_string(),
                owner: owner.clone(),
            });
        }

        let options = self.options.clone().with_bot(bot);
        let db = Arc::new(BotDatabase::create_or_load(&path, options).await?);
        open.insert(bot.to_string(), db.clone());
        info!(%bot, path = %path.display(), "bot state opened");
        Ok(db)
    }

    pub async fn get(&self, bot: &str) -> Option<Arc<BotDatabase>> {
        self.open.read().await.get(bot).cloned()
    }

    /// Bot names with an open document, sorted.
    pub async fn bots(&self) -> Vec<String> {
        let mut names: Vec<String> = self.open.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Close the document of `bot`, flushing first if asked, and remove it.
    ///
    /// The document is closed even when the flush fails; the flush error is
    /// returned. The path stays reserved until the document's writer has
    /// stopped, so a reopened document never writes alongside the old one.
    /// Returns false if the bot had no open document.
    pub async fn close(&self, bot: &str, flush: bool) -> StateResult<bool> {
        let mut open = self.open.write().await;
        let Some(db) = open.get(bot).cloned() else {
            return Ok(false);
        };

        let flushed = if flush { db.flush().await.map(|_| ()) } else { Ok(()) };
        db.close().await;
        open.remove(bot);
        debug!(%bot, "bot state closed");
        flushed.map(|()| true)
    }

    /// Close every document. Flush failures are logged, not returned.
    pub async fn close_all(&self, flush: bool) {
        let mut open = self.open.write().await;
        for (bot, db) in open.iter() {
            if flush {
                if let Err(e) = db.flush().await {
                    warn!(%bot, error = %e, "final flush failed");
                }
            }
            db.close().await;
        }
        open.clear();
        info!("all bot states closed");
    }
}

/// Absolute form of `path`, so `a.json` and `./a.json` compare equal.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    absolute
        .components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}
