//! BotDatabase — the persisted runtime state of one bot.
//!
//! Composes concurrent containers and secret scalars into a single document
//! bound to one file. Every container is built with a change hook that marks
//! the document dirty; the [`Persister`] turns those marks into coalesced
//! atomic writes.
//!
//! Mutators return whether anything changed. They fail fast with
//! [`StateError::Disposed`] after [`BotDatabase::dispose`] and with
//! [`StateError::InvalidArgument`] on zero ids, blank keys or empty batches,
//! in both cases before touching any state.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, error, info, info_span};

use botdb_core::{AppId, PersistenceConfig, SteamId, UnixTime};
use botdb_sync::{ChangeHook, ConcurrentMap, ConcurrentSet};

use crate::authenticator::MobileAuthenticator;
use crate::document::{DatabaseFile, persisted_expiries, persisted_ids, persisted_queue};
use crate::error::{StateError, StateResult};
use crate::fs::{LocalFs, StateFs};
use crate::persist::{Lifecycle, Persist, Persister, SaveSignal, read_existing};

/// The app-id sets kept per bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppSet {
    /// Apps never farmed.
    FarmingBlacklist,
    /// Apps farmed before anything else.
    FarmingPriorityQueue,
    /// Risky apps the owner explicitly wants farmed first.
    FarmingRiskyPrioritized,
    /// Apps excluded from active item matching.
    MatchActivelyBlacklisted,
}

impl AppSet {
    pub const ALL: [AppSet; 4] = [
        AppSet::FarmingBlacklist,
        AppSet::FarmingPriorityQueue,
        AppSet::FarmingRiskyPrioritized,
        AppSet::MatchActivelyBlacklisted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppSet::FarmingBlacklist => "farming_blacklist",
            AppSet::FarmingPriorityQueue => "farming_priority_queue",
            AppSet::FarmingRiskyPrioritized => "farming_risky_prioritized",
            AppSet::MatchActivelyBlacklisted => "match_actively_blacklisted",
        }
    }
}

impl std::fmt::Display for AppSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for [`BotDatabase::create_or_load`].
#[derive(Clone)]
pub struct DatabaseOptions {
    pub persistence: PersistenceConfig,
    pub fs: Arc<dyn StateFs>,
    /// Bot name attached to every diagnostic of this document.
    pub bot: Option<String>,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            persistence: PersistenceConfig::default(),
            fs: Arc::new(LocalFs),
            bot: None,
        }
    }
}

impl DatabaseOptions {
    pub fn with_persistence(mut self, persistence: PersistenceConfig) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn StateFs>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_bot(mut self, bot: impl Into<String>) -> Self {
        self.bot = Some(bot.into());
        self
    }
}

#[derive(Default)]
struct Secrets {
    access_token: Option<String>,
    refresh_token: Option<String>,
    steam_guard_data: Option<String>,
    mobile_authenticator: Option<MobileAuthenticator>,
}

/// Live in-memory state. Rendered by the persister.
struct DatabaseState {
    secrets: RwLock<Secrets>,
    farming_blacklist: ConcurrentSet<AppId>,
    farming_priority_queue: ConcurrentSet<AppId>,
    farming_risky_prioritized: ConcurrentSet<AppId>,
    match_actively_blacklisted: ConcurrentSet<AppId>,
    trading_blacklist: ConcurrentSet<SteamId>,
    farming_risky_ignored: ConcurrentMap<AppId, UnixTime>,
    pending_redemptions: ConcurrentMap<String, String>,
    /// Top-level fields from the file this version does not understand.
    extra: Map<String, Value>,
}

impl DatabaseState {
    fn from_file(file: DatabaseFile, signal: &Arc<SaveSignal>) -> Self {
        let hook = {
            let signal = signal.clone();
            ChangeHook::new(move || signal.request())
        };
        let app_set = |ids: Option<Vec<AppId>>| {
            ConcurrentSet::from_items(ids.unwrap_or_default(), Some(hook.clone()))
        };

        Self {
            secrets: RwLock::new(Secrets {
                access_token: file.access_token,
                refresh_token: file.refresh_token,
                steam_guard_data: file.steam_guard_data,
                mobile_authenticator: file.mobile_authenticator,
            }),
            farming_blacklist: app_set(file.farming_blacklist_app_ids),
            farming_priority_queue: app_set(file.farming_priority_queue_app_ids),
            farming_risky_prioritized: app_set(file.farming_risky_prioritized_app_ids),
            match_actively_blacklisted: app_set(file.match_actively_blacklisted_app_ids),
            trading_blacklist: ConcurrentSet::from_items(
                file.trading_blacklist_steam_ids.unwrap_or_default(),
                Some(hook.clone()),
            ),
            farming_risky_ignored: ConcurrentMap::from_entries(
                file.farming_risky_ignored_app_ids.unwrap_or_default(),
                Some(hook.clone()),
            ),
            pending_redemptions: ConcurrentMap::from_entries(
                file.games_to_redeem_in_background.unwrap_or_default(),
                Some(hook),
            ),
            extra: file.extra,
        }
    }

    fn app_set(&self, set: AppSet) -> &ConcurrentSet<AppId> {
        match set {
            AppSet::FarmingBlacklist => &self.farming_blacklist,
            AppSet::FarmingPriorityQueue => &self.farming_priority_queue,
            AppSet::FarmingRiskyPrioritized => &self.farming_risky_prioritized,
            AppSet::MatchActivelyBlacklisted => &self.match_actively_blacklisted,
        }
    }

    fn to_file(&self) -> DatabaseFile {
        let secrets = self.secrets.read();
        DatabaseFile {
            access_token: secrets.access_token.clone(),
            refresh_token: secrets.refresh_token.clone(),
            steam_guard_data: secrets.steam_guard_data.clone(),
            mobile_authenticator: secrets.mobile_authenticator.clone(),
            farming_blacklist_app_ids: persisted_ids(self.farming_blacklist.snapshot()),
            farming_priority_queue_app_ids: persisted_ids(self.farming_priority_queue.snapshot()),
            farming_risky_prioritized_app_ids: persisted_ids(
                self.farming_risky_prioritized.snapshot(),
            ),
            match_actively_blacklisted_app_ids: persisted_ids(
                self.match_actively_blacklisted.snapshot(),
            ),
            trading_blacklist_steam_ids: persisted_ids(self.trading_blacklist.snapshot()),
            farming_risky_ignored_app_ids: persisted_expiries(
                self.farming_risky_ignored.snapshot(),
            ),
            games_to_redeem_in_background: persisted_queue(self.pending_redemptions.snapshot()),
            extra: self.extra.clone(),
        }
    }
}

impl Persist for DatabaseState {
    fn render(&self, pretty: bool) -> StateResult<String> {
        self.to_file()
            .render(pretty)
            .map_err(|e| StateError::Serialize(e.to_string()))
    }
}

/// Persisted state of one bot, bound to one file.
pub struct BotDatabase {
    state: Arc<DatabaseState>,
    signal: Arc<SaveSignal>,
    persister: Persister,
}

impl BotDatabase {
    /// Load the document at `path`, or start an empty one if no file exists.
    ///
    /// An unreadable, blank, malformed or invalid file is an error: the caller
    /// gets no document rather than an empty one that would overwrite the
    /// user's data on the first save. Must be called within a tokio runtime.
    pub async fn create_or_load(
        path: impl AsRef<Path>,
        options: DatabaseOptions,
    ) -> StateResult<Self> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return Err(StateError::InvalidArgument("state file path is empty".to_string()));
        }

        let bot = options.bot.clone().unwrap_or_default();
        let span = info_span!("bot_database", bot = %bot, path = %path.display());

        let file = {
            let fs = options.fs.clone();
            let read_path = path.clone();
            let loaded = tokio::task::spawn_blocking(move || load_file(fs.as_ref(), &read_path))
                .await
                .map_err(|e| StateError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
                .and_then(|r| r);

            match loaded {
                Ok(file) => file,
                Err(e) => {
                    span.in_scope(|| error!(error = %e, "failed to load bot state"));
                    return Err(e);
                }
            }
        };

        let created = file.is_none();
        let signal = Arc::new(SaveSignal::new());
        let state = Arc::new(DatabaseState::from_file(file.unwrap_or_default(), &signal));
        let persister = Persister::start(
            path,
            options.fs,
            state.clone(),
            signal.clone(),
            &options.persistence,
            span,
        );

        persister.span().in_scope(|| {
            if created {
                info!("created new bot state");
            } else {
                debug!("loaded bot state");
            }
        });

        Ok(Self {
            state,
            signal,
            persister,
        })
    }

    pub fn path(&self) -> &Path {
        self.persister.path()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.persister.lifecycle()
    }

    /// Whether a change is waiting for the background writer.
    pub fn has_pending_save(&self) -> bool {
        self.persister.has_pending_save()
    }

    /// Write any pending change now. Returns true if a write happened.
    pub async fn flush(&self) -> StateResult<bool> {
        self.persister.flush().await
    }

    /// Release the authenticator and stop persisting.
    ///
    /// Later mutations fail with [`StateError::Disposed`]; a mutation already
    /// running finishes first. Changes not yet written are lost; call
    /// [`flush`](Self::flush) first when they matter. A write already in
    /// flight may still land; [`close`](Self::close) waits for it.
    pub fn dispose(&self) {
        if !self.persister.dispose() {
            return;
        }
        // The signal is disarmed, so dropping the authenticator schedules nothing.
        self.state.secrets.write().mobile_authenticator = None;
        self.persister.span().in_scope(|| debug!("bot state disposed"));
    }

    /// Dispose and wait until nothing more is written to the file. Call this
    /// before another document may open the same path.
    pub async fn close(&self) {
        self.dispose();
        self.persister.close().await;
    }

    fn mutate<R>(&self, f: impl FnOnce() -> StateResult<R>) -> StateResult<R> {
        self.persister.while_live(f)
    }

    // ── Secrets ────────────────────────────────────────────────────

    pub fn access_token(&self) -> Option<String> {
        self.state.secrets.read().access_token.clone()
    }

    pub fn set_access_token(&self, value: Option<String>) -> StateResult<bool> {
        self.set_secret(value, |s| &mut s.access_token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state.secrets.read().refresh_token.clone()
    }

    pub fn set_refresh_token(&self, value: Option<String>) -> StateResult<bool> {
        self.set_secret(value, |s| &mut s.refresh_token)
    }

    pub fn steam_guard_data(&self) -> Option<String> {
        self.state.secrets.read().steam_guard_data.clone()
    }

    pub fn set_steam_guard_data(&self, value: Option<String>) -> StateResult<bool> {
        self.set_secret(value, |s| &mut s.steam_guard_data)
    }

    pub fn mobile_authenticator(&self) -> Option<MobileAuthenticator> {
        self.state.secrets.read().mobile_authenticator.clone()
    }

    pub fn has_mobile_authenticator(&self) -> bool {
        self.state.secrets.read().mobile_authenticator.is_some()
    }

    /// Replace the authenticator. The previous one is dropped.
    pub fn set_mobile_authenticator(
        &self,
        value: Option<MobileAuthenticator>,
    ) -> StateResult<bool> {
        if let Some(auth) = &value {
            auth.validate().map_err(StateError::InvalidArgument)?;
        }
        self.set_secret(value, |s| &mut s.mobile_authenticator)
    }

    fn set_secret<T: PartialEq>(
        &self,
        value: Option<T>,
        field: impl FnOnce(&mut Secrets) -> &mut Option<T>,
    ) -> StateResult<bool> {
        self.mutate(|| {
            let previous = {
                let mut secrets = self.state.secrets.write();
                let slot = field(&mut *secrets);
                if *slot == value {
                    return Ok(false);
                }
                std::mem::replace(slot, value)
            };
            drop(previous);
            self.signal.request();
            Ok(true)
        })
    }

    // ── App sets ───────────────────────────────────────────────────

    /// Members of `set`, sorted ascending.
    pub fn app_ids(&self, set: AppSet) -> Vec<AppId> {
        let mut ids = self.state.app_set(set).snapshot();
        ids.sort_unstable();
        ids
    }

    pub fn contains_app(&self, set: AppSet, app_id: AppId) -> bool {
        self.state.app_set(set).contains(&app_id)
    }

    pub fn app_count(&self, set: AppSet) -> usize {
        self.state.app_set(set).len()
    }

    pub fn add_app(&self, set: AppSet, app_id: AppId) -> StateResult<bool> {
        self.mutate(|| {
            check_app_id(app_id)?;
            Ok(self.state.app_set(set).add(app_id))
        })
    }

    /// Add several apps with a single save. Returns the number newly added.
    pub fn add_apps(
        &self,
        set: AppSet,
        app_ids: impl IntoIterator<Item = AppId>,
    ) -> StateResult<usize> {
        let app_ids: Vec<AppId> = app_ids.into_iter().collect();
        self.mutate(|| {
            if app_ids.is_empty() {
                return Err(StateError::InvalidArgument(format!("no app ids given for {set}")));
            }
            app_ids.iter().try_for_each(|id| check_app_id(*id))?;
            Ok(self.state.app_set(set).extend(app_ids))
        })
    }

    pub fn remove_app(&self, set: AppSet, app_id: AppId) -> StateResult<bool> {
        self.mutate(|| {
            check_app_id(app_id)?;
            Ok(self.state.app_set(set).remove(&app_id))
        })
    }

    pub fn clear_apps(&self, set: AppSet) -> StateResult<bool> {
        self.mutate(|| Ok(self.state.app_set(set).clear()))
    }

    // ── Trading blacklist ──────────────────────────────────────────

    pub fn trading_blacklist(&self) -> Vec<SteamId> {
        let mut ids = self.state.trading_blacklist.snapshot();
        ids.sort_unstable();
        ids
    }

    pub fn is_trading_blacklisted(&self, steam_id: SteamId) -> bool {
        self.state.trading_blacklist.contains(&steam_id)
    }

    pub fn add_trading_blacklisted(&self, steam_id: SteamId) -> StateResult<bool> {
        self.mutate(|| {
            check_steam_id(steam_id)?;
            Ok(self.state.trading_blacklist.add(steam_id))
        })
    }

    pub fn remove_trading_blacklisted(&self, steam_id: SteamId) -> StateResult<bool> {
        self.mutate(|| {
            check_steam_id(steam_id)?;
            Ok(self.state.trading_blacklist.remove(&steam_id))
        })
    }

    // ── Risky-app exclusions ───────────────────────────────────────

    /// Exclude `app_id` from risky farming until `until` (Unix seconds).
    pub fn ignore_risky_app(&self, app_id: AppId, until: UnixTime) -> StateResult<bool> {
        self.mutate(|| {
            check_app_id(app_id)?;
            Ok(self.state.farming_risky_ignored.insert(app_id, until))
        })
    }

    pub fn unignore_risky_app(&self, app_id: AppId) -> StateResult<bool> {
        self.mutate(|| {
            check_app_id(app_id)?;
            Ok(self.state.farming_risky_ignored.remove(&app_id).is_some())
        })
    }

    /// Stored expiry for `app_id`. Expired entries are still reported until
    /// the next [`sweep_expired`](Self::sweep_expired).
    pub fn risky_ignored_until(&self, app_id: AppId) -> Option<UnixTime> {
        self.state.farming_risky_ignored.get(&app_id)
    }

    pub fn is_risky_ignored(&self, app_id: AppId) -> bool {
        self.state.farming_risky_ignored.contains_key(&app_id)
    }

    /// All exclusions, sorted by app id.
    pub fn risky_ignored(&self) -> Vec<(AppId, UnixTime)> {
        let mut entries = self.state.farming_risky_ignored.snapshot();
        entries.sort_unstable();
        entries
    }

    /// Drop every exclusion that expires at or before `now`. All removals of
    /// one sweep share a single save. Returns the number removed.
    pub fn sweep_expired(&self, now: UnixTime) -> StateResult<usize> {
        let removed = self.mutate(|| {
            Ok(self
                .state
                .farming_risky_ignored
                .retain(|_, expires_at| *expires_at > now))
        })?;
        if removed > 0 {
            self.persister
                .span()
                .in_scope(|| debug!(removed, now, "swept expired risky exclusions"));
        }
        Ok(removed)
    }

    // ── Pending redemptions ────────────────────────────────────────

    /// Queue `(key, name)` pairs for background redemption.
    ///
    /// Keys already queued are skipped; new keys keep the batch's order after
    /// everything already queued. One save covers the whole batch, and none is
    /// scheduled if every key was already present. Returns the number queued.
    pub fn enqueue_pending<K, N>(
        &self,
        batch: impl IntoIterator<Item = (K, N)>,
    ) -> StateResult<usize>
    where
        K: Into<String>,
        N: Into<String>,
    {
        let batch: Vec<(String, String)> = batch
            .into_iter()
            .map(|(k, n)| (k.into(), n.into()))
            .collect();
        self.mutate(|| {
            if batch.is_empty() {
                return Err(StateError::InvalidArgument(
                    "pending redemption batch is empty".to_string(),
                ));
            }
            for (key, _) in &batch {
                check_key(key)?;
            }
            Ok(self.state.pending_redemptions.extend_new(batch))
        })
    }

    /// Oldest queued `(key, name)` without removing it.
    pub fn peek_pending(&self) -> Option<(String, String)> {
        self.state.pending_redemptions.first()
    }

    /// Remove `key` from the queue. Absent keys are a no-op without a save.
    pub fn remove_pending(&self, key: &str) -> StateResult<bool> {
        self.mutate(|| {
            check_key(key)?;
            Ok(self
                .state
                .pending_redemptions
                .remove(&key.to_string())
                .is_some())
        })
    }

    pub fn has_pending(&self, key: &str) -> bool {
        self.state.pending_redemptions.contains_key(&key.to_string())
    }

    pub fn pending_len(&self) -> usize {
        self.state.pending_redemptions.len()
    }

    /// The whole queue in FIFO order.
    pub fn pending_snapshot(&self) -> Vec<(String, String)> {
        self.state.pending_redemptions.snapshot()
    }

    /// The document as it would be written right now.
    pub fn to_file(&self) -> DatabaseFile {
        self.state.to_file()
    }
}

impl Drop for BotDatabase {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for BotDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotDatabase")
            .field("path", &self.path())
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}

/// Parse and validate the file at `path`, or `None` if there is no file.
fn load_file(fs: &dyn StateFs, path: &Path) -> StateResult<Option<DatabaseFile>> {
    let Some(content) = read_existing(fs, path)? else {
        return Ok(None);
    };
    let file = DatabaseFile::parse(&content).map_err(|reason| StateError::Malformed {
        path: path.display().to_string(),
        reason,
    })?;
    file.validate().map_err(|reason| StateError::Invalid {
        path: path.display().to_string(),
        reason,
    })?;
    Ok(Some(file))
}

fn check_app_id(app_id: AppId) -> StateResult<()> {
    if app_id == 0 {
        return Err(StateError::InvalidArgument("app id must be non-zero".to_string()));
    }
    Ok(())
}

fn check_steam_id(steam_id: SteamId) -> StateResult<()> {
    if steam_id == 0 {
        return Err(StateError::InvalidArgument("steam id must be non-zero".to_string()));
    }
    Ok(())
}

fn check_key(key: &str) -> StateResult<()> {
    if key.trim().is_empty() {
        return Err(StateError::InvalidArgument("redemption key is empty".to_string()));
    }
    Ok(())
}
