use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use botdb_core::{BotDbConfig, now_secs};
use botdb_state::{AppSet, BotDatabase};

/// Counts and flags describing one state file. Secrets are never printed.
#[derive(Debug, Serialize)]
pub struct StateSummary {
    pub path: String,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub has_steam_guard_data: bool,
    pub has_mobile_authenticator: bool,
    pub app_sets: Vec<(String, usize)>,
    pub trading_blacklist: usize,
    pub risky_ignored: usize,
    /// Exclusions already past their expiry, waiting for a sweep.
    pub risky_ignored_expired: usize,
    pub pending_redemptions: usize,
    pub next_redemption: Option<String>,
}

impl StateSummary {
    fn from_database(db: &BotDatabase, now: u64) -> Self {
        let risky = db.risky_ignored();
        Self {
            path: db.path().display().to_string(),
            has_access_token: db.access_token().is_some(),
            has_refresh_token: db.refresh_token().is_some(),
            has_steam_guard_data: db.steam_guard_data().is_some(),
            has_mobile_authenticator: db.has_mobile_authenticator(),
            app_sets: AppSet::ALL
                .iter()
                .map(|set| (set.to_string(), db.app_count(*set)))
                .collect(),
            trading_blacklist: db.trading_blacklist().len(),
            risky_ignored: risky.len(),
            risky_ignored_expired: risky.iter().filter(|(_, until)| *until <= now).count(),
            pending_redemptions: db.pending_len(),
            next_redemption: db.peek_pending().map(|(_, name)| name),
        }
    }

    pub fn to_text(&self) -> String {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        let mut out = String::new();
        let _ = writeln!(out, "State file: {}", self.path);
        let _ = writeln!(out, "  access token:          {}", yes_no(self.has_access_token));
        let _ = writeln!(out, "  refresh token:         {}", yes_no(self.has_refresh_token));
        let _ = writeln!(out, "  steam guard data:      {}", yes_no(self.has_steam_guard_data));
        let _ = writeln!(out, "  mobile authenticator:  {}", yes_no(self.has_mobile_authenticator));
        for (name, count) in &self.app_sets {
            let _ = writeln!(out, "  {name:<27}{count}");
        }
        let _ = writeln!(out, "  {:<27}{}", "trading_blacklist", self.trading_blacklist);
        let _ = writeln!(
            out,
            "  {:<27}{} ({} expired)",
            "risky_ignored", self.risky_ignored, self.risky_ignored_expired
        );
        let _ = write!(out, "  {:<27}{}", "pending_redemptions", self.pending_redemptions);
        if let Some(next) = &self.next_redemption {
            let _ = write!(out, " (next: {next})");
        }
        out
    }
}

pub async fn inspect(path: &Path, config: &BotDbConfig) -> anyhow::Result<StateSummary> {
    let db = super::open_existing(path, config).await?;
    let summary = StateSummary::from_database(&db, now_secs());
    db.close().await;
    Ok(summary)
}

pub async fn pending(path: &Path, config: &BotDbConfig) -> anyhow::Result<Vec<(String, String)>> {
    let db = super::open_existing(path, config).await?;
    let queue = db.pending_snapshot();
    db.close().await;
    Ok(queue)
}

pub async fn validate(path: &Path, config: &BotDbConfig) -> anyhow::Result<()> {
    let db = super::open_existing(path, config).await?;
    db.close().await;
    Ok(())
}
