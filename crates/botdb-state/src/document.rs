//! On-disk JSON document for one bot.
//!
//! Every field is optional on disk. The writer decides field presence with
//! the predicate functions below (empty collections and unset scalars are
//! left out); the reader runs [`DatabaseFile::validate`] after parsing.
//! Unknown top-level fields are kept in `extra` and written back unchanged.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use botdb_core::{AppId, SteamId, UnixTime};

use crate::authenticator::MobileAuthenticator;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steam_guard_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_authenticator: Option<MobileAuthenticator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farming_blacklist_app_ids: Option<Vec<AppId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farming_priority_queue_app_ids: Option<Vec<AppId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farming_risky_prioritized_app_ids: Option<Vec<AppId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_actively_blacklisted_app_ids: Option<Vec<AppId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trading_blacklist_steam_ids: Option<Vec<SteamId>>,

    /// App id → Unix time the exclusion ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farming_risky_ignored_app_ids: Option<BTreeMap<AppId, UnixTime>>,

    /// Key → game name, in redemption order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub games_to_redeem_in_background: Option<IndexMap<String, String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sorted id list, or `None` when there is nothing to write.
pub fn persisted_ids<T: Ord>(mut ids: Vec<T>) -> Option<Vec<T>> {
    if ids.is_empty() {
        return None;
    }
    ids.sort_unstable();
    Some(ids)
}

/// Exclusions sorted by id, or `None` when there are none.
pub fn persisted_expiries(entries: Vec<(AppId, UnixTime)>) -> Option<BTreeMap<AppId, UnixTime>> {
    (!entries.is_empty()).then(|| entries.into_iter().collect())
}

/// Pending queue in FIFO order, or `None` when it is empty.
pub fn persisted_queue(entries: Vec<(String, String)>) -> Option<IndexMap<String, String>> {
    (!entries.is_empty()).then(|| entries.into_iter().collect())
}

impl DatabaseFile {
    pub fn parse(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    pub fn render(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }

    /// Reject documents the runtime cannot operate on.
    pub fn validate(&self) -> Result<(), String> {
        let id_sets: [(&str, Option<&Vec<AppId>>); 4] = [
            ("farming_blacklist_app_ids", self.farming_blacklist_app_ids.as_ref()),
            ("farming_priority_queue_app_ids", self.farming_priority_queue_app_ids.as_ref()),
            (
                "farming_risky_prioritized_app_ids",
                self.farming_risky_prioritized_app_ids.as_ref(),
            ),
            (
                "match_actively_blacklisted_app_ids",
                self.match_actively_blacklisted_app_ids.as_ref(),
            ),
        ];
        for (field, ids) in id_sets {
            if ids.is_some_and(|ids| ids.contains(&0)) {
                return Err(format!("{field} contains app id 0"));
            }
        }

        if self
            .trading_blacklist_steam_ids
            .as_ref()
            .is_some_and(|ids| ids.contains(&0))
        {
            return Err("trading_blacklist_steam_ids contains steam id 0".to_string());
        }

        if self
            .farming_risky_ignored_app_ids
            .as_ref()
            .is_some_and(|map| map.contains_key(&0))
        {
            return Err("farming_risky_ignored_app_ids contains app id 0".to_string());
        }

        if let Some(queue) = &self.games_to_redeem_in_background {
            if queue.keys().any(|key| key.trim().is_empty()) {
                return Err("games_to_redeem_in_background contains an empty key".to_string());
            }
        }

        if let Some(auth) = &self.mobile_authenticator {
            auth.validate()?;
        }

        Ok(())
    }
}
