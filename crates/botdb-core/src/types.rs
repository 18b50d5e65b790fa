//! Shared types used across botdb crates.

use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of an application (game) on the storefront.
pub type AppId = u32;

/// 64-bit account identifier of a trading partner.
pub type SteamId = u64;

/// Unix timestamp in seconds.
pub type UnixTime = u64;

/// Current Unix time in seconds.
pub fn now_secs() -> UnixTime {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
