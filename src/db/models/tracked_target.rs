use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A player tracked by one guild, joined with the guild's delivery channel.
///
/// Only guilds with tracking enabled and a configured channel produce targets.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct TrackedTarget {
    pub guild_id: String,
    pub channel_id: String,
    /// Platform region as configured by the guild (e.g. `na1`).
    pub platform: String,
    pub puuid: String,
    pub display_name: String,
}

/// Key used to probe a player once per tick, however many guilds track them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeKey {
    pub platform: String,
    pub puuid: String,
}

impl ProbeKey {
    /// Platforms are compared case-insensitively, so `na1` and `NA1` share a key.
    pub fn new(platform: &str, puuid: &str) -> Self {
        Self {
            platform: platform.trim().to_lowercase(),
            puuid: puuid.to_string(),
        }
    }
}

impl From<&TrackedTarget> for ProbeKey {
    fn from(target: &TrackedTarget) -> Self {
        ProbeKey::new(&target.platform, &target.puuid)
    }
}
