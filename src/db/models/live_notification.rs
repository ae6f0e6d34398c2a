use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Identity of one tracked live match, scoped to a guild.
///
/// The same real match tracked by two guilds yields two keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchKey {
    pub guild_id: String,
    /// Upper-cased platform id (e.g. `NA1`).
    pub platform_id: String,
    pub game_id: i64,
}

impl MatchKey {
    /// Build a key, returning `None` when any component is unusable.
    pub fn new(guild_id: &str, platform_id: &str, game_id: i64) -> Option<Self> {
        let guild_id = guild_id.trim();
        let platform_id = platform_id.trim().to_uppercase();
        if guild_id.is_empty() || platform_id.is_empty() || game_id <= 0 {
            return None;
        }
        Some(Self {
            guild_id: guild_id.to_string(),
            platform_id,
            game_id,
        })
    }

    /// Match id in the form used by the match detail endpoint (`NA1_1001`).
    pub fn match_id(&self) -> String {
        format!("{}_{}", self.platform_id, self.game_id)
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.guild_id, self.platform_id, self.game_id)
    }
}

/// Durable notification record, one row per [`MatchKey`].
///
/// Lifecycle fields are nullable columns; see `services::tracker::lifecycle`
/// for the state derived from them.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LiveNotification {
    pub guild_id: String,
    pub platform_id: String,
    pub game_id: i64,
    pub match_id: String,

    pub queue_id: i64,
    pub queue_category: String,
    /// Representative tracked player chosen at live time.
    pub player_puuid: String,
    pub player_name: String,
    pub tracked_count: i64,

    pub channel_id: String,
    /// Empty until the live message has been posted.
    pub live_message_id: String,
    pub live_posted_at: Option<NaiveDateTime>,
    pub last_seen_live_at: NaiveDateTime,

    pub post_message_id: Option<String>,
    pub post_posted_at: Option<NaiveDateTime>,
    pub post_attempts: i64,
    pub post_next_attempt_at: Option<NaiveDateTime>,
    pub post_abandoned_at: Option<NaiveDateTime>,
    pub post_abandon_reason: Option<String>,
    pub post_last_error: Option<String>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl LiveNotification {
    pub fn key(&self) -> MatchKey {
        MatchKey {
            guild_id: self.guild_id.clone(),
            platform_id: self.platform_id.clone(),
            game_id: self.game_id,
        }
    }

    pub fn has_live_message(&self) -> bool {
        !self.live_message_id.is_empty()
    }
}

/// Match metadata refreshed on every live sighting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveMetadata {
    pub queue_id: i64,
    pub queue_category: String,
    pub player_puuid: String,
    pub player_name: String,
    pub tracked_count: i64,
    pub channel_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_key_normalizes_platform_and_rejects_invalid_parts() {
        let key = MatchKey::new("123", "na1", 1001).unwrap();
        assert_eq!(key.platform_id, "NA1");
        assert_eq!(key.match_id(), "NA1_1001");

        assert!(MatchKey::new("", "NA1", 1001).is_none());
        assert!(MatchKey::new("123", "  ", 1001).is_none());
        assert!(MatchKey::new("123", "NA1", 0).is_none());
        assert!(MatchKey::new("123", "NA1", -5).is_none());
    }
}
