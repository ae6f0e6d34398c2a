use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Cached match detail payload, written once per match id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub match_id: String,
    /// JSON-serialized match detail.
    pub payload: String,
    pub fetched_at: NaiveDateTime,
}
