use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueueInfo {
    pub queue_id: i64,
    pub description: String,
    pub map_id: Option<i64>,
    pub category: String,
}

impl QueueInfo {
    pub fn category(&self) -> QueueCategory {
        QueueCategory::parse(&self.category)
    }
}

/// Classification of a matchmaking queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCategory {
    Ranked,
    Normal,
    Aram,
    Arena,
    Rotating,
    Bot,
    Custom,
    Tutorial,
    Other,
}

impl QueueCategory {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "ranked" => QueueCategory::Ranked,
            "normal" => QueueCategory::Normal,
            "aram" => QueueCategory::Aram,
            "arena" => QueueCategory::Arena,
            "rotating" => QueueCategory::Rotating,
            "bot" | "coop_vs_ai" => QueueCategory::Bot,
            "custom" => QueueCategory::Custom,
            "tutorial" => QueueCategory::Tutorial,
            _ => QueueCategory::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueCategory::Ranked => "ranked",
            QueueCategory::Normal => "normal",
            QueueCategory::Aram => "aram",
            QueueCategory::Arena => "arena",
            QueueCategory::Rotating => "rotating",
            QueueCategory::Bot => "bot",
            QueueCategory::Custom => "custom",
            QueueCategory::Tutorial => "tutorial",
            QueueCategory::Other => "other",
        }
    }

    /// Versus-AI, custom and tutorial games have no meaningful post-game data.
    pub fn supports_post_game(&self) -> bool {
        !matches!(
            self,
            QueueCategory::Bot | QueueCategory::Custom | QueueCategory::Tutorial
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive_and_round_trips() {
        assert_eq!(QueueCategory::parse("Ranked"), QueueCategory::Ranked);
        assert_eq!(QueueCategory::parse(" ARAM "), QueueCategory::Aram);
        assert_eq!(QueueCategory::parse("coop_vs_ai"), QueueCategory::Bot);
        assert_eq!(QueueCategory::parse("something-new"), QueueCategory::Other);
        assert_eq!(QueueCategory::parse(QueueCategory::Arena.as_str()), QueueCategory::Arena);
    }

    #[test]
    fn bot_and_custom_queues_have_no_post_game() {
        assert!(!QueueCategory::Bot.supports_post_game());
        assert!(!QueueCategory::Custom.supports_post_game());
        assert!(!QueueCategory::Tutorial.supports_post_game());
        assert!(QueueCategory::Ranked.supports_post_game());
        assert!(QueueCategory::Other.supports_post_game());
    }
}
