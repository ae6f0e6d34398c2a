use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::db::models::{LiveNotification, MatchKey, TrackedTarget};
use crate::db::repository::{
    DisplayTable, LiveNotificationRepository, MatchSnapshotRepository, StaticDataRepository,
    TrackedTargetRepository,
};
use crate::error::{AppError, AppResult, DeliveryError};
use crate::services::discord::{DiscordMessage, Notifier, MAX_EMBEDS_PER_MESSAGE};
use crate::services::riot::{MatchDetail, StatsApi};

use super::aggregate::LiveMatch;
use super::lifecycle::{
    evaluate_pending, revalidate_queue, schedule_retry, AbandonReason, LifecycleState, PostDecision,
    RetryPolicy,
};
use super::render::{self, DisplayNames};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Skipped,
    Posted,
    Retrying,
    Abandoned(AbandonReason),
}

/// Everything one resolver pass needs from the surrounding tick.
pub struct PostGameResolver<'a> {
    pub pool: &'a SqlitePool,
    pub stats_api: &'a dyn StatsApi,
    pub notifier: &'a dyn Notifier,
    /// This tick's targets, used to find every tracked participant.
    pub targets: &'a [TrackedTarget],
    /// This tick's live set; records still in it are skipped.
    pub live: &'a BTreeMap<MatchKey, LiveMatch>,
    pub now: NaiveDateTime,
    pub abandon_after: Duration,
    pub policy: RetryPolicy,
}

impl<'a> PostGameResolver<'a> {
    pub async fn resolve(&self, record: &LiveNotification) -> AppResult<PostOutcome> {
        let key = record.key();
        let still_live = self.live.contains_key(&key);
        let state = LifecycleState::of(record, still_live);
        if state.is_terminal() {
            return Ok(PostOutcome::Skipped);
        }
        tracing::debug!(
            match_id = %record.match_id,
            guild_id = %record.guild_id,
            state = state.as_str(),
            attempts = record.post_attempts,
            "Resolving notification"
        );

        match evaluate_pending(record, still_live, self.now, self.abandon_after) {
            PostDecision::Skip => Ok(PostOutcome::Skipped),
            PostDecision::Abandon(reason) => self.abandon(record, reason).await,
            PostDecision::Resolve { continent } => self.post(record, continent).await,
        }
    }

    async fn post(&self, record: &LiveNotification, continent: &str) -> AppResult<PostOutcome> {
        let detail = match self.load_detail(continent, &record.match_id).await {
            Ok(detail) => detail,
            Err(AppError::Riot(e)) => {
                return self
                    .retry(record, &format!("match detail unavailable: {}", e))
                    .await;
            }
            Err(e) => return Err(e),
        };

        let detail_queue = StaticDataRepository::queue_by_id(self.pool, detail.info.queue_id).await?;
        if let Some(reason) = revalidate_queue(
            record,
            detail.info.queue_id,
            detail_queue.as_ref().map(|q| q.category()),
        ) {
            return self.abandon(record, reason).await;
        }

        let queue_name = match detail_queue {
            Some(q) => q.description,
            None => StaticDataRepository::queue_by_id(self.pool, record.queue_id)
                .await?
                .map(|q| q.description)
                .unwrap_or_else(|| "Unknown queue".to_string()),
        };

        let participants = self.tracked_participants(record, &detail);
        let names = self.display_names(&detail, &participants).await?;

        let embeds: Vec<_> = participants
            .iter()
            .filter_map(|(puuid, name)| {
                render::post_game_embed(&detail, puuid, name, &queue_name, &names)
            })
            .collect();
        if embeds.is_empty() {
            return self
                .retry(record, "no tracked participant found in match detail")
                .await;
        }

        let mut last_message_id = None;
        for (i, chunk) in embeds.chunks(MAX_EMBEDS_PER_MESSAGE).enumerate() {
            let mut message = DiscordMessage::embeds(chunk.to_vec());
            if i == 0 {
                message = message.reply_to(&record.live_message_id);
            }

            match self.notifier.send_message(&record.channel_id, message).await {
                Ok(id) => last_message_id = Some(id),
                Err(DeliveryError::PermissionLost { code, message }) => {
                    tracing::warn!(
                        guild_id = %record.guild_id,
                        channel_id = %record.channel_id,
                        code,
                        "Lost access to channel, disabling tracking: {}",
                        message
                    );
                    TrackedTargetRepository::disable_tracking(self.pool, &record.guild_id).await?;
                    return self.abandon(record, AbandonReason::PermissionLost).await;
                }
                Err(e) => {
                    return self
                        .retry(record, &format!("post-game send failed: {}", e))
                        .await;
                }
            }
        }

        let Some(message_id) = last_message_id else {
            return self.retry(record, "nothing was sent").await;
        };

        if LiveNotificationRepository::mark_post_posted(self.pool, &record.key(), &message_id, self.now)
            .await?
        {
            tracing::info!(
                match_id = %record.match_id,
                guild_id = %record.guild_id,
                message_id = %message_id,
                players = embeds.len(),
                "Posted post-game summary"
            );
        }
        Ok(PostOutcome::Posted)
    }

    /// Snapshot cache first; fetch and store on a miss.
    async fn load_detail(&self, continent: &str, match_id: &str) -> AppResult<MatchDetail> {
        if let Some(snapshot) = MatchSnapshotRepository::get(self.pool, match_id).await? {
            match serde_json::from_str::<MatchDetail>(&snapshot.payload) {
                Ok(detail) => return Ok(detail),
                Err(e) => {
                    tracing::warn!(match_id = %match_id, "Ignoring unreadable snapshot: {}", e);
                }
            }
        }

        let detail = self.stats_api.match_detail(continent, match_id).await?;
        let payload = serde_json::to_string(&detail)?;
        MatchSnapshotRepository::put(self.pool, match_id, &payload, self.now).await?;
        Ok(detail)
    }

    /// Tracked players of this guild and platform present in the match.
    /// Falls back to the representative recorded at live time.
    fn tracked_participants(
        &self,
        record: &LiveNotification,
        detail: &MatchDetail,
    ) -> Vec<(String, String)> {
        let mut seen = HashSet::new();
        let mut found: Vec<(String, String)> = self
            .targets
            .iter()
            .filter(|t| {
                t.guild_id == record.guild_id
                    && t.platform.eq_ignore_ascii_case(&record.platform_id)
                    && detail.participant(&t.puuid).is_some()
            })
            .filter(|t| seen.insert(t.puuid.clone()))
            .map(|t| (t.puuid.clone(), t.display_name.clone()))
            .collect();

        if found.is_empty() {
            found.push((record.player_puuid.clone(), record.player_name.clone()));
        }
        found.sort_by(|a, b| a.1.cmp(&b.1));
        found
    }

    async fn display_names(
        &self,
        detail: &MatchDetail,
        participants: &[(String, String)],
    ) -> AppResult<DisplayNames> {
        let present: Vec<_> = participants
            .iter()
            .filter_map(|(puuid, _)| detail.participant(puuid))
            .collect();

        let champions: Vec<i64> = present.iter().map(|p| p.champion_id).collect();
        let spells: Vec<i64> = present
            .iter()
            .flat_map(|p| [p.summoner1_id, p.summoner2_id])
            .collect();
        let runes: Vec<i64> = present.iter().filter_map(|p| p.keystone()).collect();
        let items: Vec<i64> = present.iter().flat_map(|p| p.items()).collect();

        Ok(DisplayNames {
            champions: StaticDataRepository::display_names(
                self.pool,
                DisplayTable::Champions,
                &champions,
            )
            .await?,
            spells: StaticDataRepository::display_names(
                self.pool,
                DisplayTable::SummonerSpells,
                &spells,
            )
            .await?,
            runes: StaticDataRepository::display_names(self.pool, DisplayTable::Runes, &runes)
                .await?,
            items: StaticDataRepository::display_names(self.pool, DisplayTable::Items, &items)
                .await?,
        })
    }

    async fn retry(&self, record: &LiveNotification, error: &str) -> AppResult<PostOutcome> {
        let (attempts, next_attempt_at) =
            schedule_retry(record.post_attempts, self.now, &self.policy);
        LiveNotificationRepository::mark_post_retry(
            self.pool,
            &record.key(),
            attempts,
            next_attempt_at,
            error,
            self.now,
        )
        .await?;

        tracing::warn!(
            match_id = %record.match_id,
            guild_id = %record.guild_id,
            attempts,
            next_attempt_at = %next_attempt_at,
            "Post-game summary deferred: {}",
            error
        );
        Ok(PostOutcome::Retrying)
    }

    async fn abandon(
        &self,
        record: &LiveNotification,
        reason: AbandonReason,
    ) -> AppResult<PostOutcome> {
        LiveNotificationRepository::abandon(self.pool, &record.key(), self.now, reason.as_str())
            .await?;
        tracing::info!(
            match_id = %record.match_id,
            guild_id = %record.guild_id,
            reason = reason.as_str(),
            "Abandoned post-game summary"
        );
        Ok(PostOutcome::Abandoned(reason))
    }
}
