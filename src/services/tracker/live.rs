use std::collections::HashMap;

use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::db::models::{LiveMetadata, QueueCategory};
use crate::db::repository::{
    DisplayTable, LiveNotificationRepository, StaticDataRepository, TrackedTargetRepository,
};
use crate::error::{AppResult, DeliveryError};
use crate::services::discord::Notifier;
use crate::services::riot::{LeagueEntry, StatsApi};

use super::aggregate::LiveMatch;
use super::render;

/// Result of publishing one live match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivePublish {
    Posted,
    AlreadyPosted,
    /// Queue or map metadata missing, or nobody to announce; retried next tick.
    Skipped,
    /// Transient delivery failure; retried next tick.
    SendFailed,
    TrackingDisabled,
    /// Another tick recorded its message first.
    LostRace,
}

/// Record the sighting of `live` and post its live message if none exists yet.
pub async fn publish_live(
    pool: &SqlitePool,
    stats_api: &dyn StatsApi,
    notifier: &dyn Notifier,
    live: &LiveMatch,
    now: NaiveDateTime,
) -> AppResult<LivePublish> {
    let Some((rep_puuid, rep_name)) = live.representative() else {
        return Ok(LivePublish::Skipped);
    };

    let queue_id = live.game.game_queue_config_id;
    let Some(queue) = StaticDataRepository::queue_by_id(pool, queue_id).await? else {
        tracing::debug!(
            match_key = %live.key,
            queue_id,
            "Queue not in static data yet, skipping live match this tick"
        );
        return Ok(LivePublish::Skipped);
    };

    let meta = LiveMetadata {
        queue_id,
        queue_category: queue.category().as_str().to_string(),
        player_puuid: rep_puuid.to_string(),
        player_name: rep_name.to_string(),
        tracked_count: live.tracked_count() as i64,
        channel_id: live.channel_id.clone(),
    };
    let record = LiveNotificationRepository::upsert_live(pool, &live.key, &meta, now).await?;
    if record.has_live_message() {
        return Ok(LivePublish::AlreadyPosted);
    }

    let map_id = queue.map_id.unwrap_or(live.game.map_id);
    let Some(map_name) = StaticDataRepository::display_name(pool, DisplayTable::Maps, map_id).await?
    else {
        // The sighting is recorded; the empty message id makes the next tick try again.
        tracing::debug!(
            match_key = %live.key,
            map_id,
            "Map not in static data yet, skipping live message this tick"
        );
        return Ok(LivePublish::Skipped);
    };

    let champion_ids: Vec<i64> = live
        .players
        .keys()
        .filter_map(|puuid| live.game.participant(puuid))
        .map(|p| p.champion_id)
        .collect();
    let champions =
        StaticDataRepository::display_names(pool, DisplayTable::Champions, &champion_ids).await?;

    let ranks = if queue.category() == QueueCategory::Ranked {
        ranked_entries(stats_api, live, queue_id).await
    } else {
        HashMap::new()
    };

    let message = render::live_message(live, &queue, &map_name, &champions, &ranks);

    let message_id = match notifier.send_message(&record.channel_id, message).await {
        Ok(id) => id,
        Err(DeliveryError::PermissionLost { code, message }) => {
            tracing::warn!(
                guild_id = %live.key.guild_id,
                channel_id = %record.channel_id,
                code,
                "Lost access to channel, disabling tracking: {}",
                message
            );
            TrackedTargetRepository::disable_tracking(pool, &live.key.guild_id).await?;
            return Ok(LivePublish::TrackingDisabled);
        }
        Err(e) => {
            tracing::warn!(
                match_key = %live.key,
                "Failed to send live notification: {}",
                e
            );
            return Ok(LivePublish::SendFailed);
        }
    };

    let recorded = LiveNotificationRepository::mark_live_posted(
        pool,
        &live.key,
        &record.channel_id,
        &message_id,
        now,
    )
    .await?;

    if recorded {
        tracing::info!(
            match_key = %live.key,
            message_id = %message_id,
            tracked = live.tracked_count(),
            "Posted live notification"
        );
        Ok(LivePublish::Posted)
    } else {
        tracing::warn!(
            match_key = %live.key,
            message_id = %message_id,
            "Live notification was already recorded by another tick"
        );
        Ok(LivePublish::LostRace)
    }
}

/// Ranked entry per tracked player for this queue. Lookup failures are skipped.
async fn ranked_entries(
    stats_api: &dyn StatsApi,
    live: &LiveMatch,
    queue_id: i64,
) -> HashMap<String, LeagueEntry> {
    let queue_type = render::ranked_queue_type(queue_id);
    let mut ranks = HashMap::new();

    for puuid in live.players.keys() {
        match stats_api.league_entries(&live.platform, puuid).await {
            Ok(entries) => {
                let entry = entries
                    .into_iter()
                    .find(|e| queue_type.map_or(true, |qt| e.queue_type == qt));
                if let Some(entry) = entry {
                    ranks.insert(puuid.clone(), entry);
                }
            }
            Err(e) => {
                tracing::debug!(puuid = %puuid, "League lookup failed: {}", e);
            }
        }
    }

    ranks
}
