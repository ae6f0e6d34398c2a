use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::db::models::{LiveMetadata, LiveNotification, MatchKey};
use crate::error::{AppError, AppResult};

/// Upper bound for persisted error text.
const MAX_ERROR_LEN: usize = 500;

/// Repository for per-match notification records.
///
/// Implementation notes:
/// - Every lifecycle write is conditional (`WHERE live_message_id = ''`,
///   `WHERE post_posted_at IS NULL AND post_abandoned_at IS NULL`) so two
///   overlapping ticks cannot both win the same transition.
/// - `last_seen_live_at` only moves forward (`MAX(old, new)`).
pub struct LiveNotificationRepository;

impl LiveNotificationRepository {
    /// Insert the record for `key` or refresh its metadata and last-seen time.
    ///
    /// Never touches an already-set live message id; the delivery channel is
    /// only replaced while nothing has been posted yet.
    pub async fn upsert_live(
        pool: &SqlitePool,
        key: &MatchKey,
        meta: &LiveMetadata,
        seen_at: NaiveDateTime,
    ) -> AppResult<LiveNotification> {
        sqlx::query_as::<_, LiveNotification>(
            r#"
            INSERT INTO live_notifications (
                guild_id,
                platform_id,
                game_id,
                match_id,
                queue_id,
                queue_category,
                player_puuid,
                player_name,
                tracked_count,
                channel_id,
                live_message_id,
                last_seen_live_at,
                post_attempts,
                created_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, '', ?, 0, ?, ?)
            ON CONFLICT(guild_id, platform_id, game_id) DO UPDATE SET
                match_id = excluded.match_id,
                queue_id = excluded.queue_id,
                queue_category = excluded.queue_category,
                player_puuid = excluded.player_puuid,
                player_name = excluded.player_name,
                tracked_count = excluded.tracked_count,
                channel_id = CASE
                    WHEN live_notifications.live_message_id = '' THEN excluded.channel_id
                    ELSE live_notifications.channel_id
                END,
                last_seen_live_at = MAX(live_notifications.last_seen_live_at, excluded.last_seen_live_at),
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(&key.guild_id)
        .bind(&key.platform_id)
        .bind(key.game_id)
        .bind(key.match_id())
        .bind(meta.queue_id)
        .bind(&meta.queue_category)
        .bind(&meta.player_puuid)
        .bind(&meta.player_name)
        .bind(meta.tracked_count)
        .bind(&meta.channel_id)
        .bind(seen_at)
        .bind(seen_at)
        .bind(seen_at)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Record the live message. No-op (returns `false`) unless the message id is still empty.
    pub async fn mark_live_posted(
        pool: &SqlitePool,
        key: &MatchKey,
        channel_id: &str,
        message_id: &str,
        at: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE live_notifications
            SET live_message_id = ?, live_posted_at = ?, channel_id = ?, updated_at = ?
            WHERE guild_id = ? AND platform_id = ? AND game_id = ?
              AND live_message_id = ''
            "#,
        )
        .bind(message_id)
        .bind(at)
        .bind(channel_id)
        .bind(at)
        .bind(&key.guild_id)
        .bind(&key.platform_id)
        .bind(key.game_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Records with a live post, no post-game outcome, and a due (or unset) next attempt.
    pub async fn list_pending_post(
        pool: &SqlitePool,
        now: NaiveDateTime,
        limit: i64,
    ) -> AppResult<Vec<LiveNotification>> {
        sqlx::query_as::<_, LiveNotification>(
            r#"
            SELECT * FROM live_notifications
            WHERE live_message_id != ''
              AND post_posted_at IS NULL
              AND post_abandoned_at IS NULL
              AND (post_next_attempt_at IS NULL OR post_next_attempt_at <= ?)
            ORDER BY last_seen_live_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Persist attempt count, next attempt time and failure reason in one statement.
    pub async fn mark_post_retry(
        pool: &SqlitePool,
        key: &MatchKey,
        attempts: i64,
        next_attempt_at: NaiveDateTime,
        last_error: &str,
        now: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE live_notifications
            SET post_attempts = ?, post_next_attempt_at = ?, post_last_error = ?, updated_at = ?
            WHERE guild_id = ? AND platform_id = ? AND game_id = ?
              AND post_posted_at IS NULL
              AND post_abandoned_at IS NULL
            "#,
        )
        .bind(attempts)
        .bind(next_attempt_at)
        .bind(truncate_error(last_error))
        .bind(now)
        .bind(&key.guild_id)
        .bind(&key.platform_id)
        .bind(key.game_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Terminal success. No-op once the record is posted or abandoned.
    pub async fn mark_post_posted(
        pool: &SqlitePool,
        key: &MatchKey,
        message_id: &str,
        at: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE live_notifications
            SET post_message_id = ?, post_posted_at = ?, post_next_attempt_at = NULL, updated_at = ?
            WHERE guild_id = ? AND platform_id = ? AND game_id = ?
              AND post_posted_at IS NULL
              AND post_abandoned_at IS NULL
            "#,
        )
        .bind(message_id)
        .bind(at)
        .bind(at)
        .bind(&key.guild_id)
        .bind(&key.platform_id)
        .bind(key.game_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Terminal give-up. No-op once the record is posted or abandoned.
    pub async fn abandon(
        pool: &SqlitePool,
        key: &MatchKey,
        at: NaiveDateTime,
        reason: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE live_notifications
            SET post_abandoned_at = ?, post_abandon_reason = ?, post_next_attempt_at = NULL, updated_at = ?
            WHERE guild_id = ? AND platform_id = ? AND game_id = ?
              AND post_posted_at IS NULL
              AND post_abandoned_at IS NULL
            "#,
        )
        .bind(at)
        .bind(truncate_error(reason))
        .bind(at)
        .bind(&key.guild_id)
        .bind(&key.platform_id)
        .bind(key.game_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    #[cfg(test)]
    pub async fn find(pool: &SqlitePool, key: &MatchKey) -> AppResult<Option<LiveNotification>> {
        sqlx::query_as::<_, LiveNotification>(
            r#"
            SELECT * FROM live_notifications
            WHERE guild_id = ? AND platform_id = ? AND game_id = ?
            "#,
        )
        .bind(&key.guild_id)
        .bind(&key.platform_id)
        .bind(key.game_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Delete records created before `older_than`, then snapshots no record references.
    ///
    /// Returns the number of notification rows deleted.
    pub async fn cleanup(pool: &SqlitePool, older_than: NaiveDateTime) -> AppResult<u64> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let deleted = sqlx::query("DELETE FROM live_notifications WHERE created_at < ?")
            .bind(older_than)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?
            .rows_affected();

        sqlx::query(
            r#"
            DELETE FROM match_snapshots
            WHERE match_id NOT IN (SELECT DISTINCT match_id FROM live_notifications)
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(deleted)
    }
}

fn truncate_error(text: &str) -> String {
    if text.len() <= MAX_ERROR_LEN {
        return text.to_string();
    }
    let mut end = MAX_ERROR_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::db::MatchSnapshotRepository;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn key() -> MatchKey {
        MatchKey::new("g1", "NA1", 1001).unwrap()
    }

    fn meta(channel: &str) -> LiveMetadata {
        LiveMetadata {
            queue_id: 420,
            queue_category: "ranked".to_string(),
            player_puuid: "p1".to_string(),
            player_name: "Alpha".to_string(),
            tracked_count: 1,
            channel_id: channel.to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_keeps_live_message() {
        let pool = test_pool().await;
        let first = LiveNotificationRepository::upsert_live(&pool, &key(), &meta("c1"), t0())
            .await
            .unwrap();
        assert_eq!(first.match_id, "NA1_1001");
        assert!(!first.has_live_message());

        assert!(
            LiveNotificationRepository::mark_live_posted(&pool, &key(), "c1", "m1", t0())
                .await
                .unwrap()
        );

        let later = t0() + Duration::minutes(1);
        let second = LiveNotificationRepository::upsert_live(&pool, &key(), &meta("c2"), later)
            .await
            .unwrap();
        assert_eq!(second.live_message_id, "m1");
        assert_eq!(second.channel_id, "c1");
        assert_eq!(second.last_seen_live_at, later);
        assert_eq!(second.created_at, first.created_at);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM live_notifications")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn last_seen_never_moves_backwards() {
        let pool = test_pool().await;
        let later = t0() + Duration::minutes(5);
        LiveNotificationRepository::upsert_live(&pool, &key(), &meta("c1"), later)
            .await
            .unwrap();
        let row = LiveNotificationRepository::upsert_live(&pool, &key(), &meta("c1"), t0())
            .await
            .unwrap();
        assert_eq!(row.last_seen_live_at, later);
    }

    #[tokio::test]
    async fn mark_live_posted_succeeds_once() {
        let pool = test_pool().await;
        LiveNotificationRepository::upsert_live(&pool, &key(), &meta("c1"), t0())
            .await
            .unwrap();

        assert!(
            LiveNotificationRepository::mark_live_posted(&pool, &key(), "c1", "m1", t0())
                .await
                .unwrap()
        );
        assert!(
            !LiveNotificationRepository::mark_live_posted(&pool, &key(), "c1", "m2", t0())
                .await
                .unwrap()
        );

        let row = LiveNotificationRepository::find(&pool, &key()).await.unwrap().unwrap();
        assert_eq!(row.live_message_id, "m1");
    }

    #[tokio::test]
    async fn pending_listing_respects_next_attempt_and_terminal_states() {
        let pool = test_pool().await;
        LiveNotificationRepository::upsert_live(&pool, &key(), &meta("c1"), t0())
            .await
            .unwrap();

        // Not live-posted yet: never pending.
        assert!(LiveNotificationRepository::list_pending_post(&pool, t0(), 10)
            .await
            .unwrap()
            .is_empty());

        LiveNotificationRepository::mark_live_posted(&pool, &key(), "c1", "m1", t0())
            .await
            .unwrap();
        assert_eq!(
            LiveNotificationRepository::list_pending_post(&pool, t0(), 10)
                .await
                .unwrap()
                .len(),
            1
        );

        let next = t0() + Duration::seconds(15);
        LiveNotificationRepository::mark_post_retry(&pool, &key(), 1, next, "boom", t0())
            .await
            .unwrap();
        assert!(LiveNotificationRepository::list_pending_post(&pool, t0(), 10)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            LiveNotificationRepository::list_pending_post(&pool, next, 10)
                .await
                .unwrap()
                .len(),
            1
        );

        assert!(
            LiveNotificationRepository::mark_post_posted(&pool, &key(), "m2", next)
                .await
                .unwrap()
        );
        assert!(
            !LiveNotificationRepository::abandon(&pool, &key(), next, "timeout")
                .await
                .unwrap()
        );
        assert!(LiveNotificationRepository::list_pending_post(&pool, next, 10)
            .await
            .unwrap()
            .is_empty());

        let row = LiveNotificationRepository::find(&pool, &key()).await.unwrap().unwrap();
        assert_eq!(row.post_attempts, 1);
        assert!(row.post_abandoned_at.is_none());
    }

    #[tokio::test]
    async fn retry_error_text_is_truncated() {
        let pool = test_pool().await;
        LiveNotificationRepository::upsert_live(&pool, &key(), &meta("c1"), t0())
            .await
            .unwrap();
        let long = "é".repeat(400);
        LiveNotificationRepository::mark_post_retry(&pool, &key(), 1, t0(), &long, t0())
            .await
            .unwrap();

        let row = LiveNotificationRepository::find(&pool, &key()).await.unwrap().unwrap();
        assert!(row.post_last_error.unwrap().len() <= MAX_ERROR_LEN);
    }

    #[tokio::test]
    async fn cleanup_removes_old_records_and_orphaned_snapshots() {
        let pool = test_pool().await;
        LiveNotificationRepository::upsert_live(&pool, &key(), &meta("c1"), t0())
            .await
            .unwrap();
        let recent = MatchKey::new("g1", "NA1", 2002).unwrap();
        LiveNotificationRepository::upsert_live(&pool, &recent, &meta("c1"), t0() + Duration::days(3))
            .await
            .unwrap();
        MatchSnapshotRepository::put(&pool, "NA1_1001", "{}", t0()).await.unwrap();
        MatchSnapshotRepository::put(&pool, "NA1_2002", "{}", t0()).await.unwrap();

        let deleted = LiveNotificationRepository::cleanup(&pool, t0() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(LiveNotificationRepository::find(&pool, &key()).await.unwrap().is_none());
        assert!(MatchSnapshotRepository::get(&pool, "NA1_1001").await.unwrap().is_none());
        assert!(MatchSnapshotRepository::get(&pool, "NA1_2002").await.unwrap().is_some());
    }
}
