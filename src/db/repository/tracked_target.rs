use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::TrackedTarget;
use crate::error::{AppError, AppResult};

/// Guild tracking configuration.
///
/// The tracker lists targets and switches tracking off when delivery access
/// is lost; the admin routes create guilds and add or remove players.
pub struct TrackedTargetRepository;

impl TrackedTargetRepository {
    /// All players tracked by guilds with tracking enabled and a delivery channel.
    pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<TrackedTarget>> {
        sqlx::query_as::<_, TrackedTarget>(
            r#"
            SELECT
                p.guild_id,
                g.channel_id,
                p.platform,
                p.puuid,
                p.display_name
            FROM tracked_players p
            JOIN guild_settings g ON g.guild_id = p.guild_id
            WHERE g.tracking_enabled = 1
              AND g.channel_id != ''
            ORDER BY p.guild_id, p.platform, p.display_name
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Turn tracking off for a guild. Returns whether a row changed.
    pub async fn disable_tracking(pool: &SqlitePool, guild_id: &str) -> AppResult<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE guild_settings
            SET tracking_enabled = 0, updated_at = ?
            WHERE guild_id = ? AND tracking_enabled = 1
            "#,
        )
        .bind(now)
        .bind(guild_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Create or update a guild's delivery channel and re-enable tracking.
    pub async fn upsert_guild(pool: &SqlitePool, guild_id: &str, channel_id: &str) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO guild_settings (guild_id, channel_id, tracking_enabled, created_at, updated_at)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET
                channel_id = excluded.channel_id,
                tracking_enabled = 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(guild_id)
        .bind(channel_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Track a player for a guild. Re-adding updates the display name.
    pub async fn add_player(
        pool: &SqlitePool,
        guild_id: &str,
        platform: &str,
        puuid: &str,
        display_name: &str,
    ) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO tracked_players (guild_id, platform, puuid, display_name, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(guild_id, platform, puuid) DO UPDATE SET
                display_name = excluded.display_name
            "#,
        )
        .bind(guild_id)
        .bind(platform.trim().to_lowercase())
        .bind(puuid)
        .bind(display_name)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Stop tracking a player for a guild. Returns whether a row was removed.
    pub async fn remove_player(
        pool: &SqlitePool,
        guild_id: &str,
        platform: &str,
        puuid: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM tracked_players WHERE guild_id = ? AND platform = ? AND puuid = ?",
        )
        .bind(guild_id)
        .bind(platform.trim().to_lowercase())
        .bind(puuid)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn guild_exists(pool: &SqlitePool, guild_id: &str) -> AppResult<bool> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM guild_settings WHERE guild_id = ?")
            .bind(guild_id)
            .fetch_one(pool)
            .await
            .map(|count| count > 0)
            .map_err(AppError::Database)
    }
}
