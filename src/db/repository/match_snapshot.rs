use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::db::models::MatchSnapshot;
use crate::error::{AppError, AppResult};

/// Durable cache of fetched match detail, keyed by match id.
pub struct MatchSnapshotRepository;

impl MatchSnapshotRepository {
    pub async fn get(pool: &SqlitePool, match_id: &str) -> AppResult<Option<MatchSnapshot>> {
        sqlx::query_as::<_, MatchSnapshot>(
            "SELECT match_id, payload, fetched_at FROM match_snapshots WHERE match_id = ?",
        )
        .bind(match_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Store a snapshot. The first write for a match id wins; returns whether this call inserted.
    pub async fn put(
        pool: &SqlitePool,
        match_id: &str,
        payload: &str,
        fetched_at: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO match_snapshots (match_id, payload, fetched_at)
            VALUES (?, ?, ?)
            ON CONFLICT(match_id) DO NOTHING
            "#,
        )
        .bind(match_id)
        .bind(payload)
        .bind(fetched_at)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn first_write_wins() {
        let pool = test_pool().await;
        let at = chrono::Utc::now().naive_utc();

        assert!(MatchSnapshotRepository::put(&pool, "NA1_1", r#"{"a":1}"#, at).await.unwrap());
        assert!(!MatchSnapshotRepository::put(&pool, "NA1_1", r#"{"a":2}"#, at).await.unwrap());

        let snap = MatchSnapshotRepository::get(&pool, "NA1_1").await.unwrap().unwrap();
        assert_eq!(snap.payload, r#"{"a":1}"#);
        assert!(MatchSnapshotRepository::get(&pool, "NA1_2").await.unwrap().is_none());
    }
}
