use std::collections::HashMap;

use sqlx::{Executor, Sqlite, SqlitePool};

use crate::db::models::QueueInfo;
use crate::error::{AppError, AppResult};

/// Lookup tables with an `(id, name)` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayTable {
    Maps,
    Champions,
    SummonerSpells,
    Runes,
    Items,
}

impl DisplayTable {
    fn table(&self) -> &'static str {
        match self {
            DisplayTable::Maps => "maps",
            DisplayTable::Champions => "champions",
            DisplayTable::SummonerSpells => "summoner_spells",
            DisplayTable::Runes => "runes",
            DisplayTable::Items => "items",
        }
    }

    fn id_column(&self) -> &'static str {
        match self {
            DisplayTable::Maps => "map_id",
            _ => "id",
        }
    }
}

/// Read access to static game data mirrored by the asset sync job.
pub struct StaticDataRepository;

impl StaticDataRepository {
    pub async fn queue_by_id(pool: &SqlitePool, queue_id: i64) -> AppResult<Option<QueueInfo>> {
        sqlx::query_as::<_, QueueInfo>(
            "SELECT queue_id, description, map_id, category FROM queues WHERE queue_id = ?",
        )
        .bind(queue_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn display_name(
        pool: &SqlitePool,
        table: DisplayTable,
        id: i64,
    ) -> AppResult<Option<String>> {
        let sql = format!(
            "SELECT name FROM {} WHERE {} = ?",
            table.table(),
            table.id_column()
        );
        sqlx::query_scalar::<_, String>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Batch lookup. Unknown ids are simply absent from the result.
    pub async fn display_names(
        pool: &SqlitePool,
        table: DisplayTable,
        ids: &[i64],
    ) -> AppResult<HashMap<i64, String>> {
        let mut unique: Vec<i64> = ids.iter().copied().filter(|id| *id > 0).collect();
        unique.sort_unstable();
        unique.dedup();
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; unique.len()].join(", ");
        let sql = format!(
            "SELECT {id}, name FROM {table} WHERE {id} IN ({placeholders})",
            id = table.id_column(),
            table = table.table(),
        );

        let mut query = sqlx::query_as::<_, (i64, String)>(&sql);
        for id in &unique {
            query = query.bind(*id);
        }

        let rows = query.fetch_all(pool).await.map_err(AppError::Database)?;
        Ok(rows.into_iter().collect())
    }

    /// Accepts a pool or an open transaction (`&mut *tx`).
    pub async fn upsert_queue<'e, E>(executor: E, queue: &QueueInfo) -> AppResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO queues (queue_id, description, map_id, category)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(queue_id) DO UPDATE SET
                description = excluded.description,
                map_id = excluded.map_id,
                category = excluded.category
            "#,
        )
        .bind(queue.queue_id)
        .bind(&queue.description)
        .bind(queue.map_id)
        .bind(&queue.category)
        .execute(executor)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn upsert_display_name<'e, E>(
        executor: E,
        table: DisplayTable,
        id: i64,
        name: &str,
    ) -> AppResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "INSERT INTO {table} ({id}, name) VALUES (?, ?) ON CONFLICT({id}) DO UPDATE SET name = excluded.name",
            table = table.table(),
            id = table.id_column(),
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(name)
            .execute(executor)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn batch_lookup_skips_unknown_and_duplicate_ids() {
        let pool = test_pool().await;
        StaticDataRepository::upsert_display_name(&pool, DisplayTable::Items, 3078, "Trinity Force")
            .await
            .unwrap();
        StaticDataRepository::upsert_display_name(&pool, DisplayTable::Items, 6672, "Kraken Slayer")
            .await
            .unwrap();

        let names = StaticDataRepository::display_names(
            &pool,
            DisplayTable::Items,
            &[3078, 3078, 0, 9999, 6672],
        )
        .await
        .unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[&3078], "Trinity Force");

        StaticDataRepository::upsert_display_name(&pool, DisplayTable::Maps, 11, "Summoner's Rift")
            .await
            .unwrap();
        assert_eq!(
            StaticDataRepository::display_name(&pool, DisplayTable::Maps, 11)
                .await
                .unwrap()
                .as_deref(),
            Some("Summoner's Rift")
        );
    }

    #[tokio::test]
    async fn queue_lookup() {
        let pool = test_pool().await;
        assert!(StaticDataRepository::queue_by_id(&pool, 420).await.unwrap().is_none());

        StaticDataRepository::upsert_queue(
            &pool,
            &QueueInfo {
                queue_id: 420,
                description: "Ranked Solo/Duo".to_string(),
                map_id: Some(11),
                category: "ranked".to_string(),
            },
        )
        .await
        .unwrap();

        let queue = StaticDataRepository::queue_by_id(&pool, 420).await.unwrap().unwrap();
        assert_eq!(queue.description, "Ranked Solo/Duo");
        assert_eq!(queue.map_id, Some(11));
    }
}
