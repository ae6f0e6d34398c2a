use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::models::{QueueCategory, QueueInfo};
use crate::db::{DisplayTable, StaticDataRepository};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AdminAuth;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(import))
}

/// Static game data pushed by the asset sync job. Every section is optional;
/// name maps are keyed by the numeric id as a string.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StaticDataImport {
    pub queues: Vec<QueueInfo>,
    pub maps: HashMap<String, String>,
    pub champions: HashMap<String, String>,
    pub summoner_spells: HashMap<String, String>,
    pub runes: HashMap<String, String>,
    pub items: HashMap<String, String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ImportSummary {
    pub queues: usize,
    pub maps: usize,
    pub champions: usize,
    pub summoner_spells: usize,
    pub runes: usize,
    pub items: usize,
}

async fn import(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Json(body): Json<StaticDataImport>,
) -> AppResult<Json<ImportSummary>> {
    let mut summary = ImportSummary::default();
    // All or nothing: an invalid entry leaves the tables as they were.
    let mut tx = state.db.begin().await.map_err(AppError::Database)?;

    for mut queue in body.queues {
        // Store the canonical spelling so lookups never depend on input casing.
        queue.category = QueueCategory::parse(&queue.category).as_str().to_string();
        StaticDataRepository::upsert_queue(&mut *tx, &queue).await?;
        summary.queues += 1;
    }

    let tables = [
        (DisplayTable::Maps, body.maps, &mut summary.maps),
        (DisplayTable::Champions, body.champions, &mut summary.champions),
        (
            DisplayTable::SummonerSpells,
            body.summoner_spells,
            &mut summary.summoner_spells,
        ),
        (DisplayTable::Runes, body.runes, &mut summary.runes),
        (DisplayTable::Items, body.items, &mut summary.items),
    ];
    for (table, names, count) in tables {
        for (id, name) in names {
            let id: i64 = id
                .trim()
                .parse()
                .map_err(|_| AppError::Validation(format!("invalid id '{}'", id)))?;
            StaticDataRepository::upsert_display_name(&mut *tx, table, id, &name).await?;
            *count += 1;
        }
    }

    tx.commit().await.map_err(AppError::Database)?;

    tracing::info!(
        queues = summary.queues,
        champions = summary.champions,
        items = summary.items,
        "Imported static game data"
    );
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use crate::db::models::QueueCategory;
    use crate::db::{DisplayTable, StaticDataRepository};
    use crate::routes::tests::{request, test_state};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn imports_queues_and_names() {
        let state = test_state(None).await;

        let (status, body) = request(
            state.clone(),
            "POST",
            "/api/static-data",
            None,
            Some(json!({
                "queues": [
                    { "queue_id": 420, "description": "Ranked Solo/Duo", "map_id": 11, "category": "Ranked" }
                ],
                "maps": { "11": "Summoner's Rift" },
                "champions": { "157": "Yasuo", "99": "Lux" }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["queues"], 1);
        assert_eq!(body["champions"], 2);
        assert_eq!(body["items"], 0);

        let queue = StaticDataRepository::queue_by_id(&state.db, 420)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queue.category, "ranked");
        assert_eq!(queue.category(), QueueCategory::Ranked);
        assert_eq!(
            StaticDataRepository::display_name(&state.db, DisplayTable::Maps, 11)
                .await
                .unwrap()
                .as_deref(),
            Some("Summoner's Rift")
        );
    }

    #[tokio::test]
    async fn invalid_id_rolls_back_whole_import() {
        let state = test_state(None).await;
        let (status, _) = request(
            state.clone(),
            "POST",
            "/api/static-data",
            None,
            Some(json!({
                "queues": [
                    { "queue_id": 420, "description": "Ranked Solo/Duo", "map_id": 11, "category": "ranked" }
                ],
                "champions": { "157": "Yasuo" },
                "items": { "boots": "Boots" }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(StaticDataRepository::queue_by_id(&state.db, 420)
            .await
            .unwrap()
            .is_none());
        assert!(
            StaticDataRepository::display_name(&state.db, DisplayTable::Champions, 157)
                .await
                .unwrap()
                .is_none()
        );
    }
}
