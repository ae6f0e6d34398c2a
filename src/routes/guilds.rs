use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::TrackedTargetRepository;
use crate::error::{AppError, AppResult};
use crate::routes::auth::AdminAuth;
use crate::services::riot::continent_for_platform;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:guild_id", put(upsert_guild))
        .route("/:guild_id/players", post(add_player))
        .route("/:guild_id/players/:platform/:puuid", delete(remove_player))
}

#[derive(Debug, Deserialize)]
pub struct UpsertGuildRequest {
    pub channel_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AddPlayerRequest {
    pub platform: String,
    pub puuid: String,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct GuildResponse {
    pub guild_id: String,
    pub channel_id: String,
    pub tracking_enabled: bool,
}

/// Sets the delivery channel. Also re-enables tracking after a permission loss.
async fn upsert_guild(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(guild_id): Path<String>,
    Json(body): Json<UpsertGuildRequest>,
) -> AppResult<Json<GuildResponse>> {
    let channel_id = body.channel_id.trim();
    if channel_id.is_empty() {
        return Err(AppError::Validation("channel_id must not be empty".to_string()));
    }

    TrackedTargetRepository::upsert_guild(&state.db, &guild_id, channel_id).await?;
    tracing::info!(guild_id = %guild_id, channel_id = %channel_id, "Guild channel configured");

    Ok(Json(GuildResponse {
        guild_id,
        channel_id: channel_id.to_string(),
        tracking_enabled: true,
    }))
}

async fn add_player(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(guild_id): Path<String>,
    Json(body): Json<AddPlayerRequest>,
) -> AppResult<StatusCode> {
    let platform = body.platform.trim().to_lowercase();
    if continent_for_platform(&platform).is_none() {
        return Err(AppError::Validation(format!(
            "unknown platform '{}'",
            body.platform
        )));
    }
    if body.puuid.trim().is_empty() || body.display_name.trim().is_empty() {
        return Err(AppError::Validation(
            "puuid and display_name are required".to_string(),
        ));
    }
    if !TrackedTargetRepository::guild_exists(&state.db, &guild_id).await? {
        return Err(AppError::NotFound(format!("guild {} is not configured", guild_id)));
    }

    TrackedTargetRepository::add_player(
        &state.db,
        &guild_id,
        &platform,
        body.puuid.trim(),
        body.display_name.trim(),
    )
    .await?;

    Ok(StatusCode::CREATED)
}

async fn remove_player(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path((guild_id, platform, puuid)): Path<(String, String, String)>,
) -> AppResult<StatusCode> {
    if TrackedTargetRepository::remove_player(&state.db, &guild_id, &platform, &puuid).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("player is not tracked".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use crate::db::TrackedTargetRepository;
    use crate::routes::tests::{request, test_state};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn configure_guild_then_track_and_untrack_player() {
        let state = test_state(None).await;

        let (status, body) = request(
            state.clone(),
            "PUT",
            "/api/guilds/G1",
            None,
            Some(json!({ "channel_id": "chan-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tracking_enabled"], true);

        let (status, _) = request(
            state.clone(),
            "POST",
            "/api/guilds/G1/players",
            None,
            Some(json!({ "platform": "NA1", "puuid": "p1", "display_name": "Alpha" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let targets = TrackedTargetRepository::list_all(&state.db).await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].platform, "na1");
        assert_eq!(targets[0].channel_id, "chan-1");

        let (status, _) = request(
            state.clone(),
            "DELETE",
            "/api/guilds/G1/players/na1/p1",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(TrackedTargetRepository::list_all(&state.db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_bad_player_requests() {
        let state = test_state(None).await;

        let (status, body) = request(
            state.clone(),
            "POST",
            "/api/guilds/G1/players",
            None,
            Some(json!({ "platform": "moon1", "puuid": "p1", "display_name": "Alpha" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, _) = request(
            state,
            "POST",
            "/api/guilds/G1/players",
            None,
            Some(json!({ "platform": "na1", "puuid": "p1", "display_name": "Alpha" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_token_is_enforced() {
        let state = test_state(Some("s3cret")).await;
        let body = json!({ "channel_id": "chan-1" });

        let (status, _) = request(state.clone(), "PUT", "/api/guilds/G1", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = request(
            state.clone(),
            "PUT",
            "/api/guilds/G1",
            Some("Bearer wrong"),
            Some(body.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = request(
            state,
            "PUT",
            "/api/guilds/G1",
            Some("Bearer s3cret"),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}
