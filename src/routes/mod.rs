pub mod auth;
pub mod guilds;
pub mod health;
pub mod static_data;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/tracker/status", get(health::tracker_status))
        .nest("/api/guilds", guilds::router())
        .nest("/api/static-data", static_data::router())
        .with_state(state)
}
