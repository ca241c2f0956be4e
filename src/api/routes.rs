use axum::{routing::get, Router};
use std::sync::Arc;

use crate::api::handlers::{get_player_detail, get_players, AppState};

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/players", get(get_players))
        .route("/api/player/:id", get(get_player_detail))
        .with_state(state)
}
