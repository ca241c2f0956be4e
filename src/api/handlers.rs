use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::models::{MatchHistoryItem, PaginatedResponse, PlayerDetail, PlayerListItem};
use crate::config::settings::AppConfig;
use crate::database;

pub struct AppState {
    pub pool: Pool<SqliteConnectionManager>,
    pub config: AppConfig,
}

#[derive(Deserialize)]
pub struct PlayerParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

pub async fn get_players(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PlayerParams>,
) -> impl IntoResponse {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(100).clamp(1, 1000);
    // Saturate so an absurd page number reads an empty page instead of
    // overflowing the offset; the cap keeps the value bindable as i64.
    let offset = page
        .saturating_sub(1)
        .saturating_mul(page_size)
        .min(i64::MAX as usize);

    let mut conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "DB Connection Error").into_response(),
    };

    let players = match database::players::list_registered_by_points(&mut conn, page_size, offset) {
        Ok(players) => players,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("Query Error: {}", e))
                .into_response()
        }
    };
    let total = database::players::count_registered(&mut conn).unwrap_or(0);

    let provisional_cutoff = state.config.rating.provisional_match_count;
    let items: Vec<PlayerListItem> = players
        .into_iter()
        .enumerate()
        .map(|(i, player)| {
            let matches_played =
                database::players::matches_played(&mut conn, player.id).unwrap_or(0);
            PlayerListItem {
                rank: offset + i + 1,
                player_id: player.id,
                name: player.username,
                nickname: player.nickname,
                rating_points: player.rating_points,
                rank_tier: player.rank_tier,
                rank_division: player.rank_division,
                win_streak: player.win_streak,
                matches_played,
                is_provisional: matches_played < provisional_cutoff,
            }
        })
        .collect();

    Json(PaginatedResponse {
        items,
        total,
        page,
        page_size,
    })
    .into_response()
}

pub async fn get_player_detail(
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<i64>,
) -> impl IntoResponse {
    let mut conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "DB Connection Error").into_response(),
    };

    let player = match database::players::get_by_id(&mut conn, player_id) {
        Ok(Some(player)) => player,
        Ok(None) => return (StatusCode::NOT_FOUND, "Player not found").into_response(),
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("Query Error: {}", e))
                .into_response()
        }
    };

    let matches_played = database::players::matches_played(&mut conn, player_id).unwrap_or(0);
    let recent_matches = database::players::history_for_player(&mut conn, player_id, 20)
        .unwrap_or_default()
        .into_iter()
        .map(|entry| MatchHistoryItem {
            opponent_id: entry.opponent_id,
            opponent_rating_at_match: entry.opponent_rating_at_match,
            points_change: entry.points_change,
            timestamp: entry.created_at.to_string(),
        })
        .collect();

    Json(PlayerDetail {
        player_id: player.id,
        name: player.username.clone(),
        nickname: player.nickname.clone(),
        region: player.region.clone(),
        preferred_roles: player.roles().iter().map(|r| r.to_string()).collect(),
        is_registered: player.is_registered,
        rating_points: player.rating_points,
        rank_tier: player.rank_tier.clone(),
        rank_division: player.rank_division.clone(),
        win_streak: player.win_streak,
        matches_played,
        is_provisional: matches_played < state.config.rating.provisional_match_count,
        recent_matches,
    })
    .into_response()
}
