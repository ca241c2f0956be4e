use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerListItem {
    pub rank: usize,
    pub player_id: i64,
    pub name: String,
    pub nickname: Option<String>,
    pub rating_points: i64,
    pub rank_tier: String,
    pub rank_division: String,
    pub win_streak: i64,
    pub matches_played: i64,
    pub is_provisional: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: usize,
    pub page_size: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchHistoryItem {
    pub opponent_id: i64,
    pub opponent_rating_at_match: i64,
    pub points_change: i64,
    pub timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDetail {
    pub player_id: i64,
    pub name: String,
    pub nickname: Option<String>,
    pub region: Option<String>,
    pub preferred_roles: Vec<String>,
    pub is_registered: bool,
    pub rating_points: i64,
    pub rank_tier: String,
    pub rank_division: String,
    pub win_streak: i64,
    pub matches_played: i64,
    pub is_provisional: bool,
    pub recent_matches: Vec<MatchHistoryItem>,
}
