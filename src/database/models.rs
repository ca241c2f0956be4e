use chrono::NaiveDateTime;

use crate::domain::DuelStatus;

#[derive(Debug, Clone)]
pub struct Player {
    pub id: i64,
    pub username: String,
    pub is_registered: bool,
    pub registration_reminders_sent: i64,
    pub last_reminder_sent_at: Option<NaiveDateTime>,
    pub nickname: Option<String>,
    pub region: Option<String>,
    pub preferred_roles: String,
    pub rating_points: i64,
    pub rank_tier: String,
    pub rank_division: String,
    pub win_streak: i64,
    pub card_message_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub last_updated: NaiveDateTime,
}

impl Player {
    pub fn roles(&self) -> Vec<&str> {
        self.preferred_roles
            .split(',')
            .filter(|r| !r.is_empty())
            .collect()
    }

    pub fn rank_label(&self) -> String {
        if self.rank_division.is_empty() {
            self.rank_tier.clone()
        } else {
            format!("{} {}", self.rank_tier, self.rank_division)
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchHistoryEntry {
    pub id: i64,
    pub player_id: i64,
    pub opponent_id: i64,
    pub opponent_rating_at_match: i64,
    pub points_change: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct Duel {
    pub id: i64,
    pub challenger_id: i64,
    pub opponent_id: i64,
    pub status: DuelStatus,
    pub challenger_rating_at_match: i64,
    pub opponent_rating_at_match: i64,
    pub reported_winner_id: Option<i64>,
    pub evidence_message_id: Option<i64>,
    pub winner_id: Option<i64>,
    pub loser_id: Option<i64>,
    pub points_change: Option<i64>,
    pub channel_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub accepted_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

impl Duel {
    pub fn is_participant(&self, player_id: i64) -> bool {
        self.challenger_id == player_id || self.opponent_id == player_id
    }

    /// The other side of the duel relative to `player_id`.
    pub fn opponent_of(&self, player_id: i64) -> i64 {
        if player_id == self.challenger_id {
            self.opponent_id
        } else {
            self.challenger_id
        }
    }
}

/// Net effect of one `apply_duel_result` call, fed back to the caller for
/// duel finalization and reporting.
#[derive(Debug, Clone, Copy)]
pub struct AppliedResult {
    pub final_delta: i64,
    pub bonus: i64,
    pub new_rating: i64,
    pub new_streak: i64,
}
