/// Lifecycle state of a duel. Stored as text in the duels table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuelStatus {
    Pending,
    InProgress,
    AwaitingScreenshot,
    AwaitingConfirmation,
    Disputed,
    Completed,
    Cancelled,
}

impl DuelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuelStatus::Pending => "pending",
            DuelStatus::InProgress => "in_progress",
            DuelStatus::AwaitingScreenshot => "awaiting_screenshot",
            DuelStatus::AwaitingConfirmation => "awaiting_confirmation",
            DuelStatus::Disputed => "disputed",
            DuelStatus::Completed => "completed",
            DuelStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(DuelStatus::Pending),
            "in_progress" => Some(DuelStatus::InProgress),
            "awaiting_screenshot" => Some(DuelStatus::AwaitingScreenshot),
            "awaiting_confirmation" => Some(DuelStatus::AwaitingConfirmation),
            "disputed" => Some(DuelStatus::Disputed),
            "completed" => Some(DuelStatus::Completed),
            "cancelled" => Some(DuelStatus::Cancelled),
            _ => None,
        }
    }

    /// A duel in any of these states still blocks both participants from
    /// entering another one.
    pub fn is_active(&self) -> bool {
        !matches!(self, DuelStatus::Completed | DuelStatus::Cancelled)
    }

    /// Status values counted as active, for SQL `IN (...)` clauses.
    pub fn active_states() -> &'static [DuelStatus] {
        &[
            DuelStatus::Pending,
            DuelStatus::InProgress,
            DuelStatus::AwaitingScreenshot,
            DuelStatus::AwaitingConfirmation,
            DuelStatus::Disputed,
        ]
    }
}

/// Outcome of a completed duel from one player's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Win,
    Loss,
}
