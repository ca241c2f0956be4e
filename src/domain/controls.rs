use super::status::DuelStatus;

/// Interactive controls that can appear on duel messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Accept,
    Decline,
    ReportResult,
    Confirm,
    Dispute,
    ModeratorPickWinner,
}

/// Which controls a duel panel offers in a given state. Pure lookup so the
/// visible surface can be rendered (and tested) apart from the state
/// machine itself.
pub fn available_controls(status: DuelStatus) -> &'static [Control] {
    match status {
        DuelStatus::Pending => &[Control::Accept, Control::Decline],
        DuelStatus::InProgress => &[Control::ReportResult],
        // The reporter owes a screenshot; nothing is clickable meanwhile.
        DuelStatus::AwaitingScreenshot => &[],
        DuelStatus::AwaitingConfirmation => &[Control::Confirm, Control::Dispute],
        DuelStatus::Disputed => &[Control::ModeratorPickWinner],
        DuelStatus::Completed | DuelStatus::Cancelled => &[],
    }
}
