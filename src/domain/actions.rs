/// What a pressed control asks the state machine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Accept,
    Decline,
    Report,
    Confirm,
    Dispute,
    ModeratorDecision { winner_id: i64 },
}

/// A decoded interaction token: the action verb plus the duel it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuelAction {
    pub duel_id: i64,
    pub kind: ActionKind,
}

impl DuelAction {
    /// Encode back into the opaque token carried by the control.
    pub fn token(&self) -> String {
        match self.kind {
            ActionKind::Accept => format!("duel_accept_{}", self.duel_id),
            ActionKind::Decline => format!("duel_decline_{}", self.duel_id),
            ActionKind::Report => format!("duel_report_{}", self.duel_id),
            ActionKind::Confirm => format!("duel_confirm_{}", self.duel_id),
            ActionKind::Dispute => format!("duel_dispute_{}", self.duel_id),
            ActionKind::ModeratorDecision { winner_id } => {
                format!("duel_modwin_{}_{}", self.duel_id, winner_id)
            }
        }
    }
}

/// Decode a `duel_{verb}_{id}` correlation token. Tokens for other
/// features (or malformed ones) yield `None` and are ignored upstream.
pub fn decode_token(token: &str) -> Option<DuelAction> {
    let rest = token.strip_prefix("duel_")?;
    let (verb, args) = rest.split_once('_')?;

    let kind = match verb {
        "accept" => ActionKind::Accept,
        "decline" => ActionKind::Decline,
        "report" => ActionKind::Report,
        "confirm" => ActionKind::Confirm,
        "dispute" => ActionKind::Dispute,
        "modwin" => {
            let (duel_id, winner_id) = args.split_once('_')?;
            return Some(DuelAction {
                duel_id: duel_id.parse().ok()?,
                kind: ActionKind::ModeratorDecision {
                    winner_id: winner_id.parse().ok()?,
                },
            });
        }
        _ => return None,
    };

    Some(DuelAction {
        duel_id: args.parse().ok()?,
        kind,
    })
}
