pub mod actions;
pub mod controls;
pub mod status;

pub use actions::{decode_token, ActionKind, DuelAction};
pub use controls::{available_controls, Control};
pub use status::{DuelStatus, MatchOutcome};
