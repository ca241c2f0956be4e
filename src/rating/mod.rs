pub mod elo;
pub mod tiers;

pub use elo::{compute_delta, k_factor_for};
pub use tiers::{rank_from_points, tier_index};
