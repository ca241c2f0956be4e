use crate::config::settings::RatingSettings;

/// Point swing for a decided match, computed with standard logistic ELO.
///
/// Both magnitudes share the same expectation term `(1 - p)` applied to
/// each side's own K-factor, so they differ whenever the K-factors do.
/// Returns `(winner_gain, loser_loss)`, both non-negative.
pub fn compute_delta(
    winner_rating: i64,
    loser_rating: i64,
    winner_k: i64,
    loser_k: i64,
) -> (i64, i64) {
    let exponent = (loser_rating - winner_rating) as f64 / 400.0;
    let probability_of_winning = 1.0 / (1.0 + 10f64.powf(exponent));

    let winner_gain = winner_k as f64 * (1.0 - probability_of_winning);
    let loser_loss = loser_k as f64 * (1.0 - probability_of_winning);

    (winner_gain.round() as i64, loser_loss.round() as i64)
}

/// Pick the K-factor for a player based on how many matches they have on
/// record: fewer than the provisional cutoff means a volatile rating.
pub fn k_factor_for(matches_played: i64, settings: &RatingSettings) -> i64 {
    if matches_played < settings.provisional_match_count {
        settings.k_factor_provisional
    } else {
        settings.k_factor_established
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratings_equal_k_is_symmetric() {
        let (gain, loss) = compute_delta(1000, 1000, 24, 24);
        assert_eq!(gain, loss);
        assert_eq!(gain, 12);
    }

    #[test]
    fn beating_a_stronger_opponent_pays_more() {
        let (underdog_gain, _) = compute_delta(1000, 1200, 24, 24);
        let (favourite_gain, _) = compute_delta(1200, 1000, 24, 24);
        assert!(underdog_gain > favourite_gain);
    }

    #[test]
    fn per_side_k_factors_apply_independently() {
        // Equal ratings, p = 0.5: provisional winner takes 20, established
        // loser drops 12.
        let (gain, loss) = compute_delta(1000, 1000, 40, 24);
        assert_eq!(gain, 20);
        assert_eq!(loss, 12);
    }

    #[test]
    fn k_selection_switches_at_the_provisional_cutoff() {
        let settings = RatingSettings::default();
        assert_eq!(k_factor_for(0, &settings), 40);
        assert_eq!(k_factor_for(19, &settings), 40);
        assert_eq!(k_factor_for(20, &settings), 24);
        assert_eq!(k_factor_for(500, &settings), 24);
    }
}
