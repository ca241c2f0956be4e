/// Rank ladder, lowest tier first. Tiers from Emerald upward carry no
/// division and are distinguished by points alone.
const TIER_THRESHOLDS: &[(&str, i64)] = &[
    ("Iron IV", 0),
    ("Iron III", 100),
    ("Iron II", 200),
    ("Iron I", 300),
    ("Bronze IV", 400),
    ("Bronze III", 500),
    ("Bronze II", 600),
    ("Bronze I", 700),
    ("Silver IV", 800),
    ("Silver III", 900),
    ("Silver II", 1000),
    ("Silver I", 1100),
    ("Gold IV", 1200),
    ("Gold III", 1300),
    ("Gold II", 1400),
    ("Gold I", 1500),
    ("Platinum IV", 1600),
    ("Platinum III", 1700),
    ("Platinum II", 1800),
    ("Platinum I", 1900),
    ("Emerald", 2000),
    ("Diamond", 2500),
    ("Master", 3000),
    ("Grandmaster", 3500),
    ("Challenger", 4000),
];

/// Derive `(tier, division)` from total rating points by scanning the
/// ladder from the top down. Points below every threshold (negative
/// ratings included) floor at Iron IV.
pub fn rank_from_points(points: i64) -> (String, String) {
    for (label, minimum) in TIER_THRESHOLDS.iter().rev() {
        if points >= *minimum {
            return split_label(label);
        }
    }
    ("Iron".to_string(), "IV".to_string())
}

fn split_label(label: &str) -> (String, String) {
    match label.split_once(' ') {
        Some((tier, division)) => (tier.to_string(), division.to_string()),
        None => (label.to_string(), String::new()),
    }
}

/// Position of the rank for the given points on the ladder. Used for
/// ordering-sensitive display and tests.
pub fn tier_index(points: i64) -> usize {
    let mut index = 0;
    for (i, (_, minimum)) in TIER_THRESHOLDS.iter().enumerate() {
        if points >= *minimum {
            index = i;
        }
    }
    index
}
