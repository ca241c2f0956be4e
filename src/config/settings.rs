#[derive(Debug, Clone)]
pub struct RatingSettings {
    pub starting_points: i64,
    pub k_factor_provisional: i64,
    pub k_factor_established: i64,
    pub provisional_match_count: i64,
    pub streak_bonus_threshold: i64,
    pub streak_bonus_points: i64,
}

impl Default for RatingSettings {
    fn default() -> Self {
        Self {
            starting_points: 0,
            k_factor_provisional: 40,
            k_factor_established: 24,
            provisional_match_count: 20,
            streak_bonus_threshold: 3,
            streak_bonus_points: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DuelSettings {
    /// How long a pending challenge stays valid (communicated to the target).
    pub challenge_ttl_secs: i64,
    /// Advisory window for posting the result screenshot.
    pub evidence_window_secs: i64,
    /// Grace period before the duel channel is torn down after completion.
    pub teardown_grace_secs: u64,
}

impl Default for DuelSettings {
    fn default() -> Self {
        Self {
            challenge_ttl_secs: 3600,
            evidence_window_secs: 120,
            teardown_grace_secs: 60,
        }
    }
}

/// Well-known channel ids, read once from the environment at startup.
/// Zero means "not configured"; sends to an unconfigured channel are skipped.
#[derive(Debug, Clone, Default)]
pub struct ChannelSettings {
    pub duel_history_channel_id: i64,
    pub player_card_channel_id: i64,
    pub moderation_channel_id: i64,
}

impl ChannelSettings {
    pub fn from_env() -> Self {
        Self {
            duel_history_channel_id: env_id("DUEL_HISTORY_CHANNEL_ID"),
            player_card_channel_id: env_id("PLAYER_CARD_CHANNEL_ID"),
            moderation_channel_id: env_id("MODERATION_CHANNEL_ID"),
        }
    }
}

fn env_id(name: &str) -> i64 {
    match std::env::var(name) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            log::warn!("{} is set but not a valid id: {:?}", name, value);
            0
        }),
        Err(_) => 0,
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub rating: RatingSettings,
    pub duel: DuelSettings,
    pub channels: ChannelSettings,
}

impl AppConfig {
    /// Build the runtime configuration. Channel ids come from the
    /// environment; everything else uses the fixed defaults.
    pub fn new() -> Self {
        Self {
            channels: ChannelSettings::from_env(),
            ..Self::default()
        }
    }
}
