pub mod duels;
pub mod leaderboard;
pub mod registration;
pub mod server;

pub use duels::DuelLifecycleService;
pub use leaderboard::LeaderboardService;
pub use registration::RegistrationService;
pub use server::ServerService;
