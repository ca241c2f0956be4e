use anyhow::Result;
use log::info;

use crate::config::AppConfig;
use crate::database::{self, DbPool, Player};

/// Registration flow over the player store: first contact creates the
/// unregistered record, the registration form completes it, and reminder
/// bookkeeping tracks who still has not finished.
pub struct RegistrationService {
    pool: DbPool,
    config: AppConfig,
}

impl RegistrationService {
    pub fn new(pool: DbPool, config: AppConfig) -> Self {
        Self { pool, config }
    }

    /// Called whenever a member first interacts with the bot.
    pub fn touch_player(&self, id: i64, username: &str) -> Result<Player> {
        let mut conn = database::get_connection(&self.pool)?;
        database::players::get_or_create(&mut conn, id, username, &self.config.rating)
    }

    pub fn complete(
        &self,
        id: i64,
        nickname: &str,
        region: &str,
        roles: &[String],
    ) -> Result<()> {
        let mut conn = database::get_connection(&self.pool)?;
        database::players::complete_registration(&mut conn, id, nickname, region, roles)?;
        info!("Player {} completed registration as {}", id, nickname);
        Ok(())
    }

    pub fn unregistered_players(&self) -> Result<Vec<Player>> {
        let mut conn = database::get_connection(&self.pool)?;
        database::players::list_unregistered(&mut conn)
    }

    pub fn record_reminder(&self, id: i64) -> Result<()> {
        let mut conn = database::get_connection(&self.pool)?;
        database::players::increment_reminder(&mut conn, id)
    }

    pub fn set_card_message(&self, id: i64, message_id: i64) -> Result<()> {
        let mut conn = database::get_connection(&self.pool)?;
        database::players::set_card_message(&mut conn, id, message_id)
    }

    /// Membership-departure cleanup.
    pub fn remove_player(&self, id: i64) -> Result<()> {
        let mut conn = database::get_connection(&self.pool)?;
        database::players::delete_player(&mut conn, id)
    }
}
