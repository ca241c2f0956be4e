use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info, warn};

use crate::config::AppConfig;
use crate::database::{self, DbConn, DbPool, Duel, Player};
use crate::domain::{ActionKind, DuelAction, DuelStatus, MatchOutcome};
use crate::platform::{ChannelRef, Gateway, Interaction, MessageEvent};
use crate::rating;

/// Orchestrates the duel lifecycle: challenge, accept/decline, result
/// report, screenshot evidence, confirm/dispute, moderator override,
/// rating resolution and channel teardown.
///
/// Every status transition is a conditional store update, so a stale or
/// duplicate trigger loses the race and is reported back to the actor
/// instead of mutating anything.
pub struct DuelLifecycleService {
    pool: DbPool,
    config: AppConfig,
    gateway: Arc<dyn Gateway>,
}

impl DuelLifecycleService {
    pub fn new(pool: DbPool, config: AppConfig, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            pool,
            config,
            gateway,
        }
    }

    fn conn(&self) -> Result<DbConn> {
        database::get_connection(&self.pool)
    }

    async fn ephemeral(&self, user_id: i64, text: &str) -> Result<()> {
        self.gateway.send_ephemeral(user_id, text).await
    }

    /// A challenge issued by `challenger_id` against `target_id`. Creates
    /// the pending duel and notifies the target, or rejects with no record
    /// created.
    pub async fn handle_challenge(&self, challenger_id: i64, target_id: i64) -> Result<()> {
        if challenger_id == target_id {
            return self
                .ephemeral(challenger_id, "You cannot challenge yourself.")
                .await;
        }
        if self.gateway.is_service_account(target_id).await? {
            return self
                .ephemeral(challenger_id, "You cannot challenge a bot.")
                .await;
        }

        let (challenger, target, duel) = {
            let mut conn = self.conn()?;

            if database::duels::get_active_for_player(&mut conn, challenger_id)?.is_some()
                || database::duels::get_active_for_player(&mut conn, target_id)?.is_some()
            {
                drop(conn);
                return self
                    .ephemeral(
                        challenger_id,
                        "One of the players is already in a duel or has a pending challenge.",
                    )
                    .await;
            }

            let challenger = database::players::get_by_id(&mut conn, challenger_id)?;
            let target = database::players::get_by_id(&mut conn, target_id)?;
            let (challenger, target) = match (challenger, target) {
                (Some(c), Some(t)) if c.is_registered && t.is_registered => (c, t),
                _ => {
                    drop(conn);
                    return self
                        .ephemeral(
                            challenger_id,
                            "Both players need to be registered to duel.",
                        )
                        .await;
                }
            };

            let duel = database::duels::create(
                &mut conn,
                challenger_id,
                target_id,
                challenger.rating_points,
                target.rating_points,
            )?;
            (challenger, target, duel)
        };

        info!(
            "Duel {} created: {} challenged {}",
            duel.id, challenger.username, target.username
        );

        let challenger_name = self.gateway.display_name(challenger_id).await;
        let challenge_text = format!(
            "{} challenged you to a 1v1 duel! You have {} hour(s) to respond.",
            challenger_name,
            self.config.duel.challenge_ttl_secs / 3600
        );
        let controls = [
            DuelAction {
                duel_id: duel.id,
                kind: ActionKind::Accept,
            },
            DuelAction {
                duel_id: duel.id,
                kind: ActionKind::Decline,
            },
        ];

        match self
            .gateway
            .send_direct_message(target_id, &challenge_text, &controls)
            .await
        {
            Ok(_) => {
                let target_name = self.gateway.display_name(target_id).await;
                self.ephemeral(challenger_id, &format!("Challenge sent to {target_name}!"))
                    .await
            }
            Err(e) => {
                warn!(
                    "Could not deliver challenge for duel {} to player {}: {:?}",
                    duel.id, target_id, e
                );
                let mut conn = self.conn()?;
                database::duels::cancel(&mut conn, duel.id, DuelStatus::Pending)?;
                drop(conn);
                self.ephemeral(
                    challenger_id,
                    "Could not deliver the challenge. The player may have direct messages disabled.",
                )
                .await
            }
        }
    }

    /// Dispatch for a decoded control press.
    pub async fn handle_action(&self, interaction: Interaction, action: DuelAction) -> Result<()> {
        match action.kind {
            ActionKind::Accept => self.handle_accept(interaction, action.duel_id).await,
            ActionKind::Decline => self.handle_decline(interaction, action.duel_id).await,
            ActionKind::Report => self.handle_report(interaction, action.duel_id).await,
            ActionKind::Confirm => self.handle_confirm(interaction, action.duel_id).await,
            ActionKind::Dispute => self.handle_dispute(interaction, action.duel_id).await,
            ActionKind::ModeratorDecision { winner_id } => {
                self.handle_moderator_decision(interaction, action.duel_id, winner_id)
                    .await
            }
        }
    }

    async fn handle_accept(&self, interaction: Interaction, duel_id: i64) -> Result<()> {
        let actor = interaction.actor_id;
        let duel = {
            let mut conn = self.conn()?;
            database::duels::get_by_id(&mut conn, duel_id)?
        };
        let duel = match duel {
            Some(d) if d.status == DuelStatus::Pending && d.opponent_id == actor => d,
            _ => {
                return self
                    .ephemeral(actor, "This invitation is invalid or not for you.")
                    .await;
            }
        };

        if let Some(message) = interaction.message {
            if let Err(e) = self
                .gateway
                .delete_message(interaction.channel, message)
                .await
            {
                warn!("Could not remove challenge message for duel {duel_id}: {e:?}");
            }
        }
        self.ephemeral(actor, "Duel accepted! Creating a private channel...")
            .await?;

        let challenger_name = self.gateway.display_name(duel.challenger_id).await;
        let opponent_name = self.gateway.display_name(duel.opponent_id).await;
        let space_name = format!("duel-{challenger_name}-vs-{opponent_name}");

        let channel = match self
            .gateway
            .create_duel_space(&space_name, &[duel.challenger_id, duel.opponent_id])
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                error!(
                    "Could not create duel space for duel {} (players {}, {}): {:?}",
                    duel.id, duel.challenger_id, duel.opponent_id, e
                );
                let mut conn = self.conn()?;
                database::duels::cancel(&mut conn, duel.id, DuelStatus::Pending)?;
                drop(conn);
                return self
                    .ephemeral(actor, "Could not create the duel channel. Duel cancelled.")
                    .await;
            }
        };

        let accepted = {
            let mut conn = self.conn()?;
            database::duels::accept(&mut conn, duel.id, channel.0)?
        };
        if accepted.is_none() {
            // Lost the race against a decline or an expiry sweep.
            warn!("Duel {} left pending before the accept landed", duel.id);
            if let Err(e) = self.gateway.delete_duel_space(channel).await {
                warn!("Could not remove orphaned duel space {}: {:?}", channel.0, e);
            }
            return self.ephemeral(actor, "This duel is no longer pending.").await;
        }

        let panel_text = format!(
            "The duel has started: {challenger_name} vs {opponent_name}! \
             After the match, the winner should press the button to report the result."
        );
        let report_control = [DuelAction {
            duel_id: duel.id,
            kind: ActionKind::Report,
        }];
        self.gateway
            .send_channel_message(channel, &panel_text, &report_control)
            .await?;
        info!("Duel {} accepted, channel {}", duel.id, channel.0);
        Ok(())
    }

    async fn handle_decline(&self, interaction: Interaction, duel_id: i64) -> Result<()> {
        let actor = interaction.actor_id;
        let cancelled = {
            let mut conn = self.conn()?;
            match database::duels::get_by_id(&mut conn, duel_id)? {
                Some(d) if d.opponent_id == actor => {
                    database::duels::cancel(&mut conn, duel_id, DuelStatus::Pending)?
                }
                _ => None,
            }
        };

        let Some(duel) = cancelled else {
            return self.ephemeral(actor, "This invitation is not for you.").await;
        };

        if let Some(message) = interaction.message {
            if let Err(e) = self
                .gateway
                .delete_message(interaction.channel, message)
                .await
            {
                warn!("Could not remove challenge message for duel {duel_id}: {e:?}");
            }
        }

        let challenger_name = self.gateway.display_name(duel.challenger_id).await;
        self.ephemeral(
            actor,
            &format!("You declined the challenge from {challenger_name}."),
        )
        .await
    }

    async fn handle_report(&self, interaction: Interaction, duel_id: i64) -> Result<()> {
        let actor = interaction.actor_id;
        let reported = {
            let mut conn = self.conn()?;
            match database::duels::get_by_id(&mut conn, duel_id)? {
                Some(d) if d.is_participant(actor) && d.status == DuelStatus::InProgress => {
                    database::duels::record_report(&mut conn, duel_id, actor)?
                }
                _ => None,
            }
        };

        let Some(duel) = reported else {
            return self
                .ephemeral(actor, "You cannot report the result of this duel.")
                .await;
        };

        if let Some(message) = interaction.message {
            if let Err(e) = self
                .gateway
                .clear_message_controls(interaction.channel, message)
                .await
            {
                warn!("Could not clear panel controls for duel {duel_id}: {e:?}");
            }
        }

        let reporter_name = self.gateway.display_name(actor).await;
        let prompt = format!(
            "{} claims the victory! Post a screenshot of the result in this channel \
             within {} minutes to continue.",
            reporter_name,
            self.config.duel.evidence_window_secs / 60
        );
        if let Some(channel_id) = duel.channel_id {
            self.gateway
                .send_channel_message(ChannelRef(channel_id), &prompt, &[])
                .await?;
        }
        Ok(())
    }

    /// A message posted in some watched channel. Only an image attachment
    /// from the reporter of an awaiting-screenshot duel advances the state;
    /// everything else is silently ignored.
    pub async fn handle_evidence_message(&self, event: MessageEvent) -> Result<()> {
        let advanced = {
            let mut conn = self.conn()?;
            let duel = database::duels::get_active_by_channel(&mut conn, event.channel.0)?;
            match duel {
                Some(d)
                    if d.status == DuelStatus::AwaitingScreenshot
                        && d.reported_winner_id == Some(event.sender_id)
                        && event.has_image_attachment =>
                {
                    database::duels::record_evidence(&mut conn, d.id, event.message.0)?
                }
                _ => return Ok(()),
            }
        };

        let Some(duel) = advanced else {
            return Ok(());
        };

        let opponent = duel.opponent_of(event.sender_id);
        let opponent_name = self.gateway.display_name(opponent).await;
        let text = format!(
            "{opponent_name}, please confirm the reported result or open a dispute."
        );
        let controls = [
            DuelAction {
                duel_id: duel.id,
                kind: ActionKind::Confirm,
            },
            DuelAction {
                duel_id: duel.id,
                kind: ActionKind::Dispute,
            },
        ];
        self.gateway
            .send_channel_message(event.channel, &text, &controls)
            .await?;
        Ok(())
    }

    async fn handle_confirm(&self, interaction: Interaction, duel_id: i64) -> Result<()> {
        let actor = interaction.actor_id;
        let duel = {
            let mut conn = self.conn()?;
            database::duels::get_by_id(&mut conn, duel_id)?
        };
        match self.confirmation_guard(duel, actor) {
            Some((duel, winner_id)) => {
                let loser_id = duel.opponent_of(winner_id);
                self.resolve(&duel, DuelStatus::AwaitingConfirmation, winner_id, loser_id)
                    .await
            }
            None => {
                self.ephemeral(actor, "Only your opponent can confirm this result.")
                    .await
            }
        }
    }

    async fn handle_dispute(&self, interaction: Interaction, duel_id: i64) -> Result<()> {
        let actor = interaction.actor_id;
        let disputed = {
            let mut conn = self.conn()?;
            let duel = database::duels::get_by_id(&mut conn, duel_id)?;
            match self.confirmation_guard(duel, actor) {
                Some((duel, _)) => database::duels::mark_disputed(&mut conn, duel.id)?,
                None => None,
            }
        };

        let Some(duel) = disputed else {
            return self
                .ephemeral(actor, "Only your opponent can dispute this result.")
                .await;
        };

        if let Some(channel_id) = duel.channel_id {
            if let Err(e) = self.gateway.lock_duel_space(ChannelRef(channel_id)).await {
                warn!("Could not lock duel space for duel {}: {:?}", duel.id, e);
            }
            self.gateway
                .send_channel_message(
                    ChannelRef(channel_id),
                    "The result was disputed. A moderator will review the evidence and decide.",
                    &[],
                )
                .await?;
        }

        self.notify_moderators(&duel).await;
        info!("Duel {} disputed by player {}", duel.id, actor);
        Ok(())
    }

    /// Shared guard for the confirm and dispute branches: the duel must be
    /// awaiting confirmation and the actor must be the participant who did
    /// NOT report the result. Returns the duel and the reported winner.
    fn confirmation_guard(&self, duel: Option<Duel>, actor: i64) -> Option<(Duel, i64)> {
        let duel = duel?;
        if duel.status != DuelStatus::AwaitingConfirmation {
            return None;
        }
        let winner_id = duel.reported_winner_id?;
        if !duel.is_participant(actor) || actor == winner_id {
            return None;
        }
        Some((duel, winner_id))
    }

    async fn notify_moderators(&self, duel: &Duel) {
        let channel_id = self.config.channels.moderation_channel_id;
        if channel_id == 0 {
            warn!(
                "Duel {} disputed but no moderation channel is configured",
                duel.id
            );
            return;
        }

        let reporter = duel.reported_winner_id.unwrap_or(duel.challenger_id);
        let text = format!(
            "Duel {} between {} and {} is disputed. Reported winner: {}. \
             Evidence message: {:?}. Pick the actual winner.",
            duel.id,
            self.gateway.display_name(duel.challenger_id).await,
            self.gateway.display_name(duel.opponent_id).await,
            self.gateway.display_name(reporter).await,
            duel.evidence_message_id,
        );
        let controls = [
            DuelAction {
                duel_id: duel.id,
                kind: ActionKind::ModeratorDecision {
                    winner_id: duel.challenger_id,
                },
            },
            DuelAction {
                duel_id: duel.id,
                kind: ActionKind::ModeratorDecision {
                    winner_id: duel.opponent_id,
                },
            },
        ];

        if let Err(e) = self
            .gateway
            .send_channel_message(ChannelRef(channel_id), &text, &controls)
            .await
        {
            error!("Could not notify moderators about duel {}: {:?}", duel.id, e);
        }
    }

    async fn handle_moderator_decision(
        &self,
        interaction: Interaction,
        duel_id: i64,
        winner_id: i64,
    ) -> Result<()> {
        let actor = interaction.actor_id;
        if !self.gateway.is_moderator(actor).await? {
            return self
                .ephemeral(actor, "Only moderators can decide a disputed duel.")
                .await;
        }

        let duel = {
            let mut conn = self.conn()?;
            database::duels::get_by_id(&mut conn, duel_id)?
        };
        let duel = match duel {
            Some(d) if d.status == DuelStatus::Disputed && d.is_participant(winner_id) => d,
            _ => {
                return self
                    .ephemeral(actor, "This dispute is no longer open.")
                    .await;
            }
        };

        info!(
            "Moderator {} resolved duel {} in favour of player {}",
            actor, duel.id, winner_id
        );
        let loser_id = duel.opponent_of(winner_id);
        self.resolve(&duel, DuelStatus::Disputed, winner_id, loser_id)
            .await
    }

    /// Terminal action shared by the confirm and moderator branches:
    /// claim the completed state, compute and apply rating changes from the
    /// players' **current** ratings, then emit notifications and tear the
    /// channel down after a grace period.
    async fn resolve(
        &self,
        duel: &Duel,
        from: DuelStatus,
        winner_id: i64,
        loser_id: i64,
    ) -> Result<()> {
        let settings = &self.config.rating;
        let (winner_applied, loser_applied) = {
            let mut conn = self.conn()?;

            let claimed =
                database::duels::complete(&mut conn, duel.id, from, winner_id, loser_id)?;
            if claimed.is_none() {
                warn!("Duel {} was already resolved", duel.id);
                return Ok(());
            }

            let winner = database::players::get_by_id(&mut conn, winner_id)?
                .with_context(|| format!("Winner {} not found for duel {}", winner_id, duel.id))?;
            let loser = database::players::get_by_id(&mut conn, loser_id)?
                .with_context(|| format!("Loser {} not found for duel {}", loser_id, duel.id))?;

            let winner_k =
                rating::k_factor_for(database::players::matches_played(&mut conn, winner_id)?, settings);
            let loser_k =
                rating::k_factor_for(database::players::matches_played(&mut conn, loser_id)?, settings);
            info!(
                "ELO for duel {}: {} (K={}) beats {} (K={})",
                duel.id, winner.username, winner_k, loser.username, loser_k
            );

            let (gain, loss) =
                rating::compute_delta(winner.rating_points, loser.rating_points, winner_k, loser_k);

            let winner_applied = database::players::apply_duel_result(
                &mut conn,
                settings,
                winner_id,
                MatchOutcome::Win,
                gain,
                loser_id,
                loser.rating_points,
            )?;
            let loser_applied = database::players::apply_duel_result(
                &mut conn,
                settings,
                loser_id,
                MatchOutcome::Loss,
                -loss,
                winner_id,
                winner.rating_points,
            )?;

            database::duels::set_points_change(&mut conn, duel.id, winner_applied.final_delta)?;
            (winner_applied, loser_applied)
        };

        self.announce_result(duel, winner_id, loser_id, &winner_applied, &loser_applied)
            .await;
        self.publish_history(duel, winner_id, loser_id, &winner_applied, &loser_applied)
            .await;
        self.refresh_profile_cards(&[winner_id, loser_id]).await;

        if let Some(channel_id) = duel.channel_id {
            self.schedule_teardown(duel.id, ChannelRef(channel_id));
        }
        Ok(())
    }

    async fn announce_result(
        &self,
        duel: &Duel,
        winner_id: i64,
        loser_id: i64,
        winner_applied: &database::AppliedResult,
        loser_applied: &database::AppliedResult,
    ) {
        let Some(channel_id) = duel.channel_id else {
            return;
        };
        let winner_name = self.gateway.display_name(winner_id).await;
        let loser_name = self.gateway.display_name(loser_id).await;

        let mut text = format!(
            "Duel finished! {winner_name} wins +{} points",
            winner_applied.final_delta
        );
        if winner_applied.bonus > 0 {
            text.push_str(&format!(
                " (including +{} for a {} win streak)",
                winner_applied.bonus, winner_applied.new_streak
            ));
        }
        text.push_str(&format!(
            "; {loser_name} {} points. This channel will be removed in {} seconds.",
            loser_applied.final_delta, self.config.duel.teardown_grace_secs
        ));

        if let Err(e) = self
            .gateway
            .send_channel_message(ChannelRef(channel_id), &text, &[])
            .await
        {
            warn!("Could not announce result of duel {}: {:?}", duel.id, e);
        }
    }

    /// Post the finalized-match record to the history channel, best effort.
    async fn publish_history(
        &self,
        duel: &Duel,
        winner_id: i64,
        loser_id: i64,
        winner_applied: &database::AppliedResult,
        loser_applied: &database::AppliedResult,
    ) {
        let channel_id = self.config.channels.duel_history_channel_id;
        if channel_id == 0 {
            return;
        }

        let text = format!(
            "Duel {}: {} ({} -> {}) defeated {} ({} -> {}), +{} points.",
            duel.id,
            self.gateway.display_name(winner_id).await,
            winner_applied.new_rating - winner_applied.final_delta,
            winner_applied.new_rating,
            self.gateway.display_name(loser_id).await,
            loser_applied.new_rating - loser_applied.final_delta,
            loser_applied.new_rating,
            winner_applied.final_delta,
        );

        if let Err(e) = self
            .gateway
            .send_channel_message(ChannelRef(channel_id), &text, &[])
            .await
        {
            warn!("Could not publish history for duel {}: {:?}", duel.id, e);
        }
    }

    /// Refresh the pinned profile cards of the given players, best effort.
    async fn refresh_profile_cards(&self, player_ids: &[i64]) {
        let channel_id = self.config.channels.player_card_channel_id;
        if channel_id == 0 {
            return;
        }

        for &player_id in player_ids {
            let player = {
                let mut conn = match self.conn() {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Could not load player {player_id} for card refresh: {e:?}");
                        continue;
                    }
                };
                match database::players::get_by_id(&mut conn, player_id) {
                    Ok(Some(player)) => player,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Could not load player {player_id} for card refresh: {e:?}");
                        continue;
                    }
                }
            };

            let Some(card_message_id) = player.card_message_id else {
                continue;
            };
            let text = card_text(&player);
            if let Err(e) = self
                .gateway
                .edit_message_text(
                    ChannelRef(channel_id),
                    crate::platform::MessageRef(card_message_id),
                    &text,
                )
                .await
            {
                warn!("Could not refresh profile card of player {player_id}: {e:?}");
            }
        }
    }

    fn schedule_teardown(&self, duel_id: i64, channel: ChannelRef) {
        let gateway = Arc::clone(&self.gateway);
        let grace = self.config.duel.teardown_grace_secs;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(grace)).await;
            if let Err(e) = gateway.delete_duel_space(channel).await {
                warn!(
                    "Could not tear down channel {} of duel {}: {:?}",
                    channel.0, duel_id, e
                );
            }
        });
    }

    /// Cancel pending challenges older than the validity window and let the
    /// challengers know. Meant to be driven by a periodic task owned by the
    /// embedder.
    pub async fn sweep_expired_challenges(&self) -> Result<usize> {
        let expired = {
            let mut conn = self.conn()?;
            database::duels::cancel_expired_challenges(
                &mut conn,
                Utc::now().naive_utc(),
                self.config.duel.challenge_ttl_secs,
            )?
        };

        for duel in &expired {
            info!("Duel {} expired unanswered", duel.id);
            if let Err(e) = self
                .gateway
                .send_direct_message(
                    duel.challenger_id,
                    "Your duel challenge expired without an answer.",
                    &[],
                )
                .await
            {
                warn!("Could not notify challenger of expired duel {}: {:?}", duel.id, e);
            }
        }
        Ok(expired.len())
    }
}

fn card_text(player: &Player) -> String {
    format!(
        "{} | {} | {} points | {} win streak",
        player.username,
        player.rank_label(),
        player.rating_points,
        player.win_streak
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connection::create_test_pool;
    use crate::platform::testing::{GatewayCall, MockGateway};
    use crate::platform::MessageRef;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.duel.teardown_grace_secs = 0;
        config.channels.duel_history_channel_id = 111;
        config.channels.player_card_channel_id = 222;
        config.channels.moderation_channel_id = 333;
        config
    }

    fn service_with(gateway: MockGateway) -> (DuelLifecycleService, DbPool, Arc<MockGateway>) {
        let pool = create_test_pool();
        let gateway = Arc::new(gateway);
        let service = DuelLifecycleService::new(
            pool.clone(),
            test_config(),
            Arc::clone(&gateway) as Arc<dyn Gateway>,
        );
        (service, pool, gateway)
    }

    fn register_player(pool: &DbPool, id: i64, name: &str) {
        let mut conn = pool.get().unwrap();
        let settings = crate::config::settings::RatingSettings::default();
        database::players::get_or_create(&mut conn, id, name, &settings).unwrap();
        database::players::complete_registration(&mut conn, id, name, "BR", &[]).unwrap();
    }

    fn seed_history(pool: &DbPool, player_id: i64, matches: usize) {
        let mut conn = pool.get().unwrap();
        for _ in 0..matches {
            conn.execute(
                "INSERT INTO match_history (player_id, opponent_id, opponent_rating_at_match, points_change, created_at) VALUES (?1, 0, 0, 0, ?2)",
                rusqlite::params![player_id, Utc::now().naive_utc()],
            )
            .unwrap();
        }
    }

    fn set_rating(pool: &DbPool, player_id: i64, points: i64, streak: i64) {
        let mut conn = pool.get().unwrap();
        conn.execute(
            "UPDATE players SET rating_points = ?1, win_streak = ?2 WHERE id = ?3",
            rusqlite::params![points, streak, player_id],
        )
        .unwrap();
    }

    fn duel_count(pool: &DbPool) -> i64 {
        let conn = pool.get().unwrap();
        conn.query_row("SELECT COUNT(*) FROM duels", [], |r| r.get(0))
            .unwrap()
    }

    fn get_duel(pool: &DbPool, id: i64) -> Duel {
        let mut conn = pool.get().unwrap();
        database::duels::get_by_id(&mut conn, id).unwrap().unwrap()
    }

    fn get_player(pool: &DbPool, id: i64) -> Player {
        let mut conn = pool.get().unwrap();
        database::players::get_by_id(&mut conn, id).unwrap().unwrap()
    }

    fn press(actor_id: i64) -> Interaction {
        Interaction {
            actor_id,
            channel: None,
            message: Some(MessageRef(42)),
        }
    }

    /// Drive a fresh duel between two registered players up to in_progress
    /// and return it.
    async fn start_duel(service: &DuelLifecycleService, pool: &DbPool) -> Duel {
        service.handle_challenge(1, 2).await.unwrap();
        let duel = {
            let mut conn = pool.get().unwrap();
            database::duels::get_active_for_player(&mut conn, 1)
                .unwrap()
                .unwrap()
        };
        service
            .handle_action(
                press(2),
                DuelAction {
                    duel_id: duel.id,
                    kind: ActionKind::Accept,
                },
            )
            .await
            .unwrap();
        get_duel(pool, duel.id)
    }

    /// Continue an in-progress duel through report and evidence.
    async fn report_with_evidence(
        service: &DuelLifecycleService,
        pool: &DbPool,
        duel: &Duel,
        reporter: i64,
    ) -> Duel {
        service
            .handle_action(
                press(reporter),
                DuelAction {
                    duel_id: duel.id,
                    kind: ActionKind::Report,
                },
            )
            .await
            .unwrap();
        service
            .handle_evidence_message(MessageEvent {
                channel: ChannelRef(duel.channel_id.unwrap()),
                sender_id: reporter,
                message: MessageRef(900),
                has_image_attachment: true,
            })
            .await
            .unwrap();
        get_duel(pool, duel.id)
    }

    #[tokio::test]
    async fn challenge_to_self_is_rejected_without_a_record() {
        let (service, pool, gateway) = service_with(MockGateway::new());
        register_player(&pool, 1, "ada");

        service.handle_challenge(1, 1).await.unwrap();

        assert_eq!(duel_count(&pool), 0);
        assert!(gateway.ephemerals_for(1)[0].contains("yourself"));
    }

    #[tokio::test]
    async fn challenge_to_a_service_account_is_rejected() {
        let mut gateway = MockGateway::new();
        gateway.service_accounts.insert(2);
        let (service, pool, gateway) = service_with(gateway);
        register_player(&pool, 1, "ada");

        service.handle_challenge(1, 2).await.unwrap();

        assert_eq!(duel_count(&pool), 0);
        assert!(gateway.ephemerals_for(1)[0].contains("bot"));
    }

    #[tokio::test]
    async fn challenge_requires_both_parties_registered() {
        let (service, pool, gateway) = service_with(MockGateway::new());
        register_player(&pool, 1, "ada");
        // Player 2 exists but never registered.
        {
            let mut conn = pool.get().unwrap();
            let settings = crate::config::settings::RatingSettings::default();
            database::players::get_or_create(&mut conn, 2, "bo", &settings).unwrap();
        }

        service.handle_challenge(1, 2).await.unwrap();

        assert_eq!(duel_count(&pool), 0);
        assert!(gateway.ephemerals_for(1)[0].contains("registered"));
    }

    #[tokio::test]
    async fn challenge_is_blocked_while_either_party_has_an_active_duel() {
        let (service, pool, gateway) = service_with(MockGateway::new());
        for (id, name) in [(1, "ada"), (2, "bo"), (3, "cy")] {
            register_player(&pool, id, name);
        }
        service.handle_challenge(1, 2).await.unwrap();
        assert_eq!(duel_count(&pool), 1);

        // 3 challenges 2, who has a pending invitation.
        service.handle_challenge(3, 2).await.unwrap();

        assert_eq!(duel_count(&pool), 1);
        assert!(gateway.ephemerals_for(3)[0].contains("already in a duel"));
    }

    #[tokio::test]
    async fn successful_challenge_notifies_target_with_controls() {
        let (service, pool, gateway) = service_with(MockGateway::new());
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");

        service.handle_challenge(1, 2).await.unwrap();

        let duel = {
            let mut conn = pool.get().unwrap();
            database::duels::get_active_for_player(&mut conn, 2)
                .unwrap()
                .unwrap()
        };
        assert_eq!(duel.status, DuelStatus::Pending);
        assert_eq!(duel.challenger_id, 1);

        let dm = gateway
            .calls()
            .into_iter()
            .find_map(|call| match call {
                GatewayCall::DirectMessage {
                    user_id, controls, ..
                } if user_id == 2 => Some(controls),
                _ => None,
            })
            .expect("target should receive a challenge DM");
        assert!(dm.iter().any(|a| a.kind == ActionKind::Accept));
        assert!(dm.iter().any(|a| a.kind == ActionKind::Decline));
    }

    #[tokio::test]
    async fn undeliverable_challenge_cancels_the_duel() {
        let mut gateway = MockGateway::new();
        gateway.fail_direct_messages = true;
        let (service, pool, gateway) = service_with(gateway);
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");

        service.handle_challenge(1, 2).await.unwrap();

        let conn_duels = duel_count(&pool);
        assert_eq!(conn_duels, 1);
        let duel = get_duel(&pool, 1);
        assert_eq!(duel.status, DuelStatus::Cancelled);
        assert!(gateway.ephemerals_for(1).last().unwrap().contains("Could not deliver"));
    }

    #[tokio::test]
    async fn accept_by_anyone_but_the_opponent_changes_nothing() {
        let (service, pool, gateway) = service_with(MockGateway::new());
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");
        service.handle_challenge(1, 2).await.unwrap();

        for wrong_actor in [1, 99] {
            service
                .handle_action(
                    press(wrong_actor),
                    DuelAction {
                        duel_id: 1,
                        kind: ActionKind::Accept,
                    },
                )
                .await
                .unwrap();
            assert_eq!(get_duel(&pool, 1).status, DuelStatus::Pending);
            assert!(gateway
                .ephemerals_for(wrong_actor)
                .last()
                .unwrap()
                .contains("invalid or not for you"));
        }
    }

    #[tokio::test]
    async fn accept_creates_the_duel_space_and_posts_the_panel() {
        let (service, pool, gateway) = service_with(MockGateway::new());
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");

        let duel = start_duel(&service, &pool).await;

        assert_eq!(duel.status, DuelStatus::InProgress);
        assert!(duel.channel_id.is_some());
        assert!(duel.accepted_at.is_some());

        let calls = gateway.calls();
        assert!(calls.iter().any(|c| matches!(
            c,
            GatewayCall::CreateSpace { member_ids, .. } if member_ids == &vec![1, 2]
        )));
        assert!(calls.iter().any(|c| matches!(
            c,
            GatewayCall::ChannelMessage { controls, .. }
                if controls.iter().any(|a| a.kind == ActionKind::Report)
        )));
    }

    #[tokio::test]
    async fn space_creation_failure_cancels_the_duel() {
        let mut gateway = MockGateway::new();
        gateway.fail_space_creation = true;
        let (service, pool, gateway) = service_with(gateway);
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");
        service.handle_challenge(1, 2).await.unwrap();

        service
            .handle_action(
                press(2),
                DuelAction {
                    duel_id: 1,
                    kind: ActionKind::Accept,
                },
            )
            .await
            .unwrap();

        assert_eq!(get_duel(&pool, 1).status, DuelStatus::Cancelled);
        assert!(gateway
            .ephemerals_for(2)
            .last()
            .unwrap()
            .contains("cancelled"));
    }

    #[tokio::test]
    async fn decline_cancels_and_removes_the_invitation() {
        let (service, pool, gateway) = service_with(MockGateway::new());
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");
        service.handle_challenge(1, 2).await.unwrap();

        service
            .handle_action(
                press(2),
                DuelAction {
                    duel_id: 1,
                    kind: ActionKind::Decline,
                },
            )
            .await
            .unwrap();

        assert_eq!(get_duel(&pool, 1).status, DuelStatus::Cancelled);
        assert!(gateway
            .calls()
            .iter()
            .any(|c| matches!(c, GatewayCall::DeleteMessage { .. })));
    }

    #[tokio::test]
    async fn report_is_limited_to_participants_of_a_running_duel() {
        let (service, pool, gateway) = service_with(MockGateway::new());
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");
        let duel = start_duel(&service, &pool).await;

        service
            .handle_action(
                press(99),
                DuelAction {
                    duel_id: duel.id,
                    kind: ActionKind::Report,
                },
            )
            .await
            .unwrap();
        assert_eq!(get_duel(&pool, duel.id).status, DuelStatus::InProgress);
        assert!(gateway
            .ephemerals_for(99)
            .last()
            .unwrap()
            .contains("cannot report"));

        service
            .handle_action(
                press(1),
                DuelAction {
                    duel_id: duel.id,
                    kind: ActionKind::Report,
                },
            )
            .await
            .unwrap();
        let reported = get_duel(&pool, duel.id);
        assert_eq!(reported.status, DuelStatus::AwaitingScreenshot);
        assert_eq!(reported.reported_winner_id, Some(1));
    }

    #[tokio::test]
    async fn evidence_guards_sender_and_attachment_type() {
        let (service, pool, _gateway) = service_with(MockGateway::new());
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");
        let duel = start_duel(&service, &pool).await;
        service
            .handle_action(
                press(1),
                DuelAction {
                    duel_id: duel.id,
                    kind: ActionKind::Report,
                },
            )
            .await
            .unwrap();
        let channel = ChannelRef(get_duel(&pool, duel.id).channel_id.unwrap());

        // Evidence from the non-reporter is ignored.
        service
            .handle_evidence_message(MessageEvent {
                channel,
                sender_id: 2,
                message: MessageRef(901),
                has_image_attachment: true,
            })
            .await
            .unwrap();
        assert_eq!(get_duel(&pool, duel.id).status, DuelStatus::AwaitingScreenshot);

        // A non-image attachment is ignored.
        service
            .handle_evidence_message(MessageEvent {
                channel,
                sender_id: 1,
                message: MessageRef(902),
                has_image_attachment: false,
            })
            .await
            .unwrap();
        assert_eq!(get_duel(&pool, duel.id).status, DuelStatus::AwaitingScreenshot);

        // The reporter's screenshot advances the duel.
        service
            .handle_evidence_message(MessageEvent {
                channel,
                sender_id: 1,
                message: MessageRef(903),
                has_image_attachment: true,
            })
            .await
            .unwrap();
        let advanced = get_duel(&pool, duel.id);
        assert_eq!(advanced.status, DuelStatus::AwaitingConfirmation);
        assert_eq!(advanced.evidence_message_id, Some(903));
    }

    #[tokio::test]
    async fn reporter_cannot_confirm_their_own_result() {
        let (service, pool, gateway) = service_with(MockGateway::new());
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");
        let duel = start_duel(&service, &pool).await;
        report_with_evidence(&service, &pool, &duel, 1).await;

        service
            .handle_action(
                press(1),
                DuelAction {
                    duel_id: duel.id,
                    kind: ActionKind::Confirm,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            get_duel(&pool, duel.id).status,
            DuelStatus::AwaitingConfirmation
        );
        assert!(gateway
            .ephemerals_for(1)
            .last()
            .unwrap()
            .contains("opponent"));
    }

    #[tokio::test]
    async fn confirmed_duel_resolves_with_per_side_k_factors() {
        let (service, pool, gateway) = service_with(MockGateway::new());
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");
        set_rating(&pool, 1, 1000, 0);
        set_rating(&pool, 2, 1000, 0);
        seed_history(&pool, 1, 5);
        seed_history(&pool, 2, 25);

        let duel = start_duel(&service, &pool).await;
        report_with_evidence(&service, &pool, &duel, 1).await;
        service
            .handle_action(
                press(2),
                DuelAction {
                    duel_id: duel.id,
                    kind: ActionKind::Confirm,
                },
            )
            .await
            .unwrap();

        // Provisional winner K=40, established loser K=24, p=0.5.
        assert_eq!(get_player(&pool, 1).rating_points, 1020);
        assert_eq!(get_player(&pool, 2).rating_points, 988);

        let resolved = get_duel(&pool, duel.id);
        assert_eq!(resolved.status, DuelStatus::Completed);
        assert_eq!(resolved.winner_id, Some(1));
        assert_eq!(resolved.loser_id, Some(2));
        assert_eq!(resolved.points_change, Some(20));
        assert!(resolved.completed_at.is_some());

        // History record went to the configured channel.
        assert!(gateway.calls().iter().any(|c| matches!(
            c,
            GatewayCall::ChannelMessage { channel, .. } if channel.0 == 111
        )));

        // Channel teardown runs after the (zero) grace period.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            gateway.deleted_spaces(),
            vec![ChannelRef(resolved.channel_id.unwrap())]
        );
    }

    #[tokio::test]
    async fn streak_bonus_lands_on_top_of_the_engine_delta() {
        let (service, pool, _gateway) = service_with(MockGateway::new());
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");
        set_rating(&pool, 1, 1000, 2); // entering on a 2-win streak
        set_rating(&pool, 2, 1000, 0);
        seed_history(&pool, 1, 5);
        seed_history(&pool, 2, 25);

        let duel = start_duel(&service, &pool).await;
        report_with_evidence(&service, &pool, &duel, 1).await;
        service
            .handle_action(
                press(2),
                DuelAction {
                    duel_id: duel.id,
                    kind: ActionKind::Confirm,
                },
            )
            .await
            .unwrap();

        assert_eq!(get_player(&pool, 1).rating_points, 1030);
        assert_eq!(get_player(&pool, 1).win_streak, 3);
        assert_eq!(get_duel(&pool, duel.id).points_change, Some(30));
        // The loser is never affected by the winner's streak.
        assert_eq!(get_player(&pool, 2).rating_points, 988);
    }

    #[tokio::test]
    async fn dispute_locks_the_space_and_escalates_to_moderators() {
        let (service, pool, gateway) = service_with(MockGateway::new());
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");
        let duel = start_duel(&service, &pool).await;
        report_with_evidence(&service, &pool, &duel, 1).await;

        service
            .handle_action(
                press(2),
                DuelAction {
                    duel_id: duel.id,
                    kind: ActionKind::Dispute,
                },
            )
            .await
            .unwrap();

        assert_eq!(get_duel(&pool, duel.id).status, DuelStatus::Disputed);
        let calls = gateway.calls();
        assert!(calls
            .iter()
            .any(|c| matches!(c, GatewayCall::LockSpace { .. })));
        let moderation_controls = calls
            .iter()
            .find_map(|c| match c {
                GatewayCall::ChannelMessage {
                    channel, controls, ..
                } if channel.0 == 333 => Some(controls.clone()),
                _ => None,
            })
            .expect("moderation channel should be notified");
        assert!(moderation_controls
            .iter()
            .any(|a| a.kind == ActionKind::ModeratorDecision { winner_id: 1 }));
        assert!(moderation_controls
            .iter()
            .any(|a| a.kind == ActionKind::ModeratorDecision { winner_id: 2 }));
    }

    #[tokio::test]
    async fn only_moderators_decide_disputes() {
        let mut mock = MockGateway::new();
        mock.moderators.insert(500);
        let (service, pool, gateway) = service_with(mock);
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");
        seed_history(&pool, 1, 25);
        seed_history(&pool, 2, 25);
        let duel = start_duel(&service, &pool).await;
        report_with_evidence(&service, &pool, &duel, 1).await;
        service
            .handle_action(
                press(2),
                DuelAction {
                    duel_id: duel.id,
                    kind: ActionKind::Dispute,
                },
            )
            .await
            .unwrap();

        // A participant cannot push the decision through.
        service
            .handle_action(
                press(2),
                DuelAction {
                    duel_id: duel.id,
                    kind: ActionKind::ModeratorDecision { winner_id: 2 },
                },
            )
            .await
            .unwrap();
        assert_eq!(get_duel(&pool, duel.id).status, DuelStatus::Disputed);
        assert!(gateway
            .ephemerals_for(2)
            .last()
            .unwrap()
            .contains("moderators"));

        // The moderator overrides in favour of the disputer.
        service
            .handle_action(
                press(500),
                DuelAction {
                    duel_id: duel.id,
                    kind: ActionKind::ModeratorDecision { winner_id: 2 },
                },
            )
            .await
            .unwrap();

        let resolved = get_duel(&pool, duel.id);
        assert_eq!(resolved.status, DuelStatus::Completed);
        assert_eq!(resolved.winner_id, Some(2));
        assert_eq!(get_player(&pool, 2).rating_points, 12);
        assert_eq!(get_player(&pool, 1).rating_points, -12);
    }

    #[tokio::test]
    async fn second_resolution_attempt_is_a_no_op() {
        let (service, pool, _gateway) = service_with(MockGateway::new());
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");
        let duel = start_duel(&service, &pool).await;
        let ready = report_with_evidence(&service, &pool, &duel, 1).await;

        service
            .resolve(&ready, DuelStatus::AwaitingConfirmation, 1, 2)
            .await
            .unwrap();
        let after_first = get_player(&pool, 1).rating_points;

        // The claim already happened; a duplicate confirm must not pay out
        // twice.
        service
            .resolve(&ready, DuelStatus::AwaitingConfirmation, 1, 2)
            .await
            .unwrap();
        assert_eq!(get_player(&pool, 1).rating_points, after_first);
        let mut conn = pool.get().unwrap();
        assert_eq!(database::players::matches_played(&mut conn, 1).unwrap(), 1);
    }

    #[tokio::test]
    async fn expiry_sweep_cancels_stale_challenges_and_notifies() {
        let (service, pool, gateway) = service_with(MockGateway::new());
        register_player(&pool, 1, "ada");
        register_player(&pool, 2, "bo");
        service.handle_challenge(1, 2).await.unwrap();
        {
            let conn = pool.get().unwrap();
            conn.execute(
                "UPDATE duels SET created_at = ?1",
                rusqlite::params![Utc::now().naive_utc() - chrono::Duration::seconds(7200)],
            )
            .unwrap();
        }

        let swept = service.sweep_expired_challenges().await.unwrap();

        assert_eq!(swept, 1);
        assert_eq!(get_duel(&pool, 1).status, DuelStatus::Cancelled);
        assert!(gateway.calls().iter().any(|c| matches!(
            c,
            GatewayCall::DirectMessage { user_id: 1, text, .. } if text.contains("expired")
        )));
    }
}
