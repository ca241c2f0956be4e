use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::connection::DbConn;
use super::models::{AppliedResult, MatchHistoryEntry, Player};
use crate::config::settings::RatingSettings;
use crate::domain::MatchOutcome;
use crate::rating;

const PLAYER_COLUMNS: &str = "id, username, is_registered, registration_reminders_sent, last_reminder_sent_at, nickname, region, preferred_roles, rating_points, rank_tier, rank_division, win_streak, card_message_id, created_at, last_updated";

fn parse_player_row(row: &rusqlite::Row) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        username: row.get(1)?,
        is_registered: row.get(2)?,
        registration_reminders_sent: row.get(3)?,
        last_reminder_sent_at: row.get(4)?,
        nickname: row.get(5)?,
        region: row.get(6)?,
        preferred_roles: row.get(7)?,
        rating_points: row.get(8)?,
        rank_tier: row.get(9)?,
        rank_division: row.get(10)?,
        win_streak: row.get(11)?,
        card_message_id: row.get(12)?,
        created_at: row.get(13)?,
        last_updated: row.get(14)?,
    })
}

pub fn get_by_id(conn: &mut DbConn, id: i64) -> Result<Option<Player>> {
    let sql = format!("SELECT {PLAYER_COLUMNS} FROM players WHERE id = ?1");

    conn.query_row(&sql, params![id], parse_player_row)
        .optional()
        .context("Failed to query player by id")
}

/// Fetch a player, creating the initial unregistered record on first
/// contact. Idempotent; the id is the platform identity and is never
/// generated here.
pub fn get_or_create(
    conn: &mut DbConn,
    id: i64,
    username: &str,
    settings: &RatingSettings,
) -> Result<Player> {
    if let Some(existing) = get_by_id(conn, id)? {
        return Ok(existing);
    }

    let (tier, division) = rating::rank_from_points(settings.starting_points);
    let now = Utc::now().naive_utc();
    let sql = format!(
        "INSERT INTO players (id, username, rating_points, rank_tier, rank_division, created_at, last_updated) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) RETURNING {PLAYER_COLUMNS}"
    );

    conn.query_row(
        &sql,
        params![id, username, settings.starting_points, tier, division, now],
        parse_player_row,
    )
    .context("Failed to insert new player")
}

pub fn list_unregistered(conn: &mut DbConn) -> Result<Vec<Player>> {
    let sql = format!("SELECT {PLAYER_COLUMNS} FROM players WHERE is_registered = 0");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], parse_player_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

/// Finalize registration with profile details. Rating fields are never
/// touched here.
pub fn complete_registration(
    conn: &mut DbConn,
    id: i64,
    nickname: &str,
    region: &str,
    roles: &[String],
) -> Result<()> {
    let sql = "UPDATE players SET is_registered = 1, nickname = ?1, region = ?2, preferred_roles = ?3, last_updated = ?4 WHERE id = ?5";
    let updated = conn
        .execute(
            sql,
            params![nickname, region, roles.join(","), Utc::now().naive_utc(), id],
        )
        .context("Failed to update player registration")?;

    if updated == 0 {
        anyhow::bail!("Player {} not found", id);
    }
    Ok(())
}

/// Matches on record for a player; drives K-factor selection.
pub fn matches_played(conn: &mut DbConn, id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM match_history WHERE player_id = ?1",
        params![id],
        |row| row.get(0),
    )
    .context("Failed to count matches played")
}

/// Apply one duel result to one player: streak bookkeeping, the streak
/// bonus when it triggers, rank recomputation and the history append, all
/// inside a single transaction so a concurrent resolution cannot interleave.
///
/// `base_delta` is the signed engine output for this side (positive for the
/// winner, negative for the loser). The streak bonus only ever increases a
/// winner's gain; a loss resets the streak and gets no adjustment.
pub fn apply_duel_result(
    conn: &mut DbConn,
    settings: &RatingSettings,
    player_id: i64,
    outcome: MatchOutcome,
    base_delta: i64,
    opponent_id: i64,
    opponent_rating_at_match: i64,
) -> Result<AppliedResult> {
    let tx = conn
        .transaction()
        .context("Failed to open duel-result transaction")?;

    let (current_points, current_streak): (i64, i64) = tx
        .query_row(
            "SELECT rating_points, win_streak FROM players WHERE id = ?1",
            params![player_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .context("Failed to read player for duel result")?
        .with_context(|| format!("Player {} not found", player_id))?;

    let (new_streak, bonus) = match outcome {
        MatchOutcome::Win => {
            let streak = current_streak + 1;
            let bonus = if streak >= settings.streak_bonus_threshold {
                settings.streak_bonus_points
            } else {
                0
            };
            (streak, bonus)
        }
        MatchOutcome::Loss => (0, 0),
    };

    let final_delta = base_delta + bonus;
    let new_rating = current_points + final_delta;
    let (tier, division) = rating::rank_from_points(new_rating);
    let now = Utc::now().naive_utc();

    tx.execute(
        "UPDATE players SET rating_points = ?1, rank_tier = ?2, rank_division = ?3, win_streak = ?4, last_updated = ?5 WHERE id = ?6",
        params![new_rating, tier, division, new_streak, now, player_id],
    )
    .context("Failed to update player after duel")?;

    tx.execute(
        "INSERT INTO match_history (player_id, opponent_id, opponent_rating_at_match, points_change, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![player_id, opponent_id, opponent_rating_at_match, final_delta, now],
    )
    .context("Failed to append match history")?;

    tx.commit().context("Failed to commit duel result")?;

    Ok(AppliedResult {
        final_delta,
        bonus,
        new_rating,
        new_streak,
    })
}

pub fn increment_reminder(conn: &mut DbConn, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE players SET registration_reminders_sent = registration_reminders_sent + 1, last_reminder_sent_at = ?1 WHERE id = ?2",
        params![Utc::now().naive_utc(), id],
    )
    .context("Failed to increment reminder count")?;
    Ok(())
}

pub fn set_card_message(conn: &mut DbConn, id: i64, message_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE players SET card_message_id = ?1 WHERE id = ?2",
        params![message_id, id],
    )
    .context("Failed to store player card message id")?;
    Ok(())
}

pub fn delete_player(conn: &mut DbConn, id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM match_history WHERE player_id = ?1",
        params![id],
    )
    .context("Failed to delete player match history")?;
    conn.execute("DELETE FROM players WHERE id = ?1", params![id])
        .context("Failed to delete player")?;
    Ok(())
}

/// Registered players ordered by rating, for the ranking board.
pub fn list_registered_by_points(
    conn: &mut DbConn,
    limit: usize,
    offset: usize,
) -> Result<Vec<Player>> {
    let sql = format!(
        "SELECT {PLAYER_COLUMNS} FROM players WHERE is_registered = 1 ORDER BY rating_points DESC, id ASC LIMIT ?1 OFFSET ?2"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![limit, offset], parse_player_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

pub fn count_registered(conn: &mut DbConn) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM players WHERE is_registered = 1",
        [],
        |row| row.get(0),
    )
    .context("Failed to count registered players")
}

/// Most recent matches for a player, newest first.
pub fn history_for_player(
    conn: &mut DbConn,
    id: i64,
    limit: usize,
) -> Result<Vec<MatchHistoryEntry>> {
    let sql = "SELECT id, player_id, opponent_id, opponent_rating_at_match, points_change, created_at FROM match_history WHERE player_id = ?1 ORDER BY id DESC LIMIT ?2";

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![id, limit], |row| {
            Ok(MatchHistoryEntry {
                id: row.get(0)?,
                player_id: row.get(1)?,
                opponent_id: row.get(2)?,
                opponent_rating_at_match: row.get(3)?,
                points_change: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}
