use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::connection::DbConn;
use super::models::Duel;
use crate::domain::DuelStatus;

const DUEL_COLUMNS: &str = "id, challenger_id, opponent_id, status, challenger_rating_at_match, opponent_rating_at_match, reported_winner_id, evidence_message_id, winner_id, loser_id, points_change, channel_id, created_at, accepted_at, completed_at";

fn parse_duel_row(row: &rusqlite::Row) -> rusqlite::Result<Duel> {
    let status_text: String = row.get(3)?;
    let status = DuelStatus::parse(&status_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown duel status: {status_text}").into(),
        )
    })?;

    Ok(Duel {
        id: row.get(0)?,
        challenger_id: row.get(1)?,
        opponent_id: row.get(2)?,
        status,
        challenger_rating_at_match: row.get(4)?,
        opponent_rating_at_match: row.get(5)?,
        reported_winner_id: row.get(6)?,
        evidence_message_id: row.get(7)?,
        winner_id: row.get(8)?,
        loser_id: row.get(9)?,
        points_change: row.get(10)?,
        channel_id: row.get(11)?,
        created_at: row.get(12)?,
        accepted_at: row.get(13)?,
        completed_at: row.get(14)?,
    })
}

/// Create a pending duel. Ratings are snapshotted for the historical
/// record; resolution re-reads live ratings. The single-active-duel check
/// belongs to the caller.
pub fn create(
    conn: &mut DbConn,
    challenger_id: i64,
    opponent_id: i64,
    challenger_rating: i64,
    opponent_rating: i64,
) -> Result<Duel> {
    let sql = format!(
        "INSERT INTO duels (challenger_id, opponent_id, status, challenger_rating_at_match, opponent_rating_at_match, created_at) VALUES (?1, ?2, 'pending', ?3, ?4, ?5) RETURNING {DUEL_COLUMNS}"
    );

    conn.query_row(
        &sql,
        params![
            challenger_id,
            opponent_id,
            challenger_rating,
            opponent_rating,
            Utc::now().naive_utc()
        ],
        parse_duel_row,
    )
    .context("Failed to insert new duel")
}

pub fn get_by_id(conn: &mut DbConn, id: i64) -> Result<Option<Duel>> {
    let sql = format!("SELECT {DUEL_COLUMNS} FROM duels WHERE id = ?1");

    conn.query_row(&sql, params![id], parse_duel_row)
        .optional()
        .context("Failed to query duel by id")
}

fn active_status_list() -> String {
    DuelStatus::active_states()
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Any non-terminal duel where the player is either side. At most one such
/// duel should exist per player; callers use this as the pre-creation guard.
pub fn get_active_for_player(conn: &mut DbConn, player_id: i64) -> Result<Option<Duel>> {
    let sql = format!(
        "SELECT {DUEL_COLUMNS} FROM duels WHERE (challenger_id = ?1 OR opponent_id = ?1) AND status IN ({}) LIMIT 1",
        active_status_list()
    );

    conn.query_row(&sql, params![player_id], parse_duel_row)
        .optional()
        .context("Failed to query active duel for player")
}

// Every transition below is a single conditional UPDATE keyed on the
// expected current status. `None` means the guard failed (stale action or
// a lost race); the row is untouched in that case.

pub fn accept(conn: &mut DbConn, id: i64, channel_id: i64) -> Result<Option<Duel>> {
    let sql = format!(
        "UPDATE duels SET status = 'in_progress', channel_id = ?1, accepted_at = ?2 WHERE id = ?3 AND status = 'pending' RETURNING {DUEL_COLUMNS}"
    );

    conn.query_row(
        &sql,
        params![channel_id, Utc::now().naive_utc(), id],
        parse_duel_row,
    )
    .optional()
    .context("Failed to accept duel")
}

pub fn cancel(conn: &mut DbConn, id: i64, expected: DuelStatus) -> Result<Option<Duel>> {
    let sql = format!(
        "UPDATE duels SET status = 'cancelled' WHERE id = ?1 AND status = ?2 RETURNING {DUEL_COLUMNS}"
    );

    conn.query_row(&sql, params![id, expected.as_str()], parse_duel_row)
        .optional()
        .context("Failed to cancel duel")
}

pub fn record_report(conn: &mut DbConn, id: i64, reporter_id: i64) -> Result<Option<Duel>> {
    let sql = format!(
        "UPDATE duels SET status = 'awaiting_screenshot', reported_winner_id = ?1 WHERE id = ?2 AND status = 'in_progress' RETURNING {DUEL_COLUMNS}"
    );

    conn.query_row(&sql, params![reporter_id, id], parse_duel_row)
        .optional()
        .context("Failed to record duel report")
}

pub fn record_evidence(conn: &mut DbConn, id: i64, message_id: i64) -> Result<Option<Duel>> {
    let sql = format!(
        "UPDATE duels SET status = 'awaiting_confirmation', evidence_message_id = ?1 WHERE id = ?2 AND status = 'awaiting_screenshot' RETURNING {DUEL_COLUMNS}"
    );

    conn.query_row(&sql, params![message_id, id], parse_duel_row)
        .optional()
        .context("Failed to record duel evidence")
}

pub fn mark_disputed(conn: &mut DbConn, id: i64) -> Result<Option<Duel>> {
    let sql = format!(
        "UPDATE duels SET status = 'disputed' WHERE id = ?1 AND status = 'awaiting_confirmation' RETURNING {DUEL_COLUMNS}"
    );

    conn.query_row(&sql, params![id], parse_duel_row)
        .optional()
        .context("Failed to mark duel disputed")
}

/// Claim the terminal state from either confirmation branch. Doing this
/// before the rating writes makes a concurrent second resolution lose the
/// claim instead of double-applying points. `points_change` is filled in
/// by `set_points_change` once the winner's final delta is known.
pub fn complete(
    conn: &mut DbConn,
    id: i64,
    from: DuelStatus,
    winner_id: i64,
    loser_id: i64,
) -> Result<Option<Duel>> {
    let sql = format!(
        "UPDATE duels SET status = 'completed', winner_id = ?1, loser_id = ?2, completed_at = ?3 WHERE id = ?4 AND status = ?5 RETURNING {DUEL_COLUMNS}"
    );

    conn.query_row(
        &sql,
        params![
            winner_id,
            loser_id,
            Utc::now().naive_utc(),
            id,
            from.as_str()
        ],
        parse_duel_row,
    )
    .optional()
    .context("Failed to complete duel")
}

/// Record the winner's final applied delta on a completed duel.
pub fn set_points_change(conn: &mut DbConn, id: i64, points_change: i64) -> Result<()> {
    conn.execute(
        "UPDATE duels SET points_change = ?1 WHERE id = ?2 AND status = 'completed'",
        params![points_change, id],
    )
    .context("Failed to record duel points change")?;
    Ok(())
}

/// The open duel bound to a channel, if any; used to route evidence
/// messages posted in duel spaces.
pub fn get_active_by_channel(conn: &mut DbConn, channel_id: i64) -> Result<Option<Duel>> {
    let sql = format!(
        "SELECT {DUEL_COLUMNS} FROM duels WHERE channel_id = ?1 AND status IN ({}) LIMIT 1",
        active_status_list()
    );

    conn.query_row(&sql, params![channel_id], parse_duel_row)
        .optional()
        .context("Failed to query duel by channel")
}

/// Cancel every pending challenge older than the validity window and
/// return the affected rows, so the caller can notify the participants.
pub fn cancel_expired_challenges(
    conn: &mut DbConn,
    now: NaiveDateTime,
    ttl_secs: i64,
) -> Result<Vec<Duel>> {
    let cutoff = now - Duration::seconds(ttl_secs);
    let sql = format!(
        "UPDATE duels SET status = 'cancelled' WHERE status = 'pending' AND created_at < ?1 RETURNING {DUEL_COLUMNS}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![cutoff], parse_duel_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}
