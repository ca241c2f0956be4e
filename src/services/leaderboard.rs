use anyhow::Result;
use colored::Colorize;

use crate::database::{self, DbPool, Player};

/// Ranked view over the registered players, shared by the CLI printout and
/// the read API.
pub struct LeaderboardService {
    pool: DbPool,
}

#[derive(Debug, Clone)]
pub struct RankedPlayer {
    pub rank: usize,
    pub player: Player,
    pub matches_played: i64,
}

impl LeaderboardService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn top(&self, limit: usize, offset: usize) -> Result<Vec<RankedPlayer>> {
        let mut conn = database::get_connection(&self.pool)?;
        let players = database::players::list_registered_by_points(&mut conn, limit, offset)?;

        players
            .into_iter()
            .enumerate()
            .map(|(i, player)| {
                let matches_played = database::players::matches_played(&mut conn, player.id)?;
                Ok(RankedPlayer {
                    rank: offset + i + 1,
                    player,
                    matches_played,
                })
            })
            .collect()
    }

    pub fn total_registered(&self) -> Result<i64> {
        let mut conn = database::get_connection(&self.pool)?;
        database::players::count_registered(&mut conn)
    }

    /// Print the board to the terminal for the `leaderboard` CLI command.
    pub fn print(&self, limit: usize) -> Result<()> {
        let rows = self.top(limit, 0)?;
        if rows.is_empty() {
            println!("{}", "No registered players yet.".dimmed());
            return Ok(());
        }

        println!(
            "{:<5} {:<20} {:<16} {:>8} {:>8}",
            "#".bold(),
            "Player".bold(),
            "Rank".bold(),
            "Points".bold(),
            "Matches".bold()
        );
        for row in rows {
            let name = row
                .player
                .nickname
                .clone()
                .unwrap_or_else(|| row.player.username.clone());
            let points = match row.rank {
                1 => row.player.rating_points.to_string().yellow(),
                2 | 3 => row.player.rating_points.to_string().cyan(),
                _ => row.player.rating_points.to_string().normal(),
            };
            println!(
                "{:<5} {:<20} {:<16} {:>8} {:>8}",
                row.rank,
                name,
                row.player.rank_label(),
                points,
                row.matches_played
            );
        }
        Ok(())
    }
}
