pub mod api;
pub mod cli;
pub mod config;
pub mod database;
pub mod domain;
pub mod platform;
pub mod rating;
pub mod services;

use anyhow::Result;
use clap::Parser;
use cli::Cli;

use crate::cli::Command;
use crate::config::settings::AppConfig;
use crate::services::leaderboard::LeaderboardService;
use crate::services::server::ServerService;

pub fn interpret() -> Command {
    let cli = Cli::parse();
    cli.command
}

pub fn handle_serve(port: u16) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let config = AppConfig::new();
        let service = ServerService::new(port, config);
        service.run().await
    })
}

pub fn handle_init_db() -> Result<()> {
    let pool = database::create_pool(&database_path())?;
    let mut conn = database::get_connection(&pool)?;
    database::setup::reset_database(&mut conn)
}

pub fn handle_leaderboard(limit: usize) -> Result<()> {
    let pool = database::create_pool(&database_path())?;
    let service = LeaderboardService::new(pool);
    service.print(limit)
}

fn database_path() -> String {
    std::env::var("DATABASE_PATH").unwrap_or_else(|_| "rift_duel_ranking.db".to_string())
}
