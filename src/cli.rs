use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "duel ranking backend")]
pub struct Cli {
    /// Command
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
#[clap(rename_all = "lower_case")]
pub enum Command {
    /// Start the read-only ranking/profile API server
    Serve {
        /// Port number (optional, defaults to 3000)
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
    /// Create or reset the database schema
    InitDb,
    /// Print the current ranking board
    Leaderboard {
        /// How many players to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}
