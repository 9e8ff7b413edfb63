use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status(args) => commands::status::execute(args).await,
        Commands::History(args) => commands::history::execute(args).await,
        Commands::Agents(args) => commands::agents::execute(args).await,
        Commands::Config(args) => commands::config::execute(args).await,
        Commands::Reset(args) => commands::reset::execute(args).await,
    }
}
