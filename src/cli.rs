use clap::{Parser, Subcommand};

use crate::commands::{agents, config, history, reset, status};

#[derive(Parser)]
#[command(name = "roundtable")]
#[command(about = "Conversation orchestrator for AI chat agents in browser tabs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Display the persisted conversation status
    Status(status::Args),

    /// Print the recorded transcript
    History(history::Args),

    /// List the agent roster
    Agents(agents::Args),

    /// Inspect or patch the conversation settings
    Config(config::Args),

    /// Clear all persisted orchestrator state
    Reset(reset::Args),
}
