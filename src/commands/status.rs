use anyhow::Result;
use clap::Args as ClapArgs;
use std::path::PathBuf;

use crate::commands::common;

#[derive(ClapArgs)]
pub struct Args {
    /// Operator config file (defaults to the standard location)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn execute(args: Args) -> Result<()> {
    let (app, store) = common::open_store(args.config).await?;
    let session = common::load_session(&store).await?;

    println!("Data dir: {}", app.data_dir.display());
    println!(
        "Conversation: {}",
        if session.active { "active" } else { "inactive" }
    );
    if !session.config.initial_prompt.is_empty() {
        println!("Topic: {}", session.config.initial_prompt);
    }
    println!(
        "Turns: {} recorded / {} max",
        session.history.len(),
        session.config.max_turns
    );
    if session.active {
        println!("Current turn: slot {}", session.current_turn + 1);
    }

    println!(
        "\nParticipants ({} live):",
        session.live_participant_count()
    );
    for participant in &session.participants {
        let state = match participant.tab {
            Some(tab) => format!("tab {}", tab),
            None => "empty".to_string(),
        };
        let platform = participant.platform.as_deref().unwrap_or("-");
        println!(
            "  [{}] {:<10} {:<10} {}",
            participant.slot_order, participant.display_role, platform, state
        );
    }

    Ok(())
}
