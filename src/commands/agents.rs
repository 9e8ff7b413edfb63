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
    let (_app, store) = common::open_store(args.config).await?;
    let session = common::load_session(&store).await?;

    if session.participants.is_empty() {
        println!("No agents on the roster.");
        return Ok(());
    }

    println!("Roster:");
    for participant in &session.participants {
        match participant.tab {
            Some(tab) => println!(
                "  [{}] {} - {} on tab {} ({})",
                participant.slot_order,
                participant.display_role,
                participant.platform.as_deref().unwrap_or("unknown"),
                tab,
                participant.title,
            ),
            None => println!(
                "  [{}] {} - held open",
                participant.slot_order, participant.display_role
            ),
        }
    }

    Ok(())
}
