use anyhow::Result;
use clap::Args as ClapArgs;
use std::path::PathBuf;

use crate::commands::common;

#[derive(ClapArgs)]
pub struct Args {
    /// Show only the last N entries
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Operator config file (defaults to the standard location)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn execute(args: Args) -> Result<()> {
    let (_app, store) = common::open_store(args.config).await?;
    let session = common::load_session(&store).await?;

    if session.history.is_empty() {
        println!("No recorded conversation history.");
        return Ok(());
    }

    let skip = args
        .limit
        .map(|limit| session.history.len().saturating_sub(limit))
        .unwrap_or(0);

    for entry in &session.history[skip..] {
        println!(
            "[{}] {} ({}):",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.role,
            entry.platform.as_deref().unwrap_or("unknown"),
        );
        println!("{}\n", entry.content);
    }

    Ok(())
}
