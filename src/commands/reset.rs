use anyhow::Result;
use clap::Args as ClapArgs;
use std::path::PathBuf;

use crate::commands::common;
use roundtable::store::{StateStore, KEY_CONFIG, KEY_HISTORY, KEY_SESSION, KEY_TIMEOUT_PROFILES};

#[derive(ClapArgs)]
pub struct Args {
    /// Skip the confirmation
    #[arg(long)]
    pub yes: bool,

    /// Operator config file (defaults to the standard location)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn execute(args: Args) -> Result<()> {
    let (app, store) = common::open_store(args.config).await?;

    if !args.yes {
        println!(
            "This clears the session, settings, transcript, and learned timeout profiles under {}.",
            app.data_dir.display()
        );
        println!("Re-run with --yes to confirm.");
        return Ok(());
    }

    for key in [KEY_SESSION, KEY_CONFIG, KEY_HISTORY, KEY_TIMEOUT_PROFILES] {
        store.remove(key).await?;
    }
    println!("All orchestrator state cleared.");
    Ok(())
}
