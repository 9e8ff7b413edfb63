use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Subcommand};
use std::path::PathBuf;

use crate::commands::common;
use roundtable::config::ConversationConfig;
use roundtable::store::{self, KEY_CONFIG, KEY_SESSION};

#[derive(ClapArgs)]
pub struct Args {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the persisted conversation settings
    Show {
        /// Operator config file (defaults to the standard location)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Patch one setting, e.g. `config set max_turns 20`
    Set {
        /// One of: auto_reply_delay_ms, max_turns, context_window_size,
        /// initial_prompt, template, activation_mode
        key: String,

        value: String,

        /// Operator config file (defaults to the standard location)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub async fn execute(args: Args) -> Result<()> {
    match args.command {
        ConfigCommand::Show { config } => show(config).await,
        ConfigCommand::Set { key, value, config } => set(key, value, config).await,
    }
}

async fn show(config_path: Option<PathBuf>) -> Result<()> {
    let (_app, store) = common::open_store(config_path).await?;
    let config: ConversationConfig = store::load(&store, KEY_CONFIG).await?.unwrap_or_default();

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn set(key: String, value: String, config_path: Option<PathBuf>) -> Result<()> {
    let (_app, store) = common::open_store(config_path).await?;
    let mut config: ConversationConfig = store::load(&store, KEY_CONFIG).await?.unwrap_or_default();

    apply(&mut config, &key, &value)?;

    store::save(&store, KEY_CONFIG, &config).await?;

    // Keep the session blob coherent so a running orchestrator that
    // reloads sees the same settings.
    let mut session = common::load_session(&store).await?;
    session.config = config;
    store::save(&store, KEY_SESSION, &session).await?;

    println!("Set {} = {}", key, value);
    Ok(())
}

fn apply(config: &mut ConversationConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "auto_reply_delay_ms" => {
            config.auto_reply_delay_ms = value
                .parse()
                .with_context(|| format!("'{}' is not a millisecond count", value))?;
        }
        "max_turns" => {
            config.max_turns = value
                .parse()
                .with_context(|| format!("'{}' is not a turn count", value))?;
        }
        "context_window_size" => {
            config.context_window_size = value
                .parse()
                .with_context(|| format!("'{}' is not an entry count", value))?;
        }
        "initial_prompt" => {
            config.initial_prompt = value.to_string();
        }
        "template" => {
            config.template = if value == "none" {
                None
            } else {
                Some(
                    serde_json::from_value(serde_json::Value::String(value.to_string()))
                        .with_context(|| {
                            format!("'{}' is not a template (debate, story, qa, brainstorm)", value)
                        })?,
                )
            };
        }
        "activation_mode" => {
            config.activation_mode =
                serde_json::from_value(serde_json::Value::String(value.to_string()))
                    .with_context(|| {
                        format!("'{}' is not an activation mode (always, never, hybrid)", value)
                    })?;
        }
        other => bail!("Unknown setting '{}'", other),
    }
    Ok(())
}
