use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};

use crate::{
    commands::{CompletionsCommand, CredsCommand, EnginesCommand, RolesCommand, SelectCommand},
    constants::{self, STATE_FILE_ENV},
};

#[derive(Debug, Clone, Parser)]
#[command(name = "vac", version, about = "AWS credentials from Vault AWS secret engines, cached locally", long_about = None)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = STATE_FILE_ENV,
        value_name = "PATH",
        help = "State file caching issued credentials [default: ~/.vac_state.json]"
    )]
    pub state: Option<PathBuf>,

    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Increase verbosity (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Print AWS credentials for an engine and role as credential_process JSON")]
    Creds(CredsCommand),
    #[command(about = "List AWS secret engines")]
    Engines(EnginesCommand),
    #[command(about = "List roles of an AWS secret engine")]
    Roles(RolesCommand),
    #[command(name = "use", about = "Select the engine and role used by default")]
    Use(SelectCommand),
    #[command(about = "Generate shell completion scripts for vac")]
    Completions(CompletionsCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let command = self
            .command
            .unwrap_or_else(|| Commands::Creds(CredsCommand::default()));
        let state = self.state;

        match command {
            Commands::Creds(cmd) => cmd.execute(&state_path(state)?).await,
            Commands::Engines(cmd) => cmd.execute(&state_path(state)?).await,
            Commands::Roles(cmd) => cmd.execute(&state_path(state)?).await,
            Commands::Use(cmd) => cmd.execute(&state_path(state)?).await,
            Commands::Completions(cmd) => {
                cmd.execute();
                Ok(())
            }
        }
    }
}

fn state_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(path),
        None => constants::default_state_path()
            .context("Failed to determine home directory for the state file"),
    }
}
