use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use crate::{
    state::State,
    vault::{SecretEngine, VaultClient},
};

#[derive(Debug, Clone, Args)]
pub struct EnginesCommand {
    #[arg(long, help = "Only list engines with cached credentials, without contacting Vault")]
    pub cached: bool,
}

impl EnginesCommand {
    pub async fn execute(self, state_path: &Path) -> Result<()> {
        let engines = if self.cached {
            let state = State::read(state_path)
                .await
                .context("Failed to load vac state")?;
            state
                .list_cached_engines()
                .into_iter()
                .map(str::to_string)
                .collect()
        } else {
            let client = VaultClient::from_env()
                .await
                .context("Failed to configure Vault client")?;
            let mut engines = client
                .list_aws_engines()
                .await
                .context("Failed to list AWS secret engines")?;
            engines.sort();
            engines
        };

        for engine in engines {
            println!("{engine}");
        }
        Ok(())
    }
}
