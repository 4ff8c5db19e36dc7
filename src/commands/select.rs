use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::session::Session;

#[derive(Debug, Clone, Args)]
pub struct SelectCommand {
    #[arg(help = "AWS secret engine mount")]
    pub engine: String,

    #[arg(help = "Role under the engine")]
    pub role: String,
}

impl SelectCommand {
    pub async fn execute(self, state_path: &Path) -> Result<()> {
        super::ensure_state_dir(state_path).await?;
        // Selecting needs no Vault connection.
        let mut session = Session::open((), state_path)
            .await
            .context("Failed to load vac state")?;
        session
            .select(&self.engine, &self.role)
            .await
            .context("Failed to save vac state")?;

        info!("Selected {}/{}", self.engine, self.role);
        Ok(())
    }
}
