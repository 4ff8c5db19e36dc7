use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use crate::{
    state::State,
    vault::{SecretEngine, VaultClient},
};

#[derive(Debug, Clone, Args)]
pub struct RolesCommand {
    #[arg(help = "AWS secret engine mount (defaults to the current selection)")]
    pub engine: Option<String>,

    #[arg(long, help = "Only list roles with cached credentials, without contacting Vault")]
    pub cached: bool,
}

impl RolesCommand {
    pub async fn execute(self, state_path: &Path) -> Result<()> {
        let state = State::read(state_path)
            .await
            .context("Failed to load vac state")?;
        let engine = resolve_engine(self.engine, &state)?;

        let roles = if self.cached {
            state
                .list_cached_engine_roles(&engine)
                .into_iter()
                .map(str::to_string)
                .collect()
        } else {
            let client = VaultClient::from_env()
                .await
                .context("Failed to configure Vault client")?;
            let mut roles = client
                .list_aws_engine_roles(&engine)
                .await
                .with_context(|| format!("Failed to list roles of engine '{engine}'"))?;
            roles.sort();
            roles
        };

        for role in roles {
            println!("{role}");
        }
        Ok(())
    }
}

fn resolve_engine(engine: Option<String>, state: &State) -> Result<String> {
    engine
        .or_else(|| Some(state.current().engine.clone()).filter(|e| !e.is_empty()))
        .context("No engine given and none selected; pass one or run `vac use ENGINE ROLE`")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_engine_prefers_argument() {
        let mut state = State::default();
        state.set_current_engine("aws-dev");
        let engine = resolve_engine(Some("aws-prod".to_string()), &state).unwrap();
        assert_eq!(engine, "aws-prod");
    }

    #[test]
    fn test_resolve_engine_falls_back_to_selection() {
        let mut state = State::default();
        state.set_current_engine("aws-dev");
        assert_eq!(resolve_engine(None, &state).unwrap(), "aws-dev");
    }

    #[test]
    fn test_resolve_engine_without_selection() {
        let err = resolve_engine(None, &State::default()).unwrap_err();
        assert!(err.to_string().contains("No engine given"));
    }
}
