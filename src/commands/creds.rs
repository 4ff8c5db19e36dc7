use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, TimeDelta};
use clap::Args;
use serde::Serialize;
use tracing::info;

use crate::{
    aws::AwsCredentials, constants::DEFAULT_MIN_VALIDITY_SECS, session::Session,
    vault::VaultClient,
};

#[derive(Debug, Clone, Args)]
pub struct CredsCommand {
    #[arg(short = 'e', long, requires = "role", help = "AWS secret engine mount (defaults to the current selection)")]
    pub engine: Option<String>,

    #[arg(short = 'r', long, requires = "engine", help = "Role under the engine (defaults to the current selection)")]
    pub role: Option<String>,

    #[arg(
        long,
        value_name = "SECS",
        default_value_t = DEFAULT_MIN_VALIDITY_SECS,
        help = "Refresh cached credentials expiring within this many seconds"
    )]
    pub min_validity: u64,
}

impl Default for CredsCommand {
    fn default() -> Self {
        Self {
            engine: None,
            role: None,
            min_validity: DEFAULT_MIN_VALIDITY_SECS,
        }
    }
}

/// Output format of an AWS `credential_process`
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialProcessOutput<'a> {
    version: u8,
    access_key_id: &'a str,
    secret_access_key: &'a str,
    session_token: &'a str,
    expiration: String,
}

impl<'a> From<&'a AwsCredentials> for CredentialProcessOutput<'a> {
    fn from(creds: &'a AwsCredentials) -> Self {
        Self {
            version: 1,
            access_key_id: creds.access_key_id(),
            secret_access_key: creds.secret_access_key(),
            session_token: creds.security_token(),
            expiration: creds
                .metadata()
                .expire_at()
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

impl CredsCommand {
    pub async fn execute(self, state_path: &Path) -> Result<()> {
        // Vault settings are checked before the state file is touched.
        let client = VaultClient::from_env()
            .await
            .context("Failed to configure Vault client")?;
        super::ensure_state_dir(state_path).await?;

        let margin = TimeDelta::try_seconds(i64::try_from(self.min_validity).unwrap_or(i64::MAX))
            .context("--min-validity is too large")?;
        let mut session = Session::open(client, state_path)
            .await
            .context("Failed to load vac state")?
            .with_renewal_margin(margin);

        let creds = match (self.engine.as_deref(), self.role.as_deref()) {
            (Some(engine), Some(role)) => session
                .credentials(engine, role)
                .await
                .with_context(|| format!("Failed to get credentials for {engine}/{role}"))?,
            _ => session
                .current_credentials()
                .await
                .context("Failed to get credentials for the current selection")?,
        };

        info!(
            "Credentials expire at {}",
            creds.metadata().expire_at().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        println!("{}", render(&creds)?);
        Ok(())
    }
}

fn render(creds: &AwsCredentials) -> Result<String> {
    serde_json::to_string_pretty(&CredentialProcessOutput::from(creds))
        .context("Failed to serialize credentials")
}
