use async_trait::async_trait;

use crate::{aws::AwsCredentials, error::Result};

pub mod client;
pub mod config;
pub mod decode;

pub use client::VaultClient;
pub use config::VaultConfig;

/// Remote operations against Vault AWS secret engines
#[async_trait]
pub trait SecretEngine: Send + Sync {
    /// Names of all mounts of type `aws`, in no particular order
    async fn list_aws_engines(&self) -> Result<Vec<String>>;

    /// Roles configured under `engine`; empty when Vault reports none
    async fn list_aws_engine_roles(&self, engine: &str) -> Result<Vec<String>>;

    /// Mint STS credentials for `role` under `engine`
    async fn generate_aws_credentials(&self, engine: &str, role: &str) -> Result<AwsCredentials>;
}
