pub mod aws;
pub mod cli;
pub mod commands;
pub mod constants;
pub mod error;
pub mod session;
pub mod state;
pub mod vault;

pub use aws::{AwsCredentials, CredentialsMetadata};
pub use error::{Error, ErrorKind, Result};
pub use session::Session;
pub use state::{Selection, State};
pub use vault::{SecretEngine, VaultClient, VaultConfig};
