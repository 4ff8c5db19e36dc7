use std::path::{Path, PathBuf};

/// Environment variable holding the Vault server address
pub const VAULT_ADDR_ENV: &str = "VAULT_ADDR";

/// Environment variable holding the Vault token
pub const VAULT_TOKEN_ENV: &str = "VAULT_TOKEN";

/// Environment variable holding the Vault Enterprise namespace
pub const VAULT_NAMESPACE_ENV: &str = "VAULT_NAMESPACE";

/// Environment variable holding the HTTP timeout in seconds
pub const VAULT_CLIENT_TIMEOUT_ENV: &str = "VAULT_CLIENT_TIMEOUT";

/// Environment variable disabling TLS certificate verification
pub const VAULT_SKIP_VERIFY_ENV: &str = "VAULT_SKIP_VERIFY";

/// Token file written by `vault login`, relative to the home directory
pub const VAULT_TOKEN_FILE_NAME: &str = ".vault-token";

/// Environment variable overriding the state file location
pub const STATE_FILE_ENV: &str = "VAC_STATE_FILE";

/// State file name, relative to the home directory
pub const STATE_FILE_NAME: &str = ".vac_state.json";

/// Mount type of the Vault AWS secret engine
pub const AWS_ENGINE_TYPE: &str = "aws";

/// Default HTTP timeout against Vault
pub const DEFAULT_VAULT_TIMEOUT_SECS: u64 = 60;

/// Default minimum remaining validity before cached credentials are refreshed
pub const DEFAULT_MIN_VALIDITY_SECS: u64 = 60;

/// Get the Vault token file path
pub fn vault_token_path(home: &Path) -> PathBuf {
    home.join(VAULT_TOKEN_FILE_NAME)
}

/// Get the default state file path (`~/.vac_state.json`)
pub fn default_state_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(STATE_FILE_NAME))
}
