use std::{env, fmt, path::PathBuf, time::Duration};

use tokio::fs;
use tracing::debug;
use url::Url;

use crate::{
    constants::{
        self, DEFAULT_VAULT_TIMEOUT_SECS, VAULT_ADDR_ENV, VAULT_CLIENT_TIMEOUT_ENV,
        VAULT_NAMESPACE_ENV, VAULT_SKIP_VERIFY_ENV, VAULT_TOKEN_ENV,
    },
    error::{Error, Result},
};

/// Connection parameters for a Vault server
#[derive(Clone)]
pub struct VaultConfig {
    address: Url,
    token: String,
    pub namespace: Option<String>,
    pub timeout: Duration,
    pub skip_verify: bool,
}

impl VaultConfig {
    pub fn new(address: &str, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            address: parse_address(address)?,
            token: token.into(),
            namespace: None,
            timeout: Duration::from_secs(DEFAULT_VAULT_TIMEOUT_SECS),
            skip_verify: false,
        })
    }

    /// Discover the configuration from the process environment and `~/.vault-token`
    pub async fn from_env() -> Result<Self> {
        Self::discover(|key| env::var(key).ok(), dirs::home_dir()).await
    }

    /// Discover the configuration through `lookup`, falling back to the token
    /// file under `home` when no token variable is set.
    pub async fn discover<F>(lookup: F, home: Option<PathBuf>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let address = lookup(VAULT_ADDR_ENV).ok_or_else(|| {
            Error::Configuration(format!("{VAULT_ADDR_ENV} environment variable is not set"))
        })?;

        let token = match lookup(VAULT_TOKEN_ENV) {
            Some(token) => token,
            None => read_token_file(home).await?,
        };

        let mut config = Self::new(&address, token)?;
        config.namespace = lookup(VAULT_NAMESPACE_ENV);

        if let Some(raw) = lookup(VAULT_CLIENT_TIMEOUT_ENV) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                Error::Configuration(format!(
                    "{VAULT_CLIENT_TIMEOUT_ENV} must be a number of seconds, got '{raw}'"
                ))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(VAULT_SKIP_VERIFY_ENV) {
            config.skip_verify = parse_bool(&raw).ok_or_else(|| {
                Error::Configuration(format!(
                    "{VAULT_SKIP_VERIFY_ENV} must be a boolean, got '{raw}'"
                ))
            })?;
        }

        debug!("Using Vault at {}", config.address);
        Ok(config)
    }

    /// Base address, always ending in `/`
    pub fn address(&self) -> &Url {
        &self.address
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Build `{address}/v1/{segments}`, percent-encoding each segment on its own
    pub fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.address.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                Error::Configuration(format!("Vault address '{}' cannot carry a path", self.address))
            })?;
            path.pop_if_empty().push("v1");
            for segment in segments {
                if matches!(segment, "" | "." | "..") {
                    return Err(Error::Configuration(format!(
                        "Invalid Vault API path segment '{segment}'"
                    )));
                }
                path.push(segment);
            }
        }
        Ok(url)
    }
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address.as_str())
            .field("token", &"<redacted>")
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .field("skip_verify", &self.skip_verify)
            .finish()
    }
}

fn parse_address(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| Error::Configuration(format!("Invalid {VAULT_ADDR_ENV} '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Configuration(format!(
            "{VAULT_ADDR_ENV} must be an http or https URL, got '{raw}'"
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

// The token file is used verbatim.
async fn read_token_file(home: Option<PathBuf>) -> Result<String> {
    let missing = || {
        Error::Configuration(format!(
            "Vault token is not defined ({VAULT_TOKEN_ENV} or ~/{})",
            constants::VAULT_TOKEN_FILE_NAME
        ))
    };

    let path = constants::vault_token_path(&home.ok_or_else(missing)?);
    match fs::read_to_string(&path).await {
        Ok(token) if !token.is_empty() => {
            debug!("Read Vault token from {}", path.display());
            Ok(token)
        }
        Ok(_) => Err(missing()),
        Err(e) => {
            debug!("Could not read {}: {}", path.display(), e);
            Err(missing())
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
