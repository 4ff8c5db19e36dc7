//! File-backed cache of issued credentials keyed by engine and role, plus
//! the current selection.

use std::{collections::BTreeMap, io, path::Path};

use serde::{Deserialize, Deserializer, Serialize};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

use crate::{
    aws::AwsCredentials,
    error::{Error, Result},
};

/// The engine and role the user last addressed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub engine: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
}

impl Selection {
    pub fn is_complete(&self) -> bool {
        !self.engine.is_empty() && !self.role.is_empty()
    }
}

type RoleCredentials = BTreeMap<String, AwsCredentials>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default, deserialize_with = "null_as_default")]
    current: Selection,
    #[serde(
        default,
        rename = "creds",
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "null_as_default"
    )]
    creds: BTreeMap<String, RoleCredentials>,
}

impl State {
    /// Load the state file, or an empty state when it does not exist yet
    pub async fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting empty", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::io("Failed to read state file", path, e)),
        };

        let mut state: Self = serde_json::from_slice(&bytes).map_err(|source| Error::StateParse {
            path: path.to_path_buf(),
            source,
        })?;
        state.drop_unkeyed_entries();
        Ok(state)
    }

    /// Replace the state file atomically. The parent directory must exist.
    pub async fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::io("Failed to serialize state for", path, io::Error::other(e)))?;

        let file_name = path.file_name().ok_or_else(|| {
            Error::io(
                "Invalid state file path",
                path,
                io::Error::from(io::ErrorKind::InvalidInput),
            )
        })?;
        let tmp_path = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

        if let Err(e) = write_private(&tmp_path, &contents).await {
            fs::remove_file(&tmp_path).await.ok();
            return Err(Error::io("Failed to write state file", path, e));
        }
        if let Err(e) = fs::rename(&tmp_path, path).await {
            fs::remove_file(&tmp_path).await.ok();
            return Err(Error::io("Failed to replace state file", path, e));
        }

        debug!("Wrote state to {}", path.display());
        Ok(())
    }

    pub fn current(&self) -> &Selection {
        &self.current
    }

    pub fn set_current_engine(&mut self, engine: impl Into<String>) {
        self.current.engine = engine.into();
    }

    pub fn set_current_role(&mut self, role: impl Into<String>) {
        self.current.role = role.into();
    }

    /// Insert or replace the credentials cached for `engine`/`role`
    pub fn set_aws_credentials(
        &mut self,
        engine: &str,
        role: &str,
        creds: AwsCredentials,
    ) -> Result<()> {
        if engine.is_empty() || role.is_empty() {
            return Err(Error::Configuration(format!(
                "Cannot cache credentials without both an engine and a role (engine: '{engine}', role: '{role}')"
            )));
        }
        self.creds
            .entry(engine.to_string())
            .or_default()
            .insert(role.to_string(), creds);
        Ok(())
    }

    pub fn set_current_aws_credentials(&mut self, creds: AwsCredentials) -> Result<()> {
        let Selection { engine, role } = self.current.clone();
        self.set_aws_credentials(&engine, &role, creds)
    }

    /// Cached credentials for `engine`/`role`, expired or not
    pub fn get_aws_credentials(&self, engine: &str, role: &str) -> Option<&AwsCredentials> {
        self.creds.get(engine)?.get(role)
    }

    pub fn get_current_aws_credentials(&self) -> Option<&AwsCredentials> {
        self.get_aws_credentials(&self.current.engine, &self.current.role)
    }

    /// Engines with at least one cached role, ascending
    pub fn list_cached_engines(&self) -> Vec<&str> {
        self.creds
            .iter()
            .filter(|(_, roles)| !roles.is_empty())
            .map(|(engine, _)| engine.as_str())
            .collect()
    }

    /// Cached roles of `engine`, ascending; empty for unknown engines
    pub fn list_cached_engine_roles(&self, engine: &str) -> Vec<&str> {
        self.creds
            .get(engine)
            .map(|roles| roles.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn drop_unkeyed_entries(&mut self) {
        if self.creds.remove("").is_some() {
            warn!("Dropping cached credentials stored without an engine name");
        }
        for (engine, roles) in &mut self.creds {
            if roles.remove("").is_some() {
                warn!("Dropping cached credentials of engine '{}' stored without a role name", engine);
            }
        }
    }
}

async fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;

    // An earlier leftover temp file keeps its old mode when truncated.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
