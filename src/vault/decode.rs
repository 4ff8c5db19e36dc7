//! Extraction of typed values from Vault's loosely typed JSON responses.
//!
//! Every failure reports the dotted field path it tripped on. Absent optional
//! fields are not failures: they decode to empty strings or empty lists.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value};

use crate::{
    aws::{AwsCredentials, CredentialsMetadata},
    constants::AWS_ENGINE_TYPE,
    error::{Error, Result},
};

struct Decoder<'a> {
    operation: &'a str,
}

impl Decoder<'_> {
    fn error(&self, path: impl Into<String>, reason: impl Into<String>) -> Error {
        Error::Decode {
            operation: self.operation.to_string(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    fn object<'v>(&self, value: &'v Value, path: &str) -> Result<&'v Map<String, Value>> {
        value
            .as_object()
            .ok_or_else(|| self.error(path, format!("expected an object, got {}", type_name(value))))
    }

    /// `None` when the field is absent or `null`
    fn field<'v>(&self, parent: Option<&'v Value>, key: &str) -> Option<&'v Value> {
        parent.and_then(|p| p.get(key)).filter(|v| !v.is_null())
    }

    fn optional_string(&self, parent: Option<&Value>, key: &str, path: &str) -> Result<String> {
        match self.field(parent, key) {
            None => Ok(String::new()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(self.error(path, format!("expected a string, got {}", type_name(other)))),
        }
    }
}

/// Names of the mounts whose type is the AWS secret engine, without trailing `/`.
///
/// Newer Vault servers nest the mount table under `data`; older ones return it
/// at the top level next to the request metadata.
pub fn aws_engines(body: &Value, operation: &str) -> Result<Vec<String>> {
    let decoder = Decoder { operation };
    let mounts = match body.get("data").filter(|d| !d.is_null()) {
        Some(data) => decoder.object(data, "data")?,
        None => decoder.object(body, "(root)")?,
    };

    Ok(mounts
        .iter()
        .filter(|(_, mount)| mount.get("type").and_then(Value::as_str) == Some(AWS_ENGINE_TYPE))
        .map(|(name, _)| name.trim_end_matches('/').to_string())
        .collect())
}

/// Keys of a LIST response, empty when the response carries no `data` or no `keys`
pub fn list_keys(body: Option<&Value>, operation: &str) -> Result<Vec<String>> {
    let decoder = Decoder { operation };
    let data = decoder.field(body, "data");
    let Some(keys) = decoder.field(data, "keys") else {
        return Ok(Vec::new());
    };

    let keys = keys.as_array().ok_or_else(|| {
        decoder.error("data.keys", format!("expected an array, got {}", type_name(keys)))
    })?;

    keys.iter()
        .enumerate()
        .map(|(i, key)| {
            key.as_str().map(str::to_string).ok_or_else(|| {
                decoder.error(
                    format!("data.keys[{i}]"),
                    format!("expected a string, got {}", type_name(key)),
                )
            })
        })
        .collect()
}

/// Build credentials from an STS write response, minted at `created_at`.
pub fn sts_credentials(
    body: &Value,
    created_at: DateTime<Utc>,
    engine: &str,
    role: &str,
    operation: &str,
) -> Result<AwsCredentials> {
    let decoder = Decoder { operation };
    let data = decoder.field(Some(body), "data");

    let access_key_id = decoder.optional_string(data, "access_key", "data.access_key")?;
    let secret_access_key = decoder.optional_string(data, "secret_key", "data.secret_key")?;
    let security_token = decoder.optional_string(data, "security_token", "data.security_token")?;

    let metadata = lease_duration(body).and_then(|lease| {
        CredentialsMetadata::for_lease(created_at, lease)
            .ok_or_else(|| format!("lease duration of {}s overflows", lease.num_seconds()))
    });

    match metadata {
        Ok(metadata) => Ok(AwsCredentials::new(
            access_key_id,
            secret_access_key,
            security_token,
            metadata,
        )),
        Err(reason) => {
            let expired = CredentialsMetadata::unusable(created_at);
            Err(Error::CredentialFormation {
                engine: engine.to_string(),
                role: role.to_string(),
                reason,
                partial: Box::new(AwsCredentials::new(
                    access_key_id,
                    secret_access_key,
                    security_token,
                    expired,
                )),
            })
        }
    }
}

fn lease_duration(body: &Value) -> std::result::Result<TimeDelta, String> {
    let raw = match body.get("lease_duration") {
        None | Some(Value::Null) => return Err("response has no lease_duration".to_string()),
        Some(raw) => raw,
    };

    raw.as_i64()
        .filter(|secs| *secs > 0)
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| format!("invalid lease_duration {raw}"))
}

/// Messages from a Vault error body (`{"errors": [...]}`)
pub fn error_messages(body: &Value) -> Vec<String> {
    body.get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(Value::as_str)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
