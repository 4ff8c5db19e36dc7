use std::fmt;

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};

/// Validity window of an issued credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsMetadata {
    #[serde(default, deserialize_with = "timestamp_or_epoch")]
    created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp_or_epoch")]
    expire_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_timestamp"
    )]
    renew_before: Option<DateTime<Utc>>,
}

impl CredentialsMetadata {
    /// Window starting at `created_at` and lasting `lease`.
    /// Returns `None` for a negative lease or one that overflows the calendar.
    pub fn for_lease(created_at: DateTime<Utc>, lease: TimeDelta) -> Option<Self> {
        if lease < TimeDelta::zero() {
            return None;
        }
        let expire_at = created_at.checked_add_signed(lease)?;
        Some(Self {
            created_at,
            expire_at,
            renew_before: None,
        })
    }

    /// Zero-length window starting at `created_at`, never valid
    pub(crate) fn unusable(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            expire_at: created_at,
            renew_before: None,
        }
    }

    /// Mark a preferred renewal point. Rejected unless it lies within the window.
    pub fn with_renew_before(self, renew_before: DateTime<Utc>) -> Option<Self> {
        (self.created_at <= renew_before && renew_before <= self.expire_at).then_some(Self {
            renew_before: Some(renew_before),
            ..self
        })
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expire_at(&self) -> DateTime<Utc> {
        self.expire_at
    }

    pub fn renew_before(&self) -> Option<DateTime<Utc>> {
        self.renew_before
    }

    pub fn lease(&self) -> TimeDelta {
        self.expire_at - self.created_at
    }
}

/// AWS STS credentials issued by a Vault AWS secret engine.
///
/// Values are immutable once built; refreshing produces a new value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsCredentials {
    metadata: CredentialsMetadata,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    access_key_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    secret_access_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    security_token: String,
}

impl AwsCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        security_token: impl Into<String>,
        metadata: CredentialsMetadata,
    ) -> Self {
        Self {
            metadata,
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            security_token: security_token.into(),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn security_token(&self) -> &str {
        &self.security_token
    }

    pub fn metadata(&self) -> &CredentialsMetadata {
        &self.metadata
    }

    /// True when the credentials are still valid `margin` after `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        now.checked_add_signed(margin)
            .is_some_and(|deadline| deadline < self.metadata.expire_at)
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        (self.metadata.expire_at - now).max(TimeDelta::zero())
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("metadata", &self.metadata)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("security_token", &"<redacted>")
            .finish()
    }
}

// Older state files carry the zero time `0001-01-01T00:00:00Z` for unset timestamps.
fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => {
            let parsed = DateTime::parse_from_rfc3339(value)
                .map_err(de::Error::custom)?
                .with_timezone(&Utc);
            Ok((parsed.year() > 1).then_some(parsed))
        }
    }
}

fn timestamp_or_epoch<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_timestamp(deserializer)?.unwrap_or_default())
}
