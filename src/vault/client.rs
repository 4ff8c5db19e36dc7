use async_trait::async_trait;
use chrono::Utc;
use reqwest::{
    Client, Method, StatusCode,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{SecretEngine, VaultConfig, decode};
use crate::{
    aws::AwsCredentials,
    error::{Error, Result},
};

const TOKEN_HEADER: &str = "x-vault-token";
const NAMESPACE_HEADER: &str = "x-vault-namespace";
const REQUEST_HEADER: &str = "x-vault-request";

/// Vault HTTP API client scoped to the AWS secret engine endpoints
#[derive(Debug, Clone)]
pub struct VaultClient {
    http: Client,
    config: VaultConfig,
}

impl VaultClient {
    pub fn new(config: VaultConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();

        let mut token = HeaderValue::from_str(config.token()).map_err(|_| {
            Error::Configuration(
                "Vault token contains characters that are not allowed in an HTTP header"
                    .to_string(),
            )
        })?;
        token.set_sensitive(true);
        headers.insert(HeaderName::from_static(TOKEN_HEADER), token);
        headers.insert(
            HeaderName::from_static(REQUEST_HEADER),
            HeaderValue::from_static("true"),
        );

        if let Some(namespace) = &config.namespace {
            let value = HeaderValue::from_str(namespace).map_err(|_| {
                Error::Configuration(format!("Invalid Vault namespace '{namespace}'"))
            })?;
            headers.insert(HeaderName::from_static(NAMESPACE_HEADER), value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.skip_verify)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Build a client from `VAULT_*` environment variables and `~/.vault-token`
    pub async fn from_env() -> Result<Self> {
        Self::new(VaultConfig::from_env().await?)
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Send one request. `None` means Vault answered with no body, or with a
    /// bare 404 on a listing.
    async fn call(
        &self,
        method: Method,
        path: &[&str],
        query: &[(&str, &str)],
        body: Option<Value>,
        operation: &str,
    ) -> Result<Option<Value>> {
        let url = self.config.endpoint(path.iter().copied())?;
        let target = url.path().to_string();
        debug!("{} {}", method, target);

        let mut request = self.http.request(method, url).query(query);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|source| Error::Transport {
            operation: operation.to_string(),
            source,
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|source| Error::Transport {
            operation: operation.to_string(),
            source,
        })?;
        debug!("{} answered {} ({} bytes)", target, status, bytes.len());

        let parsed = if bytes.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => Some(value),
                Err(e) if status.is_success() => {
                    return Err(Error::Decode {
                        operation: operation.to_string(),
                        path: "(body)".to_string(),
                        reason: format!("response is not JSON: {e}"),
                    });
                }
                Err(_) => None,
            }
        };

        if status.is_success() {
            return Ok(parsed);
        }

        let messages = parsed.as_ref().map(decode::error_messages).unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND if messages.is_empty() => Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Auth {
                operation: operation.to_string(),
                status,
                messages,
            }),
            _ => Err(Error::Status {
                operation: operation.to_string(),
                status,
                messages,
            }),
        }
    }
}

#[async_trait]
impl SecretEngine for VaultClient {
    async fn list_aws_engines(&self) -> Result<Vec<String>> {
        let operation = "list AWS secret engines";
        let body = self
            .call(Method::GET, &["sys", "mounts"], &[], None, operation)
            .await?
            .unwrap_or(Value::Null);
        decode::aws_engines(&body, operation)
    }

    async fn list_aws_engine_roles(&self, engine: &str) -> Result<Vec<String>> {
        let operation = format!("list roles of engine '{engine}'");
        let body = self
            .call(
                Method::GET,
                &engine_path(engine, &["roles"]),
                &[("list", "true")],
                None,
                &operation,
            )
            .await?;
        decode::list_keys(body.as_ref(), &operation)
    }

    async fn generate_aws_credentials(&self, engine: &str, role: &str) -> Result<AwsCredentials> {
        let operation = format!("generate credentials for role '{role}' on engine '{engine}'");
        let body = self
            .call(
                Method::POST,
                &engine_path(engine, &["sts", role]),
                &[],
                Some(json!({})),
                &operation,
            )
            .await?
            .unwrap_or(Value::Null);

        let creds = decode::sts_credentials(&body, Utc::now(), engine, role, &operation)?;
        info!(
            "Vault issued credentials for {}/{} valid until {}",
            engine,
            role,
            creds.metadata().expire_at()
        );
        Ok(creds)
    }
}

/// Mount path pieces of `engine` (mounts may be nested, e.g. `team/aws`) followed by `rest`
fn engine_path<'a>(engine: &'a str, rest: &[&'a str]) -> Vec<&'a str> {
    engine
        .trim_matches('/')
        .split('/')
        .chain(rest.iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn config() -> VaultConfig {
        VaultConfig::new("http://127.0.0.1:8200", "s.token").unwrap()
    }

    #[test]
    fn test_new_accepts_plain_token() {
        let client = VaultClient::new(config()).unwrap();
        assert_eq!(client.config().token(), "s.token");
    }

    #[test]
    fn test_new_rejects_token_with_control_characters() {
        let config = VaultConfig::new("http://127.0.0.1:8200", "s.token\n").unwrap();
        let err = VaultClient::new(config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_new_rejects_invalid_namespace() {
        let mut config = config();
        config.namespace = Some("team\r\na".to_string());
        assert!(VaultClient::new(config).is_err());
    }

    #[test]
    fn test_engine_path_splits_nested_mounts() {
        assert_eq!(engine_path("aws-dev", &["roles"]), vec!["aws-dev", "roles"]);
        assert_eq!(
            engine_path("/team/aws/", &["sts", "dev/ops"]),
            vec!["team", "aws", "sts", "dev/ops"]
        );
        let url = config()
            .endpoint(engine_path("team/aws", &["sts", "dev#ops"]))
            .unwrap();
        assert_eq!(url.path(), "/v1/team/aws/sts/dev%23ops");
    }

    #[tokio::test]
    async fn test_path_traversal_in_engine_is_rejected() {
        let client = VaultClient::new(config()).unwrap();
        let err = client
            .generate_aws_credentials("aws/../../sys", "seal")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // Port 9 (discard) is closed on test machines.
        let config = VaultConfig::new("http://127.0.0.1:9", "s.token").unwrap();
        let client = VaultClient::new(config).unwrap();
        let err = client.list_aws_engines().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("list AWS secret engines"));
    }
}
