use std::path::PathBuf;

use reqwest::StatusCode;

use crate::aws::AwsCredentials;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification of [`Error`], stable across variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Transport,
    Auth,
    Decode,
    Io,
    CredentialFormation,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Configuration(String),

    #[error("{operation}: request to Vault failed")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation}: Vault returned {status}{}", format_messages(.messages))]
    Status {
        operation: String,
        status: StatusCode,
        messages: Vec<String>,
    },

    #[error("{operation}: Vault denied the request ({status}){}", format_messages(.messages))]
    Auth {
        operation: String,
        status: StatusCode,
        messages: Vec<String>,
    },

    #[error("{operation}: unexpected value at '{path}': {reason}")]
    Decode {
        operation: String,
        path: String,
        reason: String,
    },

    #[error("Failed to parse state file {}", .path.display())]
    StateParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{action} {}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Credentials for role '{role}' on engine '{engine}' are unusable: {reason}")]
    CredentialFormation {
        engine: String,
        role: String,
        reason: String,
        partial: Box<AwsCredentials>,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Transport { .. } | Self::Status { .. } => ErrorKind::Transport,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Decode { .. } | Self::StateParse { .. } => ErrorKind::Decode,
            Self::Io { .. } => ErrorKind::Io,
            Self::CredentialFormation { .. } => ErrorKind::CredentialFormation,
        }
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

fn format_messages(messages: &[String]) -> String {
    if messages.is_empty() {
        String::new()
    } else {
        format!(": {}", messages.join("; "))
    }
}
