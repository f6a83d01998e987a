//! Error types for tag listing operations

pub mod handlers;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Connection, DNS or TLS failure while talking to a registry
    #[error("Network error requesting {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request did not complete in time
    #[error("Timeout requesting {url}: {source}")]
    Timeout {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Registry answered with a status we cannot use
    #[error("Invalid status code {status} from {url} (attempt {attempt})")]
    UnexpectedStatus {
        url: String,
        status: StatusCode,
        attempt: u32,
    },

    /// Response body was not the JSON we expected
    #[error("Unable to decode response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Still refused after using every allowed reauth attempt
    #[error("Past maximum reauth attempts of {max_attempts} for {url}: status {status} on attempt {attempt}")]
    ReauthExhausted {
        url: String,
        status: StatusCode,
        attempt: u32,
        max_attempts: u32,
    },

    /// The token endpoint named by a challenge refused to hand out a token
    #[error("Token exchange with {realm} failed with status {status}")]
    TokenExchange { realm: String, status: StatusCode },

    #[error("Credential exchange returned zero credentials")]
    NoCredentials,

    #[error("Credential source error: {0}")]
    CredentialSource(String),

    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// No configured locator recognised the reference
    #[error("No registry configured for reference '{reference}'")]
    NoMatchingRegistry { reference: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RegistryError {
    /// Status code carried by the error, if it came from an HTTP response
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RegistryError::UnexpectedStatus { status, .. }
            | RegistryError::ReauthExhausted { status, .. }
            | RegistryError::TokenExchange { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RegistryError::Cancelled)
    }
}
