//! Standardized mapping from transport and decode failures to registry errors

use crate::error::RegistryError;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Categorize a transport failure, keeping the URL for context
    pub fn handle_network_error(error: reqwest::Error, url: &str) -> RegistryError {
        debug!(%url, error = %error, "transport failure");

        if error.is_timeout() {
            RegistryError::Timeout {
                url: url.to_string(),
                source: error,
            }
        } else {
            RegistryError::Network {
                url: url.to_string(),
                source: error,
            }
        }
    }
}

/// Decoding helper shared by every backend
pub struct BodyDecoder;

impl BodyDecoder {
    pub fn decode<T: DeserializeOwned>(body: &[u8], url: &str) -> Result<T, RegistryError> {
        serde_json::from_slice(body).map_err(|source| RegistryError::Decode {
            url: url.to_string(),
            source,
        })
    }
}
