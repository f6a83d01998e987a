//! Amazon ECR authentication
//!
//! ECR does not issue registry challenges that a plain token exchange can
//! answer. Instead an IAM-authenticated `GetAuthorizationToken` call returns a
//! base64 `user:password` blob, sent as HTTP Basic credentials, valid for
//! twelve hours.

use crate::error::{RegistryError, Result};
use crate::registry::token_manager::{CachedCredential, CredentialSource, TokenManager};
use crate::registry::transport::{RequestWrapper, StaticAuthorization};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ecr as ecr;
use aws_sdk_ecr::config::Region;
use aws_sdk_ecr::error::DisplayErrorContext;
use aws_sdk_ecr::operation::get_authorization_token::GetAuthorizationTokenOutput;
use chrono::DateTime;
use reqwest::Request;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Wraps requests with a cached ECR authorization token
#[derive(Clone)]
pub struct EcrAuthWrapper {
    tokens: TokenManager,
}

impl EcrAuthWrapper {
    pub fn new(tokens: TokenManager) -> Self {
        Self { tokens }
    }

    pub fn from_source(source: Arc<dyn CredentialSource>) -> Self {
        Self::new(TokenManager::new(source))
    }

    /// Fetch (or reuse) the token without wrapping a request, useful to verify access up front
    pub async fn fetch_token(&self) -> Result<String> {
        self.tokens.fetch_token().await
    }
}

#[async_trait]
impl RequestWrapper for EcrAuthWrapper {
    async fn wrap(&self, request: &mut Request) -> Result<()> {
        let token = self.tokens.fetch_token().await?;
        StaticAuthorization::basic(&token)?.wrap(request).await
    }
}

/// Fetches ECR tokens through the AWS SDK.
///
/// Credentials resolve through the SDK's default chain (environment, shared
/// profile, instance role). The client is built on first use.
#[derive(Debug, Default)]
pub struct SdkEcrCredentials {
    region: Option<String>,
    profile: Option<String>,
    client: OnceCell<ecr::Client>,
}

impl SdkEcrCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an already configured client instead of loading one from the environment
    pub fn from_client(client: ecr::Client) -> Self {
        Self {
            client: OnceCell::new_with(Some(client)),
            ..Self::default()
        }
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    async fn client(&self) -> &ecr::Client {
        self.client
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if let Some(region) = &self.region {
                    loader = loader.region(Region::new(region.clone()));
                }
                if let Some(profile) = &self.profile {
                    loader = loader.profile_name(profile);
                }
                debug!(region = ?self.region, profile = ?self.profile, "loading AWS configuration");
                ecr::Client::new(&loader.load().await)
            })
            .await
    }
}

#[async_trait]
impl CredentialSource for SdkEcrCredentials {
    async fn fetch_credentials(&self) -> Result<Vec<CachedCredential>> {
        debug!("requesting ECR authorization token");
        let output = self
            .client()
            .await
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| RegistryError::CredentialSource(DisplayErrorContext(e).to_string()))?;

        credentials_from_output(&output)
    }
}

fn credentials_from_output(output: &GetAuthorizationTokenOutput) -> Result<Vec<CachedCredential>> {
    let data = output.authorization_data();
    if data.is_empty() {
        return Err(RegistryError::NoCredentials);
    }

    data.iter()
        .map(|entry| {
            let token = entry.authorization_token().ok_or_else(|| {
                RegistryError::CredentialSource("authorization data without a token".to_string())
            })?;
            let expires_at = entry
                .expires_at()
                .and_then(|at| DateTime::from_timestamp(at.secs(), at.subsec_nanos()))
                .ok_or_else(|| {
                    RegistryError::CredentialSource("authorization data without a valid expiry".to_string())
                })?;
            Ok(CachedCredential {
                token: token.to_string(),
                expires_at,
            })
        })
        .collect()
}
