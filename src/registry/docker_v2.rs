//! Tag listing for Docker Registry HTTP API v2 hosts
//!
//! Implements `GET /v2/<name>/tags/list`, used for Docker Hub, GHCR, ECR and
//! any other v2 compatible registry. The endpoint is treated as returning the
//! full tag set in one response.

use crate::error::handlers::{BodyDecoder, NetworkErrorHandler};
use crate::error::{RegistryError, Result};
use crate::registry::Registry;
use crate::registry::auth::ScopeReauther;
use crate::registry::transport::{HttpClient, RequestWrapper};
use crate::tag::{StaticTag, Tag, null_as_default};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Method, Request, Response, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MAX_REAUTH_ATTEMPTS: u32 = 1;

#[derive(Debug, Deserialize)]
struct TagListResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    tags: Vec<String>,
}

/// Generic registry v2 client
#[derive(Clone)]
pub struct DockerV2 {
    base_url: String,
    client: Arc<dyn HttpClient>,
    reauth: Option<ScopeReauther>,
    request_wrapper: Option<Arc<dyn RequestWrapper>>,
    max_reauth_attempts: u32,
    default_namespace: Option<String>,
}

impl DockerV2 {
    pub fn new(base_url: impl Into<String>, client: Arc<dyn HttpClient>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            reauth: None,
            request_wrapper: None,
            max_reauth_attempts: DEFAULT_MAX_REAUTH_ATTEMPTS,
            default_namespace: None,
        }
    }

    /// Answer auth challenges with a token exchange
    pub fn with_reauth(mut self, reauth: ScopeReauther) -> Self {
        self.reauth = Some(reauth);
        self
    }

    /// Wrapper applied to every request, after any challenge-derived one, so its headers win
    pub fn with_request_wrapper(mut self, wrapper: Arc<dyn RequestWrapper>) -> Self {
        self.request_wrapper = Some(wrapper);
        self
    }

    /// Retries allowed after a challenge. Zero keeps the default of one.
    pub fn with_max_reauth_attempts(mut self, attempts: u32) -> Self {
        self.max_reauth_attempts = if attempts == 0 {
            DEFAULT_MAX_REAUTH_ATTEMPTS
        } else {
            attempts
        };
        self
    }

    /// Prefix for single-segment repositories (Docker Hub serves `ubuntu` as `library/ubuntu`)
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = Some(namespace.into());
        self
    }

    fn repository_path(&self, repository: &str) -> String {
        match &self.default_namespace {
            Some(namespace) if !repository.contains('/') => format!("{namespace}/{repository}"),
            _ => repository.to_string(),
        }
    }

    fn tags_url(&self, repository: &str) -> Result<Url> {
        let url = format!("{}/v2/{}/tags/list", self.base_url, self.repository_path(repository));
        Url::parse(&url).map_err(|source| RegistryError::InvalidUrl { url, source })
    }

    async fn send(&self, url: &Url, reauth: Option<&Arc<dyn RequestWrapper>>) -> Result<Response> {
        let mut request = Request::new(Method::GET, url.clone());
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(wrapper) = reauth {
            wrapper.wrap(&mut request).await?;
        }
        if let Some(wrapper) = &self.request_wrapper {
            wrapper.wrap(&mut request).await?;
        }

        self.client.execute(request).await
    }

    async fn decode_tags(url: &Url, response: Response) -> Result<Vec<Tag>> {
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(e, url.as_str()))?;
        let tag_list: TagListResponse = BodyDecoder::decode(&body, url.as_str())?;

        Ok(tag_list
            .tags
            .into_iter()
            .map(|name| StaticTag::new(name).into())
            .collect())
    }
}

#[async_trait]
impl Registry for DockerV2 {
    /// Tags for `repository` (e.g. `library/redis`) in registry order
    async fn list_tags(&self, repository: &str) -> Result<Vec<Tag>> {
        let url = self.tags_url(repository)?;
        let mut reauth: Option<Arc<dyn RequestWrapper>> = None;
        let mut attempt: u32 = 1;

        loop {
            debug!(%url, attempt, authenticated = reauth.is_some(), "listing tags");
            let response = self.send(&url, reauth.as_ref()).await?;
            let status = response.status();

            if status == StatusCode::OK {
                let tags = Self::decode_tags(&url, response).await?;
                debug!(%url, count = tags.len(), "listed tags");
                return Ok(tags);
            }

            let unexpected = || RegistryError::UnexpectedStatus {
                url: url.to_string(),
                status,
                attempt,
            };

            let Some(reauther) = &self.reauth else {
                return Err(unexpected());
            };

            if attempt > self.max_reauth_attempts {
                warn!(%url, %status, max_attempts = self.max_reauth_attempts, "reauth budget exhausted");
                return Err(RegistryError::ReauthExhausted {
                    url: url.to_string(),
                    status,
                    attempt,
                    max_attempts: self.max_reauth_attempts,
                });
            }

            match reauther.check_for_reauth(&response, self.client.as_ref()).await? {
                Some(wrapper) => {
                    debug!(%url, %status, "retrying with challenge credentials");
                    reauth = Some(wrapper);
                    attempt += 1;
                }
                None => return Err(unexpected()),
            }
        }
    }
}
