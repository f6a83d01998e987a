//! Transport seam shared by every registry backend
//!
//! Backends never talk to reqwest directly. They build a [`reqwest::Request`],
//! let any configured [`RequestWrapper`]s decorate it, and hand it to an
//! [`HttpClient`]. This keeps the wire format testable with in-memory clients
//! and lets callers bring their own configured `reqwest::Client`.

use crate::error::Result;
use crate::error::handlers::NetworkErrorHandler;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Request, Response};
use std::sync::Arc;

/// Executes a fully built HTTP request
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl HttpClient for reqwest::Client {
    async fn execute(&self, request: Request) -> Result<Response> {
        let url = request.url().to_string();
        reqwest::Client::execute(self, request)
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(e, &url))
    }
}

/// Mutates an outgoing request, usually to attach credentials
#[async_trait]
pub trait RequestWrapper: Send + Sync {
    async fn wrap(&self, request: &mut Request) -> Result<()>;
}

/// Sets `Authorization: <scheme> <token>` on every request it wraps
#[derive(Clone)]
pub struct StaticAuthorization {
    value: HeaderValue,
}

impl StaticAuthorization {
    pub fn new(scheme: &str, token: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(&format!("{} {}", scheme, token))?;
        value.set_sensitive(true);
        Ok(Self { value })
    }

    pub fn bearer(token: &str) -> Result<Self> {
        Self::new("Bearer", token)
    }

    pub fn basic(token: &str) -> Result<Self> {
        Self::new("Basic", token)
    }
}

impl std::fmt::Debug for StaticAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticAuthorization").finish_non_exhaustive()
    }
}

#[async_trait]
impl RequestWrapper for StaticAuthorization {
    async fn wrap(&self, request: &mut Request) -> Result<()> {
        request
            .headers_mut()
            .insert(AUTHORIZATION, self.value.clone());
        Ok(())
    }
}

/// Applies several wrappers in order; later wrappers win on conflicting headers
#[derive(Default, Clone)]
pub struct ChainedWrapper {
    wrappers: Vec<Arc<dyn RequestWrapper>>,
}

impl ChainedWrapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, wrapper: Arc<dyn RequestWrapper>) -> Self {
        self.wrappers.push(wrapper);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }
}

#[async_trait]
impl RequestWrapper for ChainedWrapper {
    async fn wrap(&self, request: &mut Request) -> Result<()> {
        for wrapper in &self.wrappers {
            wrapper.wrap(request).await?;
        }
        Ok(())
    }
}
