//! Registry backends
//!
//! Every backend implements [`Registry`]. Authentication is layered onto
//! requests through [`transport::RequestWrapper`]s: static credentials,
//! challenge-driven token exchange ([`auth::ScopeReauther`]) and cached
//! cloud credentials ([`ecr::EcrAuthWrapper`]).

pub mod auth;
pub mod docker_v2;
pub mod ecr;
pub mod quay;
pub mod token_manager;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthChallenge, ScopeReauther};
pub use docker_v2::DockerV2;
pub use ecr::{EcrAuthWrapper, SdkEcrCredentials};
pub use quay::Quay;
pub use token_manager::{CachedCredential, CredentialSource, TokenManager};
pub use transport::{ChainedWrapper, HttpClient, RequestWrapper, StaticAuthorization};

use crate::error::{RegistryError, Result};
use crate::tag::Tag;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Lists the tags of one repository
#[async_trait]
pub trait Registry: Send + Sync {
    async fn list_tags(&self, repository: &str) -> Result<Vec<Tag>>;

    /// Like [`Registry::list_tags`], abandoning in-flight requests once `cancel` fires
    async fn list_tags_cancellable(
        &self,
        repository: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Tag>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RegistryError::Cancelled),
            result = self.list_tags(repository) => result,
        }
    }
}
