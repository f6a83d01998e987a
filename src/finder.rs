//! Routing image references to the backend that owns them

use crate::error::{RegistryError, Result};
use crate::locator::{DockerHubLocator, MultiUrlHostMatcher, RepositoryLocator};
use crate::registry::auth::ScopeReauther;
use crate::registry::docker_v2::DockerV2;
use crate::registry::ecr::EcrAuthWrapper;
use crate::registry::quay::Quay;
use crate::registry::token_manager::{CredentialSource, TokenManager};
use crate::registry::transport::HttpClient;
use crate::registry::Registry;
use crate::tag::Tag;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

pub const GHCR_URL: &str = "https://ghcr.io";
pub const DOCKERHUB_URL: &str = "https://registry-1.docker.io";
pub const DOCKERHUB_NAMESPACE: &str = "library";

static ECR_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"dkr\.ecr\..*\.amazonaws\.com").expect("ECR host pattern is valid"));

/// A backend and the locator deciding which references it serves
#[derive(Clone)]
pub struct RegistryWithLocator {
    pub registry: Arc<dyn Registry>,
    pub locator: Arc<dyn RepositoryLocator>,
}

impl RegistryWithLocator {
    pub fn new(registry: impl Registry + 'static, locator: impl RepositoryLocator + 'static) -> Self {
        Self {
            registry: Arc::new(registry),
            locator: Arc::new(locator),
        }
    }
}

/// Shared settings for the backend factories
#[derive(Clone)]
pub struct FinderOptions {
    pub client: Arc<dyn HttpClient>,
}

impl Default for FinderOptions {
    fn default() -> Self {
        Self {
            client: Arc::new(reqwest::Client::new()),
        }
    }
}

impl FinderOptions {
    pub fn with_client(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

/// Ordered list of backends. The first locator to claim a reference wins.
#[derive(Clone, Default)]
pub struct RegistryFinder {
    registries: Vec<RegistryWithLocator>,
}

impl RegistryFinder {
    pub fn new(registries: Vec<RegistryWithLocator>) -> Self {
        Self { registries }
    }

    pub fn push(&mut self, registry: RegistryWithLocator) {
        self.registries.push(registry);
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    /// GHCR, authenticating through its token endpoint with the given credentials
    pub fn for_ghcr(username: &str, password: &str, options: &FinderOptions) -> RegistryWithLocator {
        RegistryWithLocator::new(
            DockerV2::new(GHCR_URL, options.client.clone())
                .with_reauth(ScopeReauther::with_credentials(username, password)),
            MultiUrlHostMatcher::for_domains(["ghcr.io"]),
        )
    }

    /// Docker Hub, claiming every reference without a host
    pub fn for_dockerhub(username: &str, password: &str, options: &FinderOptions) -> RegistryWithLocator {
        RegistryWithLocator::new(
            DockerV2::new(DOCKERHUB_URL, options.client.clone())
                .with_reauth(ScopeReauther::with_credentials(username, password))
                .with_default_namespace(DOCKERHUB_NAMESPACE),
            DockerHubLocator::new(MultiUrlHostMatcher::for_domains(["docker.io"])),
        )
    }

    pub fn for_quay(token: &str, options: &FinderOptions) -> RegistryWithLocator {
        RegistryWithLocator::new(
            Quay::new(options.client.clone()).with_token(token),
            MultiUrlHostMatcher::for_domains(["quay.io"]),
        )
    }

    /// ECR at `base_url`, authenticated with cached credentials from `source`
    pub fn for_ecr(
        source: Arc<dyn CredentialSource>,
        base_url: &str,
        auth_buffer: Option<chrono::Duration>,
        options: &FinderOptions,
    ) -> RegistryWithLocator {
        let mut tokens = TokenManager::new(source);
        if let Some(buffer) = auth_buffer {
            tokens = tokens.with_buffer(buffer);
        }
        RegistryWithLocator::new(
            DockerV2::new(base_url, options.client.clone())
                .with_request_wrapper(Arc::new(EcrAuthWrapper::new(tokens))),
            MultiUrlHostMatcher::for_regex(ECR_HOST.clone()),
        )
    }

    /// Backend and repository path for `reference`
    pub fn locate(&self, reference: &str) -> Option<(&Arc<dyn Registry>, String)> {
        self.registries.iter().find_map(|entry| {
            let repository = entry.locator.repository_for_url(reference);
            (!repository.is_empty()).then_some((&entry.registry, repository))
        })
    }
}

#[async_trait]
impl Registry for RegistryFinder {
    /// Tags for a reference as typed for `docker pull`, e.g. `ghcr.io/org/app` or `ubuntu`
    async fn list_tags(&self, reference: &str) -> Result<Vec<Tag>> {
        let Some((registry, repository)) = self.locate(reference) else {
            return Err(RegistryError::NoMatchingRegistry {
                reference: reference.to_string(),
            });
        };
        debug!(reference, %repository, "resolved reference");
        registry.list_tags(&repository).await
    }
}
