//! Credentials and endpoints for the default finder
//!
//! Settings come from an optional JSON file, then environment variables
//! override individual fields:
//!
//! | variable | field |
//! |---|---|
//! | `GHCR_USERNAME` / `GHCR_PASSWORD` | `ghcr` |
//! | `DOCKERHUB_USERNAME` / `DOCKERHUB_PASSWORD` | `dockerhub` |
//! | `QUAY_TOKEN` | `quay.token` |
//! | `ECR_BASE_URL`, `AWS_REGION`, `AWS_PROFILE` | `ecr` |
//!
//! A username of `-` is treated as anonymous access.

use crate::error::{RegistryError, Result};
use crate::finder::{FinderOptions, RegistryFinder, RegistryWithLocator};
use crate::locator::MultiUrlHostMatcher;
use crate::registry::ecr::SdkEcrCredentials;
use crate::registry::quay::Quay;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Environment variable naming the config file when `--config` is not given
pub const CONFIG_ENV: &str = "CONTAINER_TAGS_CONFIG";

const ANONYMOUS_USERNAME: &str = "-";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl BasicCredentials {
    /// Username and password to hand to the token endpoint; empty means anonymous
    fn resolve(&self) -> (&str, &str) {
        if self.username.is_empty() || self.username == ANONYMOUS_USERNAME {
            ("", "")
        } else {
            (&self.username, &self.password)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuayConfig {
    #[serde(default, skip_serializing)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_page_size: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcrConfig {
    /// e.g. `https://123456789012.dkr.ecr.us-west-2.amazonaws.com`
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_buffer_secs: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinderConfig {
    #[serde(default)]
    pub ghcr: BasicCredentials,
    #[serde(default)]
    pub dockerhub: BasicCredentials,
    #[serde(default)]
    pub quay: QuayConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecr: Option<EcrConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl FinderConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RegistryError::Config(format!("invalid config: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::Config(format!("failed to read {}: {e}", path.display())))?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_json(&contents)
    }

    /// File (if any) overlaid with the process environment
    pub fn from_env(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(Into::into));
        let mut config = match config_path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override fields from `lookup`; unset and empty variables are ignored
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("GHCR_USERNAME") {
            self.ghcr.username = v;
        }
        if let Some(v) = get("GHCR_PASSWORD") {
            self.ghcr.password = v;
        }
        if let Some(v) = get("DOCKERHUB_USERNAME") {
            self.dockerhub.username = v;
        }
        if let Some(v) = get("DOCKERHUB_PASSWORD") {
            self.dockerhub.password = v;
        }
        if let Some(v) = get("QUAY_TOKEN") {
            self.quay.token = v;
        }
        if let Some(base_url) = get("ECR_BASE_URL") {
            self.ecr.get_or_insert_with(EcrConfig::default).base_url = base_url;
        }
        if let Some(ecr) = self.ecr.as_mut() {
            if let Some(region) = get("AWS_REGION") {
                ecr.region = Some(region);
            }
            if let Some(profile) = get("AWS_PROFILE") {
                ecr.profile = Some(profile);
            }
        }
    }

    /// GHCR, Quay, ECR when configured, then Docker Hub as the catch-all
    pub fn build_finder(&self, options: &FinderOptions) -> Result<RegistryFinder> {
        let mut finder = RegistryFinder::default();

        let (username, password) = self.ghcr.resolve();
        finder.push(RegistryFinder::for_ghcr(username, password, options));

        if self.quay.base_url.is_some() || self.quay.max_page_size.is_some() {
            finder.push(self.custom_quay(options));
        } else {
            finder.push(RegistryFinder::for_quay(&self.quay.token, options));
        }

        if let Some(ecr) = &self.ecr {
            if ecr.base_url.is_empty() {
                return Err(RegistryError::Config("ecr.base_url must be set".to_string()));
            }
            let source = SdkEcrCredentials::new()
                .with_region(ecr.region.clone())
                .with_profile(ecr.profile.clone());
            let buffer = ecr.auth_buffer_secs.map(chrono::Duration::seconds);
            finder.push(RegistryFinder::for_ecr(Arc::new(source), &ecr.base_url, buffer, options));
        }

        let (username, password) = self.dockerhub.resolve();
        finder.push(RegistryFinder::for_dockerhub(username, password, options));

        debug!(backends = finder.len(), "built registry finder");
        Ok(finder)
    }

    fn custom_quay(&self, options: &FinderOptions) -> RegistryWithLocator {
        let mut quay = Quay::new(options.client.clone()).with_token(&self.quay.token);
        if let Some(base_url) = &self.quay.base_url {
            quay = quay.with_base_url(base_url);
        }
        if let Some(size) = self.quay.max_page_size {
            quay = quay.with_max_page_size(size);
        }
        RegistryWithLocator::new(quay, MultiUrlHostMatcher::for_domains(["quay.io"]))
    }
}
