//! Container Tags Library
//!
//! Lists image tags from container registries given a reference as typed for
//! `docker pull`: `ghcr.io/org/app`, `quay.io/org/app`, an ECR repository, or a
//! plain Docker Hub name such as `ubuntu`. [`RegistryFinder`] routes each
//! reference to the backend that owns it.

pub mod cli;
pub mod config;
pub mod error;
pub mod finder;
pub mod locator;
pub mod registry;
pub mod tag;

pub use config::FinderConfig;
pub use error::{RegistryError, Result};
pub use finder::{FinderOptions, RegistryFinder, RegistryWithLocator};
pub use locator::{DockerHubLocator, MultiUrlHostMatcher, RepositoryLocator};
pub use registry::Registry;
pub use tag::{QuayTag, StaticTag, Tag};
