//! Mapping image references to the repository path a backend understands
//!
//! A locator answers "is this reference mine, and if so what repository
//! should I ask for?". `ghcr.io/org/app` belongs to GHCR as `org/app`; an
//! empty answer means the reference belongs to some other backend.

use regex::Regex;

pub trait RepositoryLocator: Send + Sync {
    /// Repository path for `reference`, or an empty string if it is not handled here
    fn repository_for_url(&self, reference: &str) -> String;
}

impl<F> RepositoryLocator for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn repository_for_url(&self, reference: &str) -> String {
        self(reference)
    }
}

/// Matches the host part of a reference against exact domains, substrings and patterns
#[derive(Debug, Clone, Default)]
pub struct MultiUrlHostMatcher {
    pub valid_domains: Vec<String>,
    pub valid_domain_substrings: Vec<String>,
    pub valid_regexes: Vec<Regex>,
    /// Return the reference untouched instead of stripping the host
    pub return_full_repo: bool,
}

impl MultiUrlHostMatcher {
    pub fn for_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            valid_domains: domains.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn for_regex(regex: Regex) -> Self {
        Self {
            valid_regexes: vec![regex],
            ..Default::default()
        }
    }

    fn matches(&self, host: &str) -> bool {
        self.valid_domains.iter().any(|d| d == host)
            || self
                .valid_domain_substrings
                .iter()
                .any(|s| host.contains(s.as_str()))
            || self.valid_regexes.iter().any(|r| r.is_match(host))
    }
}

impl RepositoryLocator for MultiUrlHostMatcher {
    fn repository_for_url(&self, reference: &str) -> String {
        let Some((host, repository)) = reference.split_once('/') else {
            return String::new();
        };
        if !self.matches(host) {
            return String::new();
        }
        if self.return_full_repo {
            reference.to_string()
        } else {
            repository.to_string()
        }
    }
}

/// Docker Hub owns every reference whose first segment is not a hostname.
///
/// `docker pull cresta/app` goes to Docker Hub while `ghcr.io/a/b` does not.
/// References that do start with a host fall through to the inner matcher.
#[derive(Debug, Clone, Default)]
pub struct DockerHubLocator {
    pub matcher: MultiUrlHostMatcher,
}

impl DockerHubLocator {
    pub fn new(matcher: MultiUrlHostMatcher) -> Self {
        Self { matcher }
    }
}

impl RepositoryLocator for DockerHubLocator {
    fn repository_for_url(&self, reference: &str) -> String {
        let first = reference.split('/').next().unwrap_or_default();
        if !first.contains('.') {
            return reference.to_string();
        }
        self.matcher.repository_for_url(reference)
    }
}
