//! Cached, lazily refreshed credentials for expensive token exchanges
//!
//! Some registries (ECR in particular) hand out short-lived credentials via a
//! cloud API call that is too slow to make per request. [`TokenManager`]
//! keeps the most recent credential and refreshes it once it is within the
//! configured buffer of its expiry.

use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// How long before expiry a cached credential is considered stale
pub const DEFAULT_AUTH_BUFFER_SECS: i64 = 60;

/// A credential and the moment it stops being valid
#[derive(Clone, PartialEq, Eq)]
pub struct CachedCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for CachedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedCredential")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl CachedCredential {
    /// Still usable if it expires strictly later than `now + buffer`
    pub fn is_fresh(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.expires_at > now + buffer
    }
}

/// The external exchange that mints new credentials
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch_credentials(&self) -> Result<Vec<CachedCredential>>;
}

/// Thread-safe credential cache. Refreshes are serialized per instance.
#[derive(Clone)]
pub struct TokenManager {
    source: Arc<dyn CredentialSource>,
    buffer: Duration,
    cached: Arc<Mutex<Option<CachedCredential>>>,
}

impl TokenManager {
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            buffer: Duration::seconds(DEFAULT_AUTH_BUFFER_SECS),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Refresh credentials this long before they expire. Zero keeps the default.
    pub fn with_buffer(mut self, buffer: Duration) -> Self {
        if buffer > Duration::zero() {
            self.buffer = buffer;
        }
        self
    }

    pub fn buffer(&self) -> Duration {
        self.buffer
    }

    /// Current token, fetching a new one if the cached one is missing or stale.
    ///
    /// The lock is held across the fetch so concurrent callers racing a stale
    /// cache wait for the one exchange already in flight.
    pub async fn fetch_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref() {
            if credential.is_fresh(Utc::now(), self.buffer) {
                trace!(expires_at = %credential.expires_at, "using cached credential");
                return Ok(credential.token.clone());
            }
        }

        debug!("fetching new credential");
        let credential = self
            .source
            .fetch_credentials()
            .await?
            .into_iter()
            .next()
            .ok_or(RegistryError::NoCredentials)?;

        debug!(expires_at = %credential.expires_at, "credential refreshed");
        let token = credential.token.clone();
        *cached = Some(credential);
        Ok(token)
    }

    /// Drop the cached credential so the next call refreshes
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        lifetime: Duration,
    }

    impl CountingSource {
        fn new(lifetime: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                lifetime,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        async fn fetch_credentials(&self) -> Result<Vec<CachedCredential>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::task::yield_now().await;
            Ok(vec![CachedCredential {
                token: format!("token-{n}"),
                expires_at: Utc::now() + self.lifetime,
            }])
        }
    }

    struct EmptySource;

    #[async_trait]
    impl CredentialSource for EmptySource {
        async fn fetch_credentials(&self) -> Result<Vec<CachedCredential>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn reuses_token_within_buffer_window() {
        let source = CountingSource::new(Duration::minutes(10));
        let manager = TokenManager::new(source.clone());

        assert_eq!(manager.fetch_token().await.unwrap(), "token-1");
        assert_eq!(manager.fetch_token().await.unwrap(), "token-1");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn refreshes_once_inside_buffer() {
        // Lifetime shorter than the buffer: every fetch sees a stale credential.
        let source = CountingSource::new(Duration::seconds(30));
        let manager = TokenManager::new(source.clone());

        assert_eq!(manager.fetch_token().await.unwrap(), "token-1");
        assert_eq!(source.calls(), 1);
        assert_eq!(manager.fetch_token().await.unwrap(), "token-2");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn custom_buffer_changes_freshness() {
        let source = CountingSource::new(Duration::minutes(10));
        let manager = TokenManager::new(source.clone()).with_buffer(Duration::minutes(15));

        manager.fetch_token().await.unwrap();
        manager.fetch_token().await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(manager.buffer(), Duration::minutes(15));
    }

    #[tokio::test]
    async fn zero_buffer_keeps_default() {
        let manager = TokenManager::new(CountingSource::new(Duration::minutes(10)))
            .with_buffer(Duration::zero());
        assert_eq!(manager.buffer(), Duration::seconds(DEFAULT_AUTH_BUFFER_SECS));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_exchange() {
        let source = CountingSource::new(Duration::minutes(10));
        let manager = TokenManager::new(source.clone());

        let tokens = futures::future::join_all((0..8).map(|_| {
            let manager = manager.clone();
            async move { manager.fetch_token().await.unwrap() }
        }))
        .await;

        assert!(tokens.iter().all(|t| t == "token-1"));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn zero_credentials_is_an_error() {
        let manager = TokenManager::new(Arc::new(EmptySource));
        let err = manager.fetch_token().await.unwrap_err();
        assert!(matches!(err, RegistryError::NoCredentials));
    }

    #[tokio::test]
    async fn invalidate_forces_refresh() {
        let source = CountingSource::new(Duration::minutes(10));
        let manager = TokenManager::new(source.clone());

        manager.fetch_token().await.unwrap();
        manager.invalidate().await;
        assert_eq!(manager.fetch_token().await.unwrap(), "token-2");
    }
}
