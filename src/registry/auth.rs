//! Challenge-driven reauthentication for Docker Registry v2 compatible hosts
//!
//! A registry that wants credentials answers with a 4xx status and a
//! `WWW-Authenticate` header such as
//! `Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:samalba/my-app:pull"`.
//! [`ScopeReauther`] turns that challenge into a token request against the
//! realm and returns a [`RequestWrapper`] carrying the token for the retry.

use crate::error::handlers::{BodyDecoder, NetworkErrorHandler};
use crate::error::{RegistryError, Result};
use crate::registry::transport::{HttpClient, RequestWrapper, StaticAuthorization};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue, WWW_AUTHENTICATE};
use reqwest::{Method, Request, Response, StatusCode, Url};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

static CHALLENGE_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#",*([^"]*)="([^"]*)""#).expect("challenge parameter pattern is valid")
});

/// Parsed `WWW-Authenticate` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub scheme: String,
    pub parameters: BTreeMap<String, String>,
}

impl AuthChallenge {
    /// Parse `<scheme> k1="v1",k2="v2"`. Anything else yields `None`.
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, rest) = header.split_once(' ')?;
        if scheme.is_empty() {
            return None;
        }

        let parameters: BTreeMap<String, String> = CHALLENGE_PARAM
            .captures_iter(rest)
            .map(|caps| (caps[1].trim().to_string(), caps[2].to_string()))
            .collect();

        if parameters.is_empty() {
            return None;
        }

        Some(Self {
            scheme: scheme.to_string(),
            parameters,
        })
    }

    pub fn realm(&self) -> Option<&str> {
        self.parameters
            .get("realm")
            .map(String::as_str)
            .filter(|realm| !realm.is_empty())
    }
}

/// Body of a token endpoint response
#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    issued_at: Option<String>,
}

impl TokenResponse {
    /// First non-empty of `token` and `access_token`
    fn token_to_use(&self) -> &str {
        [&self.token, &self.access_token]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|token| !token.is_empty())
            .unwrap_or_default()
    }
}

/// Optional basic credentials sent to the token endpoint
#[derive(Clone, Default)]
pub struct ScopeReauther {
    username: Option<String>,
    password: Option<String>,
}

impl std::fmt::Debug for ScopeReauther {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeReauther")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ScopeReauther {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        let username = username.into();
        if username.is_empty() {
            return Self::anonymous();
        }
        Self {
            username: Some(username),
            password: Some(password.into()),
        }
    }

    /// Decide whether `response` is worth a second, authenticated attempt.
    ///
    /// Returns `Ok(None)` when the response is not a usable challenge. A
    /// challenge that leads to a failing token exchange is an error.
    pub async fn check_for_reauth(
        &self,
        response: &Response,
        client: &dyn HttpClient,
    ) -> Result<Option<Arc<dyn RequestWrapper>>> {
        if !response.status().is_client_error() {
            return Ok(None);
        }

        let Some(header) = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
        else {
            return Ok(None);
        };

        let Some(challenge) = AuthChallenge::parse(header) else {
            debug!(%header, "ignoring unparseable auth challenge");
            return Ok(None);
        };

        let Some(realm) = challenge.realm() else {
            debug!(%header, "auth challenge has no realm");
            return Ok(None);
        };

        let token = self.exchange(&challenge, realm, client).await?;
        let wrapper = StaticAuthorization::new(&challenge.scheme, &token)?;
        Ok(Some(Arc::new(wrapper)))
    }

    async fn exchange(
        &self,
        challenge: &AuthChallenge,
        realm: &str,
        client: &dyn HttpClient,
    ) -> Result<String> {
        let mut url = Url::parse(realm).map_err(|source| RegistryError::InvalidUrl {
            url: realm.to_string(),
            source,
        })?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &challenge.parameters {
                if key == "realm" || key.is_empty() {
                    continue;
                }
                query.append_pair(key, value);
            }
        }

        let mut request = Request::new(Method::GET, url.clone());
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(username) = &self.username {
            let credentials = format!("{}:{}", username, self.password.as_deref().unwrap_or(""));
            let mut value = HeaderValue::from_str(&format!("Basic {}", STANDARD.encode(credentials)))?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        debug!(%url, authenticated = self.username.is_some(), "requesting token for challenge");

        let response = client.execute(request).await?;
        let status = response.status();
        if status != StatusCode::OK {
            warn!(%realm, %status, "token exchange refused");
            return Err(RegistryError::TokenExchange {
                realm: realm.to_string(),
                status,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(e, url.as_str()))?;
        let token_response: TokenResponse = BodyDecoder::decode(&body, url.as_str())?;

        debug!(
            expires_in = ?token_response.expires_in,
            issued_at = ?token_response.issued_at,
            "token obtained"
        );

        Ok(token_response.token_to_use().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::testing::{MockClient, challenge, respond};

    const DOC_EXAMPLE: &str = r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:samalba/my-app:pull,push""#;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_documented_challenge() {
        let parsed = AuthChallenge::parse(DOC_EXAMPLE).unwrap();
        assert_eq!(parsed.scheme, "Bearer");
        assert_eq!(
            parsed.parameters,
            params(&[
                ("realm", "https://auth.docker.io/token"),
                ("service", "registry.docker.io"),
                ("scope", "repository:samalba/my-app:pull,push"),
            ])
        );
    }

    #[test]
    fn parses_single_parameter_with_other_scheme() {
        let parsed = AuthChallenge::parse(r#"Auth realm="https://auth.docker.io/token""#).unwrap();
        assert_eq!(parsed.scheme, "Auth");
        assert_eq!(parsed.parameters, params(&[("realm", "https://auth.docker.io/token")]));
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let a = AuthChallenge::parse(r#"Bearer service="s",realm="r",scope="x:y""#).unwrap();
        let b = AuthChallenge::parse(r#"Bearer scope="x:y",realm="r",service="s""#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tolerates_spaces_after_commas() {
        let parsed = AuthChallenge::parse(r#"Bearer realm="r", service="s""#).unwrap();
        assert_eq!(parsed.parameters.get("service").map(String::as_str), Some("s"));
    }

    #[test]
    fn malformed_headers_are_not_challenges() {
        assert!(AuthChallenge::parse("Bearer").is_none());
        assert!(AuthChallenge::parse("").is_none());
        assert!(AuthChallenge::parse(" realm=\"r\"").is_none());
        assert!(AuthChallenge::parse("Basic garbage").is_none());
        assert!(AuthChallenge::parse("Bearer realm=\"unterminated").is_none());
    }

    #[test]
    fn token_prefers_token_then_access_token() {
        let both = TokenResponse {
            token: Some("a".into()),
            access_token: Some("b".into()),
            ..Default::default()
        };
        let empty_token = TokenResponse {
            token: Some(String::new()),
            access_token: Some("b".into()),
            ..Default::default()
        };
        assert_eq!(both.token_to_use(), "a");
        assert_eq!(empty_token.token_to_use(), "b");
        assert_eq!(TokenResponse::default().token_to_use(), "");
    }

    #[test]
    fn token_response_reads_expiry_metadata() {
        let parsed: TokenResponse = serde_json::from_str(
            r#"{"token":"t","expires_in":300,"issued_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(parsed.expires_in, Some(300));
        assert_eq!(parsed.issued_at.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(parsed.token_to_use(), "t");
    }

        fn unauthorized(header: &str) -> Response {
        Response::from(challenge(401, header))
    }

    #[tokio::test]
    async fn reauth_exchanges_token_with_credentials() {
        let client = MockClient::new(|_| respond(200, r#"{"token":"abc"}"#));
        let reauther = ScopeReauther::with_credentials("john", "doe");

        let wrapper = reauther
            .check_for_reauth(&unauthorized(DOC_EXAMPLE), &client)
            .await
            .unwrap()
            .expect("challenge should produce a wrapper");

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        let exchange = &requests[0];
        assert_eq!(exchange.url.host_str(), Some("auth.docker.io"));
        assert_eq!(exchange.url.path(), "/token");
        assert_eq!(
            exchange.query("scope").as_deref(),
            Some("repository:samalba/my-app:pull,push")
        );
        assert_eq!(exchange.query("service").as_deref(), Some("registry.docker.io"));
        assert!(exchange.query("realm").is_none());
        let expected = format!("Basic {}", STANDARD.encode("john:doe"));
        assert_eq!(exchange.header("authorization"), Some(expected.as_str()));

        let mut req = Request::new(Method::GET, Url::parse("https://example.com").unwrap());
        wrapper.wrap(&mut req).await.unwrap();
        assert_eq!(req.headers()[AUTHORIZATION], "Bearer abc");
    }

    #[tokio::test]
    async fn anonymous_reauth_sends_no_credentials() {
        let client = MockClient::new(|_| respond(200, r#"{"access_token":"xyz"}"#));
        let wrapper = ScopeReauther::anonymous()
            .check_for_reauth(&unauthorized(DOC_EXAMPLE), &client)
            .await
            .unwrap()
            .unwrap();

        assert!(client.requests()[0].header("authorization").is_none());

        let mut req = Request::new(Method::GET, Url::parse("https://example.com").unwrap());
        wrapper.wrap(&mut req).await.unwrap();
        assert_eq!(req.headers()[AUTHORIZATION], "Bearer xyz");
    }

    #[tokio::test]
    async fn non_client_errors_are_not_eligible() {
        let client = MockClient::new(|_| respond(200, r#"{"token":"abc"}"#));
        let reauther = ScopeReauther::anonymous();

        for status in [200, 302, 500, 503] {
            let response = Response::from(challenge(status, DOC_EXAMPLE));
            let result = reauther.check_for_reauth(&response, &client).await.unwrap();
            assert!(result.is_none(), "status {status} should not reauth");
        }
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn missing_or_bad_challenge_yields_none() {
        let client = MockClient::new(|_| respond(200, r#"{"token":"abc"}"#));
        let reauther = ScopeReauther::anonymous();

        let no_header = Response::from(respond(401, ""));
        assert!(reauther.check_for_reauth(&no_header, &client).await.unwrap().is_none());

        let garbage = unauthorized("Bearer");
        assert!(reauther.check_for_reauth(&garbage, &client).await.unwrap().is_none());

        let no_realm = unauthorized(r#"Bearer service="registry.docker.io""#);
        assert!(reauther.check_for_reauth(&no_realm, &client).await.unwrap().is_none());

        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn failed_exchange_is_an_error() {
        let client = MockClient::new(|_| respond(403, "denied"));
        let err = ScopeReauther::anonymous()
            .check_for_reauth(&unauthorized(DOC_EXAMPLE), &client)
            .await
            .err()
            .expect("exchange should fail");

        match err {
            RegistryError::TokenExchange { realm, status } => {
                assert_eq!(realm, "https://auth.docker.io/token");
                assert_eq!(status, StatusCode::FORBIDDEN);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn undecodable_exchange_body_is_a_decode_error() {
        let client = MockClient::new(|_| respond(200, "<html>"));
        let err = ScopeReauther::anonymous()
            .check_for_reauth(&unauthorized(DOC_EXAMPLE), &client)
            .await
            .err()
            .expect("exchange should fail");
        assert!(matches!(err, RegistryError::Decode { .. }));
    }
}
