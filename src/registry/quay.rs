//! Quay tag listing
//!
//! Quay exposes richer tag metadata through its own REST API, which pages
//! results instead of returning them in one response.

use crate::error::handlers::{BodyDecoder, NetworkErrorHandler};
use crate::error::{RegistryError, Result};
use crate::registry::Registry;
use crate::registry::transport::{HttpClient, RequestWrapper, StaticAuthorization};
use crate::tag::{QuayTag, Tag, null_as_default};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Method, Request, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_QUAY_URL: &str = "https://quay.io";
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct TagPage {
    #[serde(default)]
    has_additional: bool,
    #[serde(default)]
    page: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    tags: Vec<QuayTag>,
}

#[derive(Clone)]
pub struct Quay {
    token: Option<String>,
    base_url: String,
    max_page_size: u32,
    client: Arc<dyn HttpClient>,
}

impl Quay {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            token: None,
            base_url: DEFAULT_QUAY_URL.to_string(),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            client,
        }
    }

    /// Bearer token for private repositories. Empty means anonymous.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Tags requested per page. Zero keeps the default.
    pub fn with_max_page_size(mut self, size: u32) -> Self {
        if size > 0 {
            self.max_page_size = size;
        }
        self
    }

    fn page_url(&self, repository: &str, page: u32) -> Result<Url> {
        // Quay rejects the path without the trailing slash
        let url = format!("{}/api/v1/repository/{}/tag/", self.base_url, repository);
        let mut url = Url::parse(&url).map_err(|source| RegistryError::InvalidUrl { url, source })?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("onlyActiveTags", "true")
            .append_pair("limit", &self.max_page_size.to_string());
        Ok(url)
    }

    async fn fetch_page(&self, repository: &str, page: u32) -> Result<TagPage> {
        let url = self.page_url(repository, page)?;
        let mut request = Request::new(Method::GET, url.clone());
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.token {
            StaticAuthorization::bearer(token)?.wrap(&mut request).await?;
        }

        debug!(%url, page, "fetching quay tag page");
        let response = self.client.execute(request).await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(RegistryError::UnexpectedStatus {
                url: url.to_string(),
                status,
                attempt: 1,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(e, url.as_str()))?;
        BodyDecoder::decode(&body, url.as_str())
    }
}

#[async_trait]
impl Registry for Quay {
    async fn list_tags(&self, repository: &str) -> Result<Vec<Tag>> {
        let mut tags = Vec::new();
        let mut page = 0;

        loop {
            let result = self.fetch_page(repository, page).await?;
            debug!(
                requested = page,
                returned = result.page,
                count = result.tags.len(),
                more = result.has_additional,
                "received quay tag page"
            );
            tags.extend(result.tags.into_iter().map(Tag::from));
            if !result.has_additional {
                break;
            }
            page += 1;
        }

        debug!(repository, pages = page + 1, count = tags.len(), "listed quay tags");
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::testing::{MockClient, respond};

    fn quay(client: &Arc<MockClient>) -> Quay {
        Quay::new(client.clone()).with_base_url("http://quay.test")
    }

    #[tokio::test]
    async fn accumulates_pages_in_request_order() {
        let client = Arc::new(MockClient::new(|req| match req.query("page").as_deref() {
            Some("0") => respond(
                200,
                r#"{"has_additional":true,"page":0,"tags":[{"name":"v3","size":30},{"name":"v2"}]}"#,
            ),
            _ => respond(
                200,
                r#"{"has_additional":false,"page":1,"tags":[{"name":"v1","is_manifest_list":true}]}"#,
            ),
        }));

        let tags = quay(&client).list_tags("org/app").await.unwrap();

        let names: Vec<&str> = tags.iter().map(Tag::name).collect();
        assert_eq!(names, ["v3", "v2", "v1"]);
        assert_eq!(tags[0].as_quay().map(|t| t.size), Some(30));
        assert_eq!(tags[2].as_quay().map(|t| t.is_manifest_list), Some(true));

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].query("page").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn sends_paging_parameters_and_token() {
        let client = Arc::new(MockClient::new(|_| {
            respond(200, r#"{"has_additional":false,"page":0,"tags":[]}"#)
        }));

        let tags = quay(&client)
            .with_token("secret")
            .with_max_page_size(25)
            .list_tags("org/app")
            .await
            .unwrap();
        assert!(tags.is_empty());

        let request = &client.requests()[0];
        assert_eq!(request.url.path(), "/api/v1/repository/org/app/tag/");
        assert_eq!(request.query("page").as_deref(), Some("0"));
        assert_eq!(request.query("onlyActiveTags").as_deref(), Some("true"));
        assert_eq!(request.query("limit").as_deref(), Some("25"));
        assert_eq!(request.header("authorization"), Some("Bearer secret"));
    }

    #[tokio::test]
    async fn anonymous_requests_have_no_authorization() {
        let client = Arc::new(MockClient::new(|_| {
            respond(200, r#"{"has_additional":false,"page":0,"tags":null}"#)
        }));

        quay(&client).with_token("").list_tags("org/app").await.unwrap();

        let request = &client.requests()[0];
        assert_eq!(request.header("authorization"), None);
        assert_eq!(request.query("limit").as_deref(), Some("100"));
    }

    #[tokio::test]
    async fn failing_page_discards_earlier_results() {
        let client = Arc::new(MockClient::new(|req| match req.query("page").as_deref() {
            Some("0") => respond(200, r#"{"has_additional":true,"page":0,"tags":[{"name":"a"}]}"#),
            _ => respond(404, ""),
        }));

        let err = quay(&client).list_tags("org/app").await.unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn undecodable_page_is_a_decode_error() {
        let client = Arc::new(MockClient::new(|_| respond(200, "<html>")));
        let err = quay(&client).list_tags("org/app").await.unwrap_err();
        assert!(matches!(err, RegistryError::Decode { .. }));
    }
}
