//! In-memory HTTP client for backend tests

use crate::error::Result;
use crate::registry::transport::HttpClient;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Request, Response, Url};
use std::sync::Mutex;

/// What a mock saw of one outgoing request
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub url: Url,
    pub headers: HeaderMap,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn query(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

type Responder = dyn Fn(&RecordedRequest) -> http::Response<String> + Send + Sync;

pub(crate) struct MockClient {
    responder: Box<Responder>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> http::Response<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockClient {
    async fn execute(&self, request: Request) -> Result<Response> {
        let recorded = RecordedRequest {
            url: request.url().clone(),
            headers: request.headers().clone(),
        };
        let response = (self.responder)(&recorded);
        self.requests.lock().unwrap().push(recorded);
        Ok(Response::from(response))
    }
}

pub(crate) fn respond(status: u16, body: &str) -> http::Response<String> {
    http::Response::builder()
        .status(status)
        .body(body.to_string())
        .unwrap()
}

pub(crate) fn challenge(status: u16, www_authenticate: &str) -> http::Response<String> {
    http::Response::builder()
        .status(status)
        .header("www-authenticate", www_authenticate)
        .body(String::new())
        .unwrap()
}
