//! The single-call HTTP primitive the transport adapter is built on.
//!
//! `Fetch` has the shape of the browser `fetch` function: a URL plus an
//! options bag in, a response with status, headers and deferred body readers
//! out. `ReqwestFetch` is the production implementation; tests substitute
//! scripted ones.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, CONTENT_TYPE};
use thiserror::Error;

use crate::descriptor::HttpMethod;

/// Options bag passed alongside the URL.
#[derive(Debug, Clone, Default)]
pub struct FetchInit {
    pub method: HttpMethod,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Raw response returned by a `Fetch` implementation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    status: u16,
    status_text: String,
    headers: HeaderMap,
    body: Bytes,
}

impl FetchResponse {
    /// Build a response whose status text is the canonical reason phrase.
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let status_text = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_string();
        Self {
            status,
            status_text,
            headers,
            body: body.into(),
        }
    }

    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Read the body as UTF-8 text. Invalid sequences are replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Read the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// What went wrong inside the primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The connection could not be established (refused, DNS, TLS).
    Connect,
    /// The connection failed while sending the request or awaiting the reply.
    Send,
    /// The response body could not be read to the end.
    Body,
    /// The call was aborted before completing.
    Aborted,
    /// The request could not be built, so nothing was sent.
    InvalidRequest,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FetchErrorKind::Connect => "connect",
            FetchErrorKind::Send => "send",
            FetchErrorKind::Body => "body read",
            FetchErrorKind::Aborted => "fetch (aborted)",
            FetchErrorKind::InvalidRequest => "request build",
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind} failed: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Connect, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::InvalidRequest, message)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_builder() {
            FetchErrorKind::InvalidRequest
        } else if err.is_connect() {
            FetchErrorKind::Connect
        } else if err.is_timeout() {
            FetchErrorKind::Aborted
        } else if err.is_body() || err.is_decode() {
            FetchErrorKind::Body
        } else {
            FetchErrorKind::Send
        };
        Self::new(kind, err.to_string())
    }
}

/// A `fetch`-shaped HTTP primitive.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, init: FetchInit) -> Result<FetchResponse, FetchError>;
}

/// `Fetch` over a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for ReqwestFetch {
    async fn fetch(&self, url: &str, init: FetchInit) -> Result<FetchResponse, FetchError> {
        let mut builder = self
            .client
            .request(init.method.into(), url)
            .headers(init.headers);
        if let Some(body) = init.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(FetchResponse::new(status.as_u16(), headers, body))
    }
}
