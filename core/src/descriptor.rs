//! Request and response descriptors.
//!
//! # Design
//! These types describe HTTP calls as plain, transport-agnostic data.
//! Interceptors receive a `RequestDescriptor` by value and hand back a
//! (possibly modified) one; once the client dispatches it, the transport only
//! ever sees a shared reference, so nothing can change it after dispatch.
//!
//! Headers use `http::HeaderMap`, which gives case-insensitive names.
//! Query parameters are a `Vec` so the encoded order follows insertion order.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Whether a request body is sent for this method.
    pub fn allows_body(&self) -> bool {
        !matches!(self, HttpMethod::Get | HttpMethod::Head)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for http::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Patch => http::Method::PATCH,
            HttpMethod::Delete => http::Method::DELETE,
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Options => http::Method::OPTIONS,
        }
    }
}

/// Outgoing payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Sent as-is.
    Text(String),
    /// Sent as-is.
    Bytes(Bytes),
    /// Serialized to JSON text by the transport adapter.
    Json(serde_json::Value),
}

/// An outgoing HTTP call described as plain data.
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: HttpMethod,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Overrides the client-wide default timeout.
    pub timeout: Option<Duration>,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            ..Self::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    /// Set a header, replacing any previous value for the same name.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, ApiError> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ApiError::RequestSetup(format!("invalid header name {name:?}: {e}")))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            ApiError::RequestSetup(format!("invalid value for header {name:?}: {e}"))
        })?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    /// Attach a structured body. Serialization happens here so a value that
    /// cannot be represented as JSON fails before anything is sent.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::RequestSetup(format!("body serialization failed: {e}")))?;
        self.body = Some(RequestBody::Json(value));
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    /// The response declared a JSON content type.
    Json(serde_json::Value),
    /// Any other content type.
    Text(String),
}

impl ResponseData {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseData::Json(value) => Some(value),
            ResponseData::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseData::Json(_) => None,
            ResponseData::Text(text) => Some(text),
        }
    }
}

impl fmt::Display for ResponseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseData::Json(value) => write!(f, "{value}"),
            ResponseData::Text(text) => f.write_str(text),
        }
    }
}

/// A completed HTTP call.
#[derive(Debug, Clone)]
pub struct ResponseDescriptor {
    pub data: ResponseData,
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    /// The request that produced this response, as it was dispatched.
    pub request: RequestDescriptor,
}

impl ResponseDescriptor {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Deserialize a JSON payload into `T`.
    ///
    /// A text payload is never parsed speculatively; it fails like a
    /// mismatched JSON payload does.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let url = self.request.url.clone();
        match &self.data {
            ResponseData::Json(value) => T::deserialize(value).map_err(|e| ApiError::Transport {
                url,
                message: e.to_string(),
            }),
            ResponseData::Text(_) => Err(ApiError::Transport {
                url,
                message: "response did not declare a JSON content type".to_string(),
            }),
        }
    }
}
