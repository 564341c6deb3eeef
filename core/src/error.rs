//! Error types for the API client.
//!
//! # Design
//! `ApiError` is the only error a caller of `ApiClient` ever sees. The
//! transport layer reports raw `TransportFailure` values; the client turns
//! each failure into exactly one `ApiError` variant before the error
//! interceptors run. `Unauthorized` and `NotFound` are specialisations of a
//! server response error, so they carry the same url and body fields.

use std::time::Duration;

use thiserror::Error;

use crate::descriptor::ResponseDescriptor;
use crate::fetch::{FetchError, FetchErrorKind};

/// Errors returned by `ApiClient::send` and the request builders.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be built or serialized; nothing was sent.
    #[error("request setup failed: {0}")]
    RequestSetup(String),

    /// No response arrived before the deadline.
    #[error("request to {url} timed out after {}ms", .timeout.as_millis())]
    Timeout { url: String, timeout: Duration },

    /// The request was sent but no response was received.
    #[error("network error calling {url}: {message}")]
    Network { url: String, message: String },

    /// The server returned 401. The caller must re-authenticate.
    #[error("unauthorized request to {url}")]
    Unauthorized { url: String, body: String },

    /// The server returned 404.
    #[error("resource not found at {url}")]
    NotFound { url: String, body: String },

    /// The server returned a non-2xx status other than 401 and 404.
    #[error("HTTP {status} from {url}: {body}")]
    ServerResponse { url: String, status: u16, body: String },

    /// The response body could not be decoded per its content type.
    #[error("could not decode response from {url}: {message}")]
    Transport { url: String, message: String },
}

impl ApiError {
    /// Classify a response that arrived with a non-2xx status.
    pub fn from_status(response: &ResponseDescriptor) -> Self {
        Self::for_status(
            response.request.url.clone(),
            response.status,
            response.data.to_string(),
        )
    }

    fn for_status(url: String, status: u16, body: String) -> Self {
        match status {
            401 => ApiError::Unauthorized { url, body },
            404 => ApiError::NotFound { url, body },
            status => ApiError::ServerResponse { url, status, body },
        }
    }

    /// Classify a failure reported by the transport for a request to `url`.
    ///
    /// A body that fails to decode on a non-2xx reply is still classified by
    /// its status, with the raw text as the body.
    pub fn from_transport(url: &str, failure: TransportFailure) -> Self {
        let url = url.to_string();
        match failure {
            TransportFailure::Encode(err) => {
                ApiError::RequestSetup(format!("could not encode body for {url}: {err}"))
            }
            TransportFailure::Fetch(err) if err.kind == FetchErrorKind::InvalidRequest => {
                ApiError::RequestSetup(format!("could not dispatch {url}: {}", err.message))
            }
            TransportFailure::Fetch(err) => ApiError::Network {
                url,
                message: err.to_string(),
            },
            TransportFailure::Decode { status, body, .. } if !(200..300).contains(&status) => {
                Self::for_status(url, status, body)
            }
            TransportFailure::Decode { content_type, message, .. } => ApiError::Transport {
                url,
                message: format!("{content_type} body: {message}"),
            },
        }
    }

    /// HTTP status carried by server response errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::NotFound { .. } => Some(404),
            ApiError::ServerResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Url of the failed call, when one was resolved.
    pub fn url(&self) -> Option<&str> {
        match self {
            ApiError::RequestSetup(_) => None,
            ApiError::Timeout { url, .. }
            | ApiError::Network { url, .. }
            | ApiError::Unauthorized { url, .. }
            | ApiError::NotFound { url, .. }
            | ApiError::ServerResponse { url, .. }
            | ApiError::Transport { url, .. } => Some(url),
        }
    }

    /// True for every error that came from an HTTP response, including 401 and 404.
    pub fn is_server_response(&self) -> bool {
        self.status().is_some()
    }
}

/// Raw, unclassified failure reported by a `Transport`.
#[derive(Debug, Error)]
pub enum TransportFailure {
    #[error("could not encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The body did not match its declared content type. `body` is the raw
    /// text as received.
    #[error("could not decode {content_type} body (HTTP {status}): {message}")]
    Decode {
        status: u16,
        content_type: String,
        message: String,
        body: String,
    },
}
