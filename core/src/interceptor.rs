//! Request, response and error interceptors.
//!
//! # Design
//! Interceptors are plain trait objects kept in ordered `Vec`s on the client
//! and fixed once the client is built. Request interceptors take the
//! descriptor by value and return it, so they can only change a request
//! before dispatch. Response interceptors run on 2xx responses. Error
//! interceptors see every failure after classification and must hand the
//! error back, so they can observe or rewrap an error but never hide it.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::{HeaderValue, AUTHORIZATION};
use tracing::{debug, error, warn};

use crate::descriptor::{RequestDescriptor, ResponseDescriptor};
use crate::error::ApiError;
use crate::token::{TokenStore, AUTH_TOKEN_KEY};

#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept(&self, request: RequestDescriptor) -> Result<RequestDescriptor, ApiError>;
}

pub trait ResponseInterceptor: Send + Sync {
    fn on_response(&self, response: ResponseDescriptor) -> Result<ResponseDescriptor, ApiError>;
}

pub trait ErrorInterceptor: Send + Sync {
    fn on_error(&self, error: ApiError) -> ApiError;
}

impl<F> ResponseInterceptor for F
where
    F: Fn(ResponseDescriptor) -> Result<ResponseDescriptor, ApiError> + Send + Sync,
{
    fn on_response(&self, response: ResponseDescriptor) -> Result<ResponseDescriptor, ApiError> {
        self(response)
    }
}

impl<F> ErrorInterceptor for F
where
    F: Fn(ApiError) -> ApiError + Send + Sync,
{
    fn on_error(&self, error: ApiError) -> ApiError {
        self(error)
    }
}

/// Sets `Authorization: Bearer <token>` from the token store.
///
/// The token is read on every request. A missing token, an empty token, or a
/// failed read leaves the request untouched; only the read failure is logged.
#[derive(Clone)]
pub struct BearerTokenInterceptor {
    store: Arc<dyn TokenStore>,
}

impl BearerTokenInterceptor {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RequestInterceptor for BearerTokenInterceptor {
    async fn intercept(
        &self,
        mut request: RequestDescriptor,
    ) -> Result<RequestDescriptor, ApiError> {
        let token = match self.store.get(AUTH_TOKEN_KEY).await {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => {
                debug!(url = %request.url, "no auth token stored");
                return Ok(request);
            }
            Err(err) => {
                warn!(
                    url = %request.url,
                    error = %err,
                    "failed to read auth token, sending without it"
                );
                return Ok(request);
            }
        };

        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers.insert(AUTHORIZATION, value);
            }
            Err(err) => {
                warn!(
                    url = %request.url,
                    error = %err,
                    "stored auth token is not a valid header value"
                );
            }
        }
        Ok(request)
    }
}

/// Identity response interceptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl ResponseInterceptor for PassThrough {
    fn on_response(&self, response: ResponseDescriptor) -> Result<ResponseDescriptor, ApiError> {
        Ok(response)
    }
}

/// Logs each classified error once and returns it unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrors;

impl ErrorInterceptor for LogErrors {
    fn on_error(&self, err: ApiError) -> ApiError {
        match &err {
            ApiError::Unauthorized { url, .. } => {
                warn!(%url, status = 401, "unauthorized, re-authentication required");
            }
            ApiError::NotFound { url, .. } => {
                warn!(%url, status = 404, "resource not found");
            }
            ApiError::ServerResponse { url, status, body } => {
                error!(%url, status, %body, "server returned an error status");
            }
            ApiError::Network { url, message } => {
                error!(%url, error = %message, "no response received");
            }
            ApiError::Timeout { url, timeout } => {
                error!(%url, timeout_ms = timeout.as_millis() as u64, "request timed out");
            }
            ApiError::Transport { url, message } => {
                error!(%url, error = %message, "response body could not be decoded");
            }
            ApiError::RequestSetup(message) => {
                error!(error = %message, "request could not be set up");
            }
        }
        err
    }
}
