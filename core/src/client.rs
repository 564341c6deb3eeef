//! The request-issuing client.
//!
//! # Design
//! `ApiClient` owns an `Arc<ClientConfig>`, a `Transport`, and three ordered
//! interceptor lists, none of which change after `build()`. Cloning the
//! client is cheap, and concurrent `send` calls share nothing mutable.
//!
//! A call runs through these stages:
//! 1. resolve the URL against the base URL and merge default headers,
//! 2. request interceptors, in order, stopping at the first error,
//! 3. dispatch under the timeout; the losing future is dropped, which
//!    cancels the in-flight request,
//! 4. a non-2xx status becomes an error,
//! 5. response interceptors on success; on any failure, classification into
//!    `ApiError` followed by the error interceptors, in order.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::adapter::{FetchAdapter, Transport};
use crate::config::ClientConfig;
use crate::descriptor::{RequestDescriptor, ResponseDescriptor};
use crate::error::ApiError;
use crate::fetch::ReqwestFetch;
use crate::interceptor::{
    BearerTokenInterceptor, ErrorInterceptor, LogErrors, PassThrough, RequestInterceptor,
    ResponseInterceptor,
};
use crate::token::TokenStore;

#[derive(Clone)]
pub struct ApiClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    error_interceptors: Vec<Arc<dyn ErrorInterceptor>>,
}

impl ApiClient {
    /// Client over `transport` with no interceptors.
    pub fn new(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        Self::builder(config).transport(transport).build()
    }

    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            transport: None,
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
            error_interceptors: Vec::new(),
        }
    }

    /// The standard pipeline: reqwest transport, bearer token injection,
    /// identity response handling, and error logging.
    pub fn with_defaults(config: ClientConfig, store: Arc<dyn TokenStore>) -> Self {
        Self::builder(config)
            .request_interceptor(BearerTokenInterceptor::new(store))
            .response_interceptor(PassThrough)
            .error_interceptor(LogErrors)
            .build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn send(&self, request: RequestDescriptor) -> Result<ResponseDescriptor, ApiError> {
        match self.run(request).await {
            Ok(response) => Ok(response),
            Err(err) => Err(self.fail(err)),
        }
    }

    pub async fn get(&self, url: &str) -> Result<ResponseDescriptor, ApiError> {
        self.send(RequestDescriptor::get(url)).await
    }

    pub async fn delete(&self, url: &str) -> Result<ResponseDescriptor, ApiError> {
        self.send(RequestDescriptor::delete(url)).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<ResponseDescriptor, ApiError> {
        self.send_json(RequestDescriptor::post(url), body).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<ResponseDescriptor, ApiError> {
        self.send_json(RequestDescriptor::put(url), body).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<ResponseDescriptor, ApiError> {
        self.send_json(RequestDescriptor::patch(url), body).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        request: RequestDescriptor,
        body: &T,
    ) -> Result<ResponseDescriptor, ApiError> {
        match request.json(body) {
            Ok(request) => self.send(request).await,
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn run(&self, request: RequestDescriptor) -> Result<ResponseDescriptor, ApiError> {
        let mut request = self.prepare(request);
        for interceptor in &self.request_interceptors {
            request = interceptor.intercept(request).await?;
        }

        let timeout = request.timeout.unwrap_or(self.config.default_timeout());
        debug!(method = %request.method, url = %request.url, "dispatching request");

        let response = match tokio::time::timeout(timeout, self.transport.execute(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(failure)) => return Err(ApiError::from_transport(&request.url, failure)),
            Err(_) => {
                return Err(ApiError::Timeout {
                    url: request.url.clone(),
                    timeout,
                })
            }
        };

        if !response.is_success() {
            return Err(ApiError::from_status(&response));
        }

        self.response_interceptors
            .iter()
            .try_fold(response, |response, interceptor| interceptor.on_response(response))
    }

    fn prepare(&self, mut request: RequestDescriptor) -> RequestDescriptor {
        request.url = self.config.resolve_url(&request.url);
        request.headers = self.config.merge_headers(std::mem::take(&mut request.headers));
        request
    }

    fn fail(&self, err: ApiError) -> ApiError {
        self.error_interceptors
            .iter()
            .fold(err, |err, interceptor| interceptor.on_error(err))
    }
}

pub struct ApiClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    error_interceptors: Vec<Arc<dyn ErrorInterceptor>>,
}

impl ApiClientBuilder {
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn request_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.request_interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn response_interceptor(mut self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.response_interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn error_interceptor(mut self, interceptor: impl ErrorInterceptor + 'static) -> Self {
        self.error_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Falls back to `FetchAdapter<ReqwestFetch>` when no transport was set.
    pub fn build(self) -> ApiClient {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(FetchAdapter::new(ReqwestFetch::new())),
        };
        ApiClient {
            config: Arc::new(self.config),
            transport,
            request_interceptors: self.request_interceptors,
            response_interceptors: self.response_interceptors,
            error_interceptors: self.error_interceptors,
        }
    }
}
