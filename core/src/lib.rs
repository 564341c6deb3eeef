//! Async HTTP client core with an interceptor pipeline.
//!
//! # Overview
//! `ApiClient` issues HTTP calls with consistent auth, timeout, and error
//! handling. Requests pass through ordered request interceptors, a pluggable
//! `Transport`, then response or error interceptors. `FetchAdapter` is the
//! default transport: it presents any `fetch`-shaped primitive (`Fetch`) as a
//! `Transport`, and `ReqwestFetch` is the production primitive.
//!
//! # Design
//! - `ClientConfig` is built once and shared read-only; the base URL is
//!   chosen from `BuildMode` at construction.
//! - Descriptors (`RequestDescriptor`, `ResponseDescriptor`) are plain data,
//!   so the pipeline can be exercised without a network.
//! - The adapter never classifies failures. The client classifies each one
//!   into a single `ApiError` and error interceptors log it; nothing is
//!   retried or swallowed.
//! - The bearer token is read from the `TokenStore` on every request.

pub mod adapter;
pub mod client;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod interceptor;
pub mod token;

pub use adapter::{FetchAdapter, Transport};
pub use client::{ApiClient, ApiClientBuilder};
pub use config::{BuildMode, ClientConfig};
pub use descriptor::{HttpMethod, RequestBody, RequestDescriptor, ResponseData, ResponseDescriptor};
pub use error::{ApiError, TransportFailure};
pub use fetch::{Fetch, FetchError, FetchErrorKind, FetchInit, FetchResponse, ReqwestFetch};
pub use interceptor::{
    BearerTokenInterceptor, ErrorInterceptor, LogErrors, PassThrough, RequestInterceptor,
    ResponseInterceptor,
};
pub use token::{MemoryTokenStore, StoreError, TokenStore, AUTH_TOKEN_KEY};
