//! Transport seam and the `fetch`-backed adapter.
//!
//! # Design
//! `Transport` is what `ApiClient` dispatches to. `FetchAdapter` implements it
//! on top of any `Fetch` primitive by translating shapes only: it builds the
//! query string, encodes the body, forwards headers, and decodes the response
//! by its declared content type. It never retries and never classifies a
//! failure; every raw failure is returned as a `TransportFailure`.

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::descriptor::{
    HttpMethod, RequestBody, RequestDescriptor, ResponseData, ResponseDescriptor,
};
use crate::error::TransportFailure;
use crate::fetch::{Fetch, FetchInit, FetchResponse};

/// Characters left unescaped by JavaScript's `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Executes a single request descriptor against the network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: &RequestDescriptor,
    ) -> Result<ResponseDescriptor, TransportFailure>;
}

/// Presents a `Fetch` primitive as a `Transport`.
#[derive(Debug, Clone, Default)]
pub struct FetchAdapter<F> {
    fetch: F,
}

impl<F: Fetch> FetchAdapter<F> {
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

#[async_trait]
impl<F: Fetch> Transport for FetchAdapter<F> {
    async fn execute(
        &self,
        request: &RequestDescriptor,
    ) -> Result<ResponseDescriptor, TransportFailure> {
        let url = build_url(&request.url, &request.query);
        let init = FetchInit {
            method: request.method,
            headers: request.headers.clone(),
            body: encode_body(request)?,
        };

        let response = self.fetch.fetch(&url, init).await?;
        let data = decode_body(request.method, &response)?;

        Ok(ResponseDescriptor {
            data,
            status: response.status(),
            status_text: response.status_text().to_string(),
            headers: response.headers().clone(),
            request: request.clone(),
        })
    }
}

/// Append `query` to `url` as `k=v` pairs, percent-encoded, in order.
pub fn build_url(url: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let encoded = query
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                utf8_percent_encode(key, COMPONENT),
                utf8_percent_encode(value, COMPONENT)
            )
        })
        .collect::<Vec<_>>()
        .join("&");
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{encoded}")
}

/// Outgoing payload for `request`. GET and HEAD never carry one.
pub fn encode_body(request: &RequestDescriptor) -> Result<Option<Bytes>, TransportFailure> {
    if !request.method.allows_body() {
        return Ok(None);
    }
    let body = match &request.body {
        None => return Ok(None),
        Some(RequestBody::Text(text)) => Bytes::from(text.clone()),
        Some(RequestBody::Bytes(bytes)) => bytes.clone(),
        Some(RequestBody::Json(value)) => {
            Bytes::from(serde_json::to_vec(value).map_err(TransportFailure::Encode)?)
        }
    };
    Ok(Some(body))
}

/// Parse the body as JSON when the content type says so, otherwise keep it as
/// text. An empty JSON body is only accepted as `null` on a 204 or a HEAD
/// reply, which never carry content; anywhere else it is a decode failure.
fn decode_body(
    method: HttpMethod,
    response: &FetchResponse,
) -> Result<ResponseData, TransportFailure> {
    let content_type = response.content_type().unwrap_or_default().to_ascii_lowercase();
    if !content_type.contains("application/json") {
        return Ok(ResponseData::Text(response.text()));
    }
    if response.is_empty() && (response.status() == 204 || method == HttpMethod::Head) {
        return Ok(ResponseData::Json(serde_json::Value::Null));
    }
    response
        .json()
        .map(ResponseData::Json)
        .map_err(|e| TransportFailure::Decode {
            status: response.status(),
            content_type,
            message: e.to_string(),
            body: response.text(),
        })
}
