//! Interceptor pipeline tests over scripted primitives.
//!
//! No sockets here: a scripted `Fetch` (behind the real `FetchAdapter`) or a
//! scripted `Transport` stands in for the network, so ordering, timing and
//! log output can be pinned exactly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_core::{
    ApiClient, ApiError, BearerTokenInterceptor, ClientConfig, Fetch, FetchAdapter, FetchError,
    FetchInit, FetchResponse, LogErrors, MemoryTokenStore, PassThrough, RequestDescriptor,
    RequestInterceptor, ResponseData, ResponseDescriptor, StoreError, TokenStore, Transport,
    TransportFailure, AUTH_TOKEN_KEY,
};
use async_trait::async_trait;
use http::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

const BASE_URL: &str = "http://api.test";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Replays one outcome and records every dispatched call.
#[derive(Clone)]
struct ScriptedFetch {
    outcome: Result<FetchResponse, FetchError>,
    calls: Arc<Mutex<Vec<(String, FetchInit)>>>,
}

impl ScriptedFetch {
    fn new(outcome: Result<FetchResponse, FetchError>) -> Self {
        Self {
            outcome,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn json(status: u16, body: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self::new(Ok(FetchResponse::new(status, headers, body)))
    }

    fn calls(&self) -> Vec<(String, FetchInit)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for ScriptedFetch {
    async fn fetch(&self, url: &str, init: FetchInit) -> Result<FetchResponse, FetchError> {
        self.calls.lock().unwrap().push((url.to_string(), init));
        self.outcome.clone()
    }
}

/// Never answers.
struct Hang;

#[async_trait]
impl Transport for Hang {
    async fn execute(
        &self,
        _request: &RequestDescriptor,
    ) -> Result<ResponseDescriptor, TransportFailure> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("the client times out first")
    }
}

struct BrokenStore;

#[async_trait]
impl TokenStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError("storage offline".to_string()))
    }
}

/// Appends its name to `x-order` so ordering is visible downstream.
struct Tag(&'static str);

#[async_trait]
impl RequestInterceptor for Tag {
    async fn intercept(
        &self,
        mut request: RequestDescriptor,
    ) -> Result<RequestDescriptor, ApiError> {
        request.headers.append("x-order", HeaderValue::from_static(self.0));
        Ok(request)
    }
}

struct Reject;

#[async_trait]
impl RequestInterceptor for Reject {
    async fn intercept(&self, _request: RequestDescriptor) -> Result<RequestDescriptor, ApiError> {
        Err(ApiError::RequestSetup("rejected by policy".to_string()))
    }
}

/// Counts WARN and ERROR events.
#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl WarnCounter {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() <= Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

async fn store_with(token: &str) -> Arc<MemoryTokenStore> {
    let store = MemoryTokenStore::new();
    store.set(AUTH_TOKEN_KEY, token).await;
    Arc::new(store)
}

fn default_client(fetch: ScriptedFetch, store: Arc<dyn TokenStore>) -> ApiClient {
    ApiClient::builder(ClientConfig::new(BASE_URL))
        .transport(FetchAdapter::new(fetch))
        .request_interceptor(BearerTokenInterceptor::new(store))
        .response_interceptor(PassThrough)
        .error_interceptor(LogErrors)
        .build()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_items_with_token() {
    let fetch = ScriptedFetch::json(200, r#"{"items":[]}"#);
    let client = default_client(fetch.clone(), store_with("abc").await);

    let response = client
        .send(RequestDescriptor::get("/items").query("page", "2"))
        .await
        .unwrap();

    let calls = fetch.calls();
    assert_eq!(calls.len(), 1);
    let (url, init) = &calls[0];
    assert_eq!(url, "http://api.test/items?page=2");
    assert_eq!(init.headers[AUTHORIZATION], "Bearer abc");
    assert!(init.body.is_none());
    assert_eq!(response.data, ResponseData::Json(json!({"items": []})));
}

#[tokio::test]
async fn connection_refused_is_network_error_logged_once() {
    let counter = WarnCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let fetch = ScriptedFetch::new(Err(FetchError::connect("connection refused")));
    let client = default_client(fetch, store_with("abc").await);

    let err = client.get("/items").await.unwrap_err();

    assert!(matches!(err, ApiError::Network { ref url, .. } if url == "http://api.test/items"));
    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn token_store_failure_still_dispatches() {
    let counter = WarnCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let fetch = ScriptedFetch::json(200, r#"{"ok":true}"#);
    let client = default_client(fetch.clone(), Arc::new(BrokenStore));

    let response = client.get("/items").await.unwrap();

    assert_eq!(response.status, 200);
    assert!(fetch.calls()[0].1.headers.get(AUTHORIZATION).is_none());
    // The failed read is the only thing logged.
    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn absent_token_sends_no_authorization() {
    let fetch = ScriptedFetch::json(200, "{}");
    let client = default_client(fetch.clone(), Arc::new(MemoryTokenStore::new()));

    client.get("/items").await.unwrap();

    assert!(fetch.calls()[0].1.headers.get(AUTHORIZATION).is_none());
}

#[tokio::test]
async fn status_codes_map_to_error_kinds() {
    let store = store_with("abc").await;
    let send = |status| {
        let client = default_client(ScriptedFetch::json(status, r#"{"error":"x"}"#), store.clone());
        async move { client.get("/items/1").await.unwrap_err() }
    };

    assert!(matches!(send(401).await, ApiError::Unauthorized { .. }));
    assert!(matches!(send(404).await, ApiError::NotFound { .. }));
    assert!(matches!(send(409).await, ApiError::ServerResponse { status: 409, .. }));
    match send(500).await {
        ApiError::ServerResponse { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, r#"{"error":"x"}"#);
        }
        other => panic!("expected ServerResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let fetch = ScriptedFetch::json(401, "{}");
    let client = default_client(fetch.clone(), store_with("stale").await);

    let err = client.get("/items").await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert_eq!(fetch.calls().len(), 1);
}

#[tokio::test]
async fn non_get_json_body_is_serialized() {
    let fetch = ScriptedFetch::json(201, r#"{"id":1}"#);
    let client = default_client(fetch.clone(), store_with("abc").await);
    let payload = json!({"name": "Lamp", "nested": {"n": [1, 2, 3]}});

    client.post_json("/items", &payload).await.unwrap();

    let body = fetch.calls()[0].1.body.clone().unwrap();
    let sent: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(sent, payload);
}

// ---------------------------------------------------------------------------
// Pipeline mechanics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn request_interceptors_run_in_registration_order() {
    let fetch = ScriptedFetch::json(200, "{}");
    let client = ApiClient::builder(ClientConfig::new(BASE_URL))
        .transport(FetchAdapter::new(fetch.clone()))
        .request_interceptor(Tag("first"))
        .request_interceptor(Tag("second"))
        .build();

    client.get("/items").await.unwrap();

    let init = &fetch.calls()[0].1;
    let order: Vec<_> = init.headers.get_all("x-order").iter().collect();
    assert_eq!(order, vec!["first", "second"]);
}

#[tokio::test]
async fn failing_request_interceptor_stops_the_call() {
    let fetch = ScriptedFetch::json(200, "{}");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_hook = seen.clone();
    let client = ApiClient::builder(ClientConfig::new(BASE_URL))
        .transport(FetchAdapter::new(fetch.clone()))
        .request_interceptor(Reject)
        .request_interceptor(Tag("never"))
        .error_interceptor(move |err: ApiError| {
            seen_by_hook.lock().unwrap().push(err.to_string());
            err
        })
        .build();

    let err = client.get("/items").await.unwrap_err();

    assert!(matches!(err, ApiError::RequestSetup(ref m) if m == "rejected by policy"));
    assert!(fetch.calls().is_empty());
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn error_interceptors_run_in_order() {
    let client = ApiClient::builder(ClientConfig::new(BASE_URL))
        .transport(FetchAdapter::new(ScriptedFetch::json(404, "{}")))
        .error_interceptor(|err: ApiError| ApiError::RequestSetup(format!("a({err})")))
        .error_interceptor(|err: ApiError| ApiError::RequestSetup(format!("b({err})")))
        .build();

    let err = client.get("/items").await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "request setup failed: b(request setup failed: a(resource not found at http://api.test/items))"
    );
}

#[tokio::test]
async fn response_interceptor_failure_reaches_error_chain() {
    let logged = Arc::new(AtomicUsize::new(0));
    let logged_by_hook = logged.clone();
    let client = ApiClient::builder(ClientConfig::new(BASE_URL))
        .transport(FetchAdapter::new(ScriptedFetch::json(200, "{}")))
        .response_interceptor(
            |response: ResponseDescriptor| -> Result<ResponseDescriptor, ApiError> {
                Err(ApiError::Transport {
                    url: response.request.url,
                    message: "unexpected shape".to_string(),
                })
            },
        )
        .error_interceptor(move |err: ApiError| {
            logged_by_hook.fetch_add(1, Ordering::SeqCst);
            err
        })
        .build();

    let err = client.get("/items").await.unwrap_err();

    assert!(matches!(err, ApiError::Transport { .. }));
    assert_eq!(logged.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn decode_failure_is_transport_error() {
    let client = default_client(ScriptedFetch::json(200, "{\"items\": ["), store_with("abc").await);

    let err = client.get("/items").await.unwrap_err();

    assert!(matches!(err, ApiError::Transport { .. }), "{err:?}");
}

#[tokio::test]
async fn undecodable_error_reply_keeps_its_status() {
    let store = store_with("abc").await;
    let send = |status| {
        let fetch = ScriptedFetch::json(status, "<html>Unauthorized</html>");
        let client = default_client(fetch, store.clone());
        async move { client.get("/items").await.unwrap_err() }
    };

    match send(401).await {
        ApiError::Unauthorized { url, body } => {
            assert_eq!(url, "http://api.test/items");
            assert_eq!(body, "<html>Unauthorized</html>");
        }
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    assert!(matches!(send(404).await, ApiError::NotFound { .. }));
    let err = send(502).await;
    assert!(matches!(err, ApiError::ServerResponse { status: 502, .. }), "{err:?}");
    assert_eq!(err.status(), Some(502));
}

#[tokio::test]
async fn invalid_request_from_primitive_is_setup_error() {
    let fetch = ScriptedFetch::new(Err(FetchError::invalid_request("builder error")));
    let client = default_client(fetch, store_with("abc").await);

    let err = client.get("/items").await.unwrap_err();

    assert!(matches!(err, ApiError::RequestSetup(_)), "{err:?}");
}

#[tokio::test(start_paused = true)]
async fn timeout_fires_at_the_deadline() {
    let client = ApiClient::new(
        ClientConfig::new(BASE_URL).with_timeout(Duration::from_millis(250)),
        Hang,
    );
    let started = tokio::time::Instant::now();

    let err = client.get("/items").await.unwrap_err();

    let elapsed = started.elapsed();
    assert!(matches!(err, ApiError::Timeout { .. }), "{err:?}");
    assert!(elapsed >= Duration::from_millis(250), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn per_call_timeout_overrides_default() {
    let client = ApiClient::new(ClientConfig::new(BASE_URL), Hang);
    let started = tokio::time::Instant::now();

    let err = client
        .send(RequestDescriptor::get("/items").timeout(Duration::from_millis(40)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApiError::Timeout { timeout, .. } if timeout == Duration::from_millis(40)
    ));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn concurrent_calls_do_not_interfere() {
    let fetch = ScriptedFetch::json(200, "{}");
    let client = default_client(fetch.clone(), store_with("abc").await);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .send(RequestDescriptor::get("/items").query("n", i.to_string()))
                    .await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.request.query, vec![("n".to_string(), i.to_string())]);
        assert_eq!(response.request.headers[AUTHORIZATION], "Bearer abc");
    }
    assert_eq!(fetch.calls().len(), 8);
}
