//! Integration tests for the request pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use gantry::{
    AuthInterceptor, CancelToken, FnInterceptor, HeaderMap, HttpClient, HttpError, HttpResponse,
    RawResponse, RequestConfig, ResponseBody, ResponseType, StatusCode, Transport, TransportError,
    TransportRequest,
};
use serde_json::json;
use wiremock::matchers::{body_json, header as header_matcher, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// In-process transport that records every request and answers with a
/// canned response.
#[derive(Clone)]
struct MockTransport {
    status: StatusCode,
    body: Bytes,
    seen: Arc<Mutex<Vec<TransportRequest>>>,
}

impl MockTransport {
    fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn ok() -> Self {
        Self::new(StatusCode::OK, "{}")
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn last_url(&self) -> String {
        self.seen
            .lock()
            .unwrap()
            .last()
            .expect("no request recorded")
            .url
            .to_string()
    }

    fn last_header(&self, name: &str) -> Option<String> {
        self.seen
            .lock()
            .unwrap()
            .last()
            .expect("no request recorded")
            .headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        self.seen.lock().unwrap().push(request);
        Ok(RawResponse::from_bytes(
            self.status,
            HeaderMap::new(),
            self.body.clone(),
        ))
    }
}

/// Transport whose exchange never resolves.
struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn fetch(&self, _request: TransportRequest) -> Result<RawResponse, TransportError> {
        futures::future::pending().await
    }
}

/// Transport that always fails below the HTTP layer.
struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    async fn fetch(&self, _request: TransportRequest) -> Result<RawResponse, TransportError> {
        Err(TransportError::new("connection refused"))
    }
}

fn mock_client(transport: &MockTransport) -> HttpClient {
    HttpClient::with_transport(
        RequestConfig::default().base_url("http://mock.local"),
        Arc::new(transport.clone()),
    )
}

#[tokio::test]
async fn test_get_resolves_json_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("id", "123"))
        .and(query_param("active", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": "test"})))
        .mount(&server)
        .await;

    let client = HttpClient::with_defaults(RequestConfig::default().base_url(server.uri()));
    let response = client
        .get("/users")
        .param("id", 123)
        .param("active", true)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.status_text, "OK");
    assert_eq!(response.body, ResponseBody::Json(json!({"data": "test"})));
    assert_eq!(response.config.url, "/users");
}

#[tokio::test]
async fn test_protocol_error_carries_status_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "Resource not found"})),
        )
        .mount(&server)
        .await;

    let client = HttpClient::with_defaults(RequestConfig::default().base_url(server.uri()));
    let err = client.get("/users").send().await.unwrap_err();

    assert!(err.is_protocol());
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(
        err.response_body(),
        Some(&ResponseBody::Json(json!({"message": "Resource not found"})))
    );
    assert_eq!(err.config().map(|c| c.url.as_str()), Some("/users"));
}

#[tokio::test]
async fn test_post_sends_json_body_with_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header_matcher("content-type", "application/json"))
        .and(body_json(json!({"item": "widget", "quantity": 5})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .mount(&server)
        .await;

    let client = HttpClient::with_defaults(RequestConfig::default().base_url(server.uri()));
    let response = client
        .post("/orders")
        .json(&json!({"item": "widget", "quantity": 5}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body, ResponseBody::Json(json!({"id": 1})));
}

#[tokio::test]
async fn test_no_content_decodes_per_response_type() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/users/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = HttpClient::with_defaults(RequestConfig::default().base_url(server.uri()));

    let as_json = client.delete("/users/1").send().await.unwrap();
    assert_eq!(as_json.body, ResponseBody::Json(json!({})));

    let as_text = client
        .delete("/users/1")
        .response_type(ResponseType::Text)
        .send()
        .await
        .unwrap();
    assert_eq!(as_text.body, ResponseBody::Empty);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fires_after_configured_duration() {
    let client = HttpClient::with_transport(
        RequestConfig::default().base_url("http://mock.local"),
        Arc::new(HangingTransport),
    );

    let start = tokio::time::Instant::now();
    let err = client
        .get("/slow")
        .timeout(Duration::from_millis(100))
        .send()
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.to_string(), "timeout of 100ms exceeded");
    assert_eq!(err.config().map(|c| c.url.as_str()), Some("/slow"));
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(150),
        "timer fired at {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_caller_token_cancels_even_with_timeout_configured() {
    let client = HttpClient::with_transport(
        RequestConfig::default().base_url("http://mock.local"),
        Arc::new(HangingTransport),
    );

    let token = CancelToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    // The caller's token is authoritative: no timer is armed, so this
    // surfaces as a plain cancellation, not a timeout.
    let err = client
        .get("/slow")
        .timeout(Duration::from_secs(5))
        .cancel_token(token)
        .send()
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.to_string(), "request aborted");
    assert!(err.config().is_some());
}

#[tokio::test]
async fn test_cancellation_aborts_in_flight_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let client = HttpClient::with_defaults(RequestConfig::default().base_url(server.uri()));
    let token = CancelToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let start = std::time::Instant::now();
    let err = client
        .get("/slow")
        .cancel_token(token)
        .send()
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_transport_failure_is_classified_with_config() {
    let client = HttpClient::with_transport(
        RequestConfig::default().base_url("http://mock.local"),
        Arc::new(FailingTransport),
    );

    let err = client.get("/unreachable").send().await.unwrap_err();

    assert!(err.is_transport());
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(err.config().map(|c| c.url.as_str()), Some("/unreachable"));
}

#[tokio::test]
async fn test_request_rejection_short_circuits_transport_and_response_chain() {
    let transport = MockTransport::ok();
    let client = mock_client(&transport);

    client.interceptors().request.add(
        FnInterceptor::new()
            .fulfilled(|_: RequestConfig| async { Err(HttpError::unknown("interceptor refused")) }),
    );

    let response_hits = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&response_hits);
    client.interceptors().response.add(FnInterceptor::new().fulfilled(
        move |response: HttpResponse| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(response)
            }
        },
    ));

    let err = client.get("/users").send().await.unwrap_err();

    assert!(err.to_string().contains("interceptor refused"));
    // The first unhandled rejection stops everything behind it.
    assert_eq!(transport.calls(), 0);
    assert_eq!(response_hits.load(Ordering::SeqCst), 0);
    // The finalizer still attached the effective config.
    assert_eq!(err.config().map(|c| c.url.as_str()), Some("/users"));
}

#[tokio::test]
async fn test_request_rejection_handler_recovers_and_pipeline_continues() {
    let transport = MockTransport::ok();
    let client = mock_client(&transport);

    client.interceptors().request.add(
        FnInterceptor::new()
            .fulfilled(|_: RequestConfig| async { Err(HttpError::unknown("transient")) })
            .rejected(|_| async {
                Ok(RequestConfig::new("/recovered").base_url("http://mock.local"))
            }),
    );

    let response = client.get("/users").send().await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(transport.calls(), 1);
    assert_eq!(transport.last_url(), "http://mock.local/recovered");
}

#[tokio::test]
async fn test_response_interceptor_transforms_response() {
    let transport = MockTransport::new(StatusCode::OK, r#"{"raw": true}"#);
    let client = mock_client(&transport);

    client.interceptors().response.add(FnInterceptor::new().fulfilled(
        |mut response: HttpResponse| async move {
            response.body = ResponseBody::Json(json!({"wrapped": true}));
            Ok(response)
        },
    ));

    let response = client.get("/users").send().await.unwrap();
    assert_eq!(response.body, ResponseBody::Json(json!({"wrapped": true})));
}

#[tokio::test]
async fn test_ejected_interceptor_no_longer_applies() {
    let transport = MockTransport::ok();
    let client = mock_client(&transport);

    let first = client.interceptors().request.add(
        FnInterceptor::new().fulfilled(|config: RequestConfig| async move {
            Ok(config.header("X-First", "1"))
        }),
    );
    client.interceptors().request.add(
        FnInterceptor::new().fulfilled(|config: RequestConfig| async move {
            Ok(config.header("X-Second", "2"))
        }),
    );

    client.interceptors().request.eject(first);
    client.get("/users").send().await.unwrap();

    assert_eq!(transport.last_header("X-First"), None);
    assert_eq!(transport.last_header("X-Second"), Some("2".to_string()));

    // Ejecting the same handle again is a no-op.
    client.interceptors().request.eject(first);
    assert_eq!(client.interceptors().request.len(), 1);
}

#[tokio::test]
async fn test_auth_interceptor_applies_to_outgoing_request() {
    let transport = MockTransport::ok();
    let client = mock_client(&transport);
    client
        .interceptors()
        .request
        .add(AuthInterceptor::bearer("secret"));

    client.get("/users").send().await.unwrap();

    assert_eq!(
        transport.last_header("Authorization"),
        Some("Bearer secret".to_string())
    );
}

#[tokio::test]
async fn test_null_params_are_omitted_from_composed_url() {
    let transport = MockTransport::ok();
    let client = mock_client(&transport);

    client
        .get("/users")
        .param("id", 123)
        .param("active", true)
        .param("filter", serde_json::Value::Null)
        .send()
        .await
        .unwrap();

    assert_eq!(transport.last_url(), "http://mock.local/users?id=123&active=true");
}

#[tokio::test]
async fn test_derived_client_copies_defaults_but_not_interceptors() {
    let transport = MockTransport::ok();
    let parent = mock_client(&transport);
    parent.interceptors().request.add(
        FnInterceptor::new().fulfilled(|config: RequestConfig| async move {
            Ok(config.header("X-Parent", "1"))
        }),
    );

    let child = parent.create(RequestConfig::default().header("X-Child", "1"));
    child.get("/users").send().await.unwrap();

    // Defaults were merged in; the parent's interceptors were not.
    assert_eq!(transport.last_header("X-Child"), Some("1".to_string()));
    assert_eq!(transport.last_header("X-Parent"), None);
}

#[tokio::test]
async fn test_defaults_are_mutable_on_the_instance() {
    let transport = MockTransport::ok();
    let client = mock_client(&transport);

    client.update_defaults(|defaults| {
        defaults
            .headers
            .insert("X-Env".to_string(), "prod".to_string());
    });

    client.get("/users").send().await.unwrap();
    assert_eq!(transport.last_header("X-Env"), Some("prod".to_string()));
}

#[tokio::test]
async fn test_download_progress_reports_received_bytes() {
    let payload = "hello world, twelve plus";
    let transport = MockTransport::new(StatusCode::OK, payload);
    let client = mock_client(&transport);

    let reports: Arc<Mutex<Vec<(u64, Option<u64>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);

    client
        .get("/download")
        .response_type(ResponseType::Text)
        .on_download_progress(move |progress| {
            sink.lock().unwrap().push((progress.loaded, progress.total));
        })
        .send()
        .await
        .unwrap();

    let reports = reports.lock().unwrap();
    let expected = payload.len() as u64;
    assert_eq!(reports.last(), Some(&(expected, Some(expected))));
}

#[tokio::test]
async fn test_request_does_not_mutate_caller_config() {
    let transport = MockTransport::ok();
    let client = mock_client(&transport);
    client
        .interceptors()
        .request
        .add(AuthInterceptor::bearer("secret"));

    let config = RequestConfig::new("/users").param("id", 1);
    client.request(config.clone()).await.unwrap();

    // The caller's value is untouched; interceptors worked on a copy.
    assert!(config.headers.is_empty());
    assert_eq!(config.url, "/users");
}
