//! Transport abstraction over the underlying network stack.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

/// Failure to complete an exchange at the transport level. No status is
/// available.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    /// Transport error with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// A fully composed request, ready for the wire.
///
/// Headers are carried as supplied, in order; body serialization has already
/// happened by the time a transport sees one of these.
#[derive(Debug)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Composed URL including query string.
    pub url: url::Url,
    /// Header pairs in application order.
    pub headers: Vec<(String, String)>,
    /// Serialized body, if any.
    pub body: Option<Bytes>,
}

/// Raw response surface the pipeline consumes.
///
/// The body is a one-shot stream: the pipeline collects it exactly once,
/// driving any progress callback as chunks arrive.
pub struct RawResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Total body size, when the transport knows it up front.
    pub content_length: Option<u64>,
    /// One-shot body stream.
    pub body: BoxStream<'static, Result<Bytes, TransportError>>,
}

impl RawResponse {
    /// Response with an in-memory body. Useful for tests and non-network
    /// transports.
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        let content_length = Some(body.len() as u64);
        Self {
            status,
            headers,
            content_length,
            body: futures::stream::once(async move { Ok(body) }).boxed(),
        }
    }
}

impl std::fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// The opaque network capability the pipeline depends on.
///
/// Implementations perform one HTTP exchange per call and surface the
/// outcome as a [`RawResponse`] or a [`TransportError`]. The default
/// implementation is [`ReqwestTransport`]; tests substitute in-process
/// mocks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one exchange.
    async fn fetch(&self, request: TransportRequest) -> Result<RawResponse, TransportError>;
}

/// Default transport backed by `reqwest`.
///
/// Timeouts and cancellation are owned by the pipeline, so none are
/// configured here.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Transport with a stock `reqwest` client.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("gantry/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .brotli(true)
            .build()
            .expect("failed to build HTTP transport");

        Self { client }
    }

    /// Transport wrapping an existing `reqwest` client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        let mut builder = self.client.request(request.method, request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed();

        Ok(RawResponse {
            status,
            headers,
            content_length,
            body,
        })
    }
}
