//! HTTP client facade and the request pipeline.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::BoxStream;
use http::{HeaderMap, Method, StatusCode};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::{ProgressCallback, Progress, RequestBody, RequestConfig, merge};
use crate::error::{HttpError, Result};
use crate::interceptor::Interceptors;
use crate::request::{RequestBuilder, compose_url};
use crate::response::{HttpResponse, decode_body};
use crate::transport::{
    RawResponse, ReqwestTransport, Transport, TransportError, TransportRequest,
};

/// Asynchronous HTTP client with per-instance defaults and interceptor
/// chains.
///
/// Every request runs the same pipeline: the per-call config is merged
/// against the instance defaults, passed through the request interceptor
/// chain, dispatched over the transport with timeout/cancellation wiring,
/// normalized into an [`HttpResponse`], and passed through the response
/// interceptor chain. A failure at any stage short-circuits the rest and
/// surfaces as a single [`HttpError`] carrying the effective config.
///
/// Cloning is cheap; clones share defaults, interceptors, and transport.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    defaults: RwLock<RequestConfig>,
    interceptors: Interceptors,
    transport: Arc<dyn Transport>,
}

impl HttpClient {
    /// Client with empty defaults and the reqwest-backed transport.
    pub fn new() -> Self {
        Self::with_defaults(RequestConfig::default())
    }

    /// Client with the given defaults and the reqwest-backed transport.
    pub fn with_defaults(defaults: RequestConfig) -> Self {
        Self::with_transport(defaults, Arc::new(ReqwestTransport::new()))
    }

    /// Client with the given defaults and a custom transport.
    pub fn with_transport(defaults: RequestConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                defaults: RwLock::new(defaults),
                interceptors: Interceptors::new(),
                transport,
            }),
        }
    }

    /// Snapshot of the instance defaults.
    pub fn defaults(&self) -> RequestConfig {
        self.inner.defaults.read().clone()
    }

    /// Replace the instance defaults.
    pub fn set_defaults(&self, defaults: RequestConfig) {
        *self.inner.defaults.write() = defaults;
    }

    /// Mutate the instance defaults in place.
    pub fn update_defaults(&self, f: impl FnOnce(&mut RequestConfig)) {
        f(&mut self.inner.defaults.write());
    }

    /// The request and response interceptor chains.
    pub fn interceptors(&self) -> &Interceptors {
        &self.inner.interceptors
    }

    /// Derive a new client whose defaults are this instance's defaults
    /// merged with `config`. Interceptor chains start empty; the transport
    /// is shared.
    pub fn create(&self, config: RequestConfig) -> HttpClient {
        Self::with_transport(
            merge(&self.defaults(), &config),
            Arc::clone(&self.inner.transport),
        )
    }

    /// Create a GET request builder.
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::GET, url.into())
    }

    /// Create a POST request builder.
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::POST, url.into())
    }

    /// Create a PUT request builder.
    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PUT, url.into())
    }

    /// Create a PATCH request builder.
    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PATCH, url.into())
    }

    /// Create a DELETE request builder.
    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::DELETE, url.into())
    }

    /// Create a HEAD request builder.
    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::HEAD, url.into())
    }

    /// Create an OPTIONS request builder.
    pub fn options(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::OPTIONS, url.into())
    }

    /// Run a config through the full pipeline.
    ///
    /// The caller's config is merged against the instance defaults; the
    /// caller's value is never mutated. Every error leaving this method
    /// carries the effective config.
    pub async fn request(&self, config: RequestConfig) -> Result<HttpResponse> {
        let effective = merge(&self.defaults(), &config);
        debug!(method = ?effective.method, url = %effective.url, "dispatching request");

        match self.run_pipeline(effective.clone()).await {
            Ok(response) => Ok(response),
            Err(error) => {
                let error = error.with_config(&effective);
                warn!(error = %error, url = %effective.url, "request failed");
                Err(error)
            }
        }
    }

    async fn run_pipeline(&self, effective: RequestConfig) -> Result<HttpResponse> {
        let config = self.inner.interceptors.request.run(effective).await?;
        let response = self.execute(config).await?;
        self.inner.interceptors.response.run(response).await
    }

    /// Perform the network exchange for an effective config.
    async fn execute(&self, config: RequestConfig) -> Result<HttpResponse> {
        let url = compose_url(&config).map_err(|e| e.with_config(&config))?;
        let request = build_transport_request(&config, url).map_err(|e| e.with_config(&config))?;

        let transport = Arc::clone(&self.inner.transport);
        let progress = config.on_download_progress.clone();
        let exchange = async move {
            let raw = transport.fetch(request).await?;
            let RawResponse {
                status,
                headers,
                content_length,
                body,
            } = raw;
            let bytes = collect_body(body, content_length, progress).await?;
            Ok::<_, TransportError>((status, headers, bytes))
        };

        let outcome = if let Some(token) = &config.cancel {
            // A caller-supplied token is authoritative; no internal timer
            // is armed even when a timeout is also configured.
            tokio::select! {
                result = exchange => Outcome::Done(result),
                _ = token.cancelled() => Outcome::Aborted,
            }
        } else if let Some(timeout) = effective_timeout(&config) {
            match tokio::time::timeout(timeout, exchange).await {
                Ok(result) => Outcome::Done(result),
                Err(_) => Outcome::TimedOut(timeout),
            }
        } else {
            Outcome::Done(exchange.await)
        };

        let (status, headers, bytes) = match outcome {
            Outcome::Done(Ok(parts)) => parts,
            Outcome::Done(Err(error)) => {
                return Err(HttpError::Transport {
                    message: error.to_string(),
                    config: Some(Box::new(config)),
                });
            }
            Outcome::Aborted => {
                return Err(HttpError::Cancelled {
                    config: Some(Box::new(config)),
                });
            }
            Outcome::TimedOut(timeout) => {
                return Err(HttpError::Timeout {
                    timeout,
                    config: Some(Box::new(config)),
                });
            }
        };

        normalize(config, status, headers, bytes)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

enum Outcome {
    Done(std::result::Result<(StatusCode, HeaderMap, Bytes), TransportError>),
    Aborted,
    TimedOut(Duration),
}

fn effective_timeout(config: &RequestConfig) -> Option<Duration> {
    config.timeout.filter(|t| !t.is_zero())
}

/// Serialize the body and assemble the wire-ready request.
///
/// JSON, text, and form bodies are encoded here and receive a matching
/// `Content-Type` unless the config already carries one; raw bytes pass
/// through untouched.
fn build_transport_request(config: &RequestConfig, url: url::Url) -> Result<TransportRequest> {
    let mut headers: Vec<(String, String)> = config
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    let has_content_type = config
        .headers
        .keys()
        .any(|name| name.eq_ignore_ascii_case("content-type"));

    let body = match &config.body {
        None => None,
        Some(RequestBody::Json(value)) => {
            if !has_content_type {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
            }
            Some(Bytes::from(serde_json::to_vec(value)?))
        }
        Some(RequestBody::Text(text)) => {
            if !has_content_type {
                headers.push((
                    "Content-Type".to_string(),
                    "text/plain; charset=utf-8".to_string(),
                ));
            }
            Some(Bytes::copy_from_slice(text.as_bytes()))
        }
        Some(RequestBody::Bytes(bytes)) => Some(bytes.clone()),
        Some(RequestBody::Form(fields)) => {
            if !has_content_type {
                headers.push((
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ));
            }
            let encoded = serde_urlencoded::to_string(fields)
                .map_err(|e| HttpError::unknown(e.to_string()))?;
            Some(Bytes::from(encoded))
        }
    };

    Ok(TransportRequest {
        method: config.method.clone().unwrap_or(Method::GET),
        url,
        headers,
        body,
    })
}

/// Collect the one-shot body stream, driving the progress callback as
/// chunks arrive.
async fn collect_body(
    mut body: BoxStream<'static, std::result::Result<Bytes, TransportError>>,
    content_length: Option<u64>,
    progress: Option<ProgressCallback>,
) -> std::result::Result<Bytes, TransportError> {
    let mut buf = BytesMut::with_capacity(content_length.unwrap_or(0).min(64 * 1024) as usize);
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        buf.extend_from_slice(&chunk);
        if let Some(callback) = &progress {
            callback(Progress {
                loaded: buf.len() as u64,
                total: content_length,
            });
        }
    }
    Ok(buf.freeze())
}

/// Classify a completed exchange and decode its body.
///
/// Success statuses decode strictly; failure statuses decode best-effort,
/// with decode errors swallowed and the body recorded as absent.
fn normalize(
    config: RequestConfig,
    status: StatusCode,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<HttpResponse> {
    let response_type = config.response_type.unwrap_or_default();
    let status_text = status
        .canonical_reason()
        .unwrap_or_default()
        .to_string();

    if status.is_success() {
        let body = decode_body(status, response_type, &bytes).map_err(|e| e.with_config(&config))?;
        Ok(HttpResponse {
            body,
            status,
            status_text,
            headers,
            config,
        })
    } else {
        let body = decode_body(status, response_type, &bytes).ok();
        Err(HttpError::Protocol {
            status,
            status_text,
            headers,
            body,
            config: Some(Box::new(config)),
        })
    }
}
