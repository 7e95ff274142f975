//! Request configuration and merging.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use serde::Serialize;
use serde_json::Value;

use crate::cancel::CancelToken;

/// Download progress report passed to a progress callback.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    /// Bytes received so far.
    pub loaded: u64,
    /// Total bytes expected, when the transport reported a content length.
    pub total: Option<u64>,
}

/// Callback invoked as response body chunks arrive.
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// How a response body is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// Parse the body as JSON. The default.
    #[default]
    Json,
    /// Return the body as UTF-8 text.
    Text,
    /// Return the raw body bytes.
    Bytes,
}

/// Request body payload.
///
/// Serialization happens when the request is dispatched: JSON and form
/// bodies are encoded there and receive a `Content-Type` header unless the
/// config already carries one; raw bytes pass through untouched.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// A JSON value.
    Json(Value),
    /// Plain text.
    Text(String),
    /// Raw bytes.
    Bytes(Bytes),
    /// URL-encoded form fields.
    Form(Vec<(String, String)>),
}

impl RequestBody {
    /// Build a JSON body from any serializable value.
    pub fn json<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

/// Request configuration.
///
/// A partially specified config: unset fields fall back to the instance
/// defaults during [`merge`], then to the documented per-field defaults.
/// The pipeline never mutates a caller's config in place — every stage
/// derives a new value from the previous one.
#[derive(Clone, Default)]
pub struct RequestConfig {
    /// Base URL prepended to relative request URLs. Default: none.
    pub base_url: Option<String>,
    /// Request URL, joined onto `base_url` unless absolute. Default: empty.
    pub url: String,
    /// HTTP method. Default: GET.
    pub method: Option<Method>,
    /// Header map. Keys are kept case-sensitive as supplied and merged
    /// key-by-key, later writes winning. Default: empty.
    pub headers: BTreeMap<String, String>,
    /// Query parameters in insertion order. `Value::Null` entries are
    /// omitted from the composed URL. Default: empty.
    pub params: Vec<(String, Value)>,
    /// Request body. Default: none.
    pub body: Option<RequestBody>,
    /// Per-request timeout. `None` or zero disables it. Default: none.
    pub timeout: Option<Duration>,
    /// Response body decoding mode. Default: [`ResponseType::Json`].
    pub response_type: Option<ResponseType>,
    /// External cancellation handle. When supplied it is authoritative and
    /// no internal timeout timer is armed. Default: none.
    pub cancel: Option<CancelToken>,
    /// Download progress callback. Default: none.
    pub on_download_progress: Option<ProgressCallback>,
}

impl RequestConfig {
    /// Config targeting the given URL, everything else unset.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the base URL.
    pub fn base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = Some(base.into());
        self
    }

    /// Set the request URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Add a header, replacing any previous value for the same key.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Append a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a JSON request body from any serializable value.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => self.body = Some(RequestBody::Json(json)),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize JSON body");
            }
        }
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the response decoding mode.
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    /// Attach an external cancellation token.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Attach a download progress callback.
    pub fn on_download_progress(mut self, f: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.on_download_progress = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("base_url", &self.base_url)
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("response_type", &self.response_type)
            .field("cancel", &self.cancel.is_some())
            .field("on_download_progress", &self.on_download_progress.is_some())
            .finish()
    }
}

/// Merge instance defaults with per-call overrides.
///
/// Headers are merged key-by-key with `overrides` winning ties. Every other
/// field is replaced wholesale when the override supplies it: a non-empty
/// `url`, non-empty `params`, and any `Some` scalar take precedence over the
/// default. After merging, `method` and `response_type` are resolved to GET
/// and JSON when neither side set them. Pure function, no failure mode.
pub fn merge(defaults: &RequestConfig, overrides: &RequestConfig) -> RequestConfig {
    let mut headers = defaults.headers.clone();
    for (name, value) in &overrides.headers {
        headers.insert(name.clone(), value.clone());
    }

    RequestConfig {
        base_url: overrides
            .base_url
            .clone()
            .or_else(|| defaults.base_url.clone()),
        url: if overrides.url.is_empty() {
            defaults.url.clone()
        } else {
            overrides.url.clone()
        },
        method: overrides
            .method
            .clone()
            .or_else(|| defaults.method.clone())
            .or(Some(Method::GET)),
        headers,
        params: if overrides.params.is_empty() {
            defaults.params.clone()
        } else {
            overrides.params.clone()
        },
        body: overrides.body.clone().or_else(|| defaults.body.clone()),
        timeout: overrides.timeout.or(defaults.timeout),
        response_type: overrides
            .response_type
            .or(defaults.response_type)
            .or(Some(ResponseType::Json)),
        cancel: overrides.cancel.clone().or_else(|| defaults.cancel.clone()),
        on_download_progress: overrides
            .on_download_progress
            .clone()
            .or_else(|| defaults.on_download_progress.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overlays_headers_with_override_winning() {
        let defaults = RequestConfig::default()
            .header("Accept", "application/json")
            .header("X-Tenant", "alpha");
        let overrides = RequestConfig::default()
            .header("X-Tenant", "beta")
            .header("X-Trace", "abc");

        let effective = merge(&defaults, &overrides);

        assert_eq!(
            effective.headers.get("Accept").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(
            effective.headers.get("X-Tenant").map(String::as_str),
            Some("beta")
        );
        assert_eq!(
            effective.headers.get("X-Trace").map(String::as_str),
            Some("abc")
        );
    }

    #[test]
    fn test_merge_replaces_non_header_fields() {
        let defaults = RequestConfig::new("/old")
            .base_url("https://default.example.com")
            .param("page", 1)
            .timeout(Duration::from_secs(30));
        let overrides = RequestConfig::new("/new")
            .param("id", 7)
            .timeout(Duration::from_secs(5));

        let effective = merge(&defaults, &overrides);

        assert_eq!(effective.url, "/new");
        assert_eq!(effective.base_url.as_deref(), Some("https://default.example.com"));
        assert_eq!(effective.params, vec![("id".to_string(), json!(7))]);
        assert_eq!(effective.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_merge_resolves_documented_defaults() {
        let effective = merge(&RequestConfig::default(), &RequestConfig::default());

        assert_eq!(effective.method, Some(Method::GET));
        assert_eq!(effective.response_type, Some(ResponseType::Json));
        assert!(effective.timeout.is_none());
    }

    #[test]
    fn test_merge_keeps_default_url_when_override_unset() {
        let defaults = RequestConfig::new("/health").method(Method::HEAD);
        let effective = merge(&defaults, &RequestConfig::default());

        assert_eq!(effective.url, "/health");
        assert_eq!(effective.method, Some(Method::HEAD));
    }

    #[test]
    fn test_merge_does_not_mutate_inputs() {
        let defaults = RequestConfig::default().header("A", "1");
        let overrides = RequestConfig::default().header("A", "2");

        let _ = merge(&defaults, &overrides);

        assert_eq!(defaults.headers.get("A").map(String::as_str), Some("1"));
        assert_eq!(overrides.headers.get("A").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_body_conversions() {
        assert!(matches!(RequestBody::from(json!({"a": 1})), RequestBody::Json(_)));
        assert!(matches!(RequestBody::from("hello"), RequestBody::Text(_)));
        assert!(matches!(
            RequestBody::from(vec![1u8, 2, 3]),
            RequestBody::Bytes(_)
        ));
    }
}
