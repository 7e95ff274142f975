//! Request builder and URL composition.

use std::time::Duration;

use http::Method;
use serde::Serialize;
use serde_json::Value;

use crate::cancel::CancelToken;
use crate::client::HttpClient;
use crate::config::{Progress, RequestBody, RequestConfig, ResponseType, merge};
use crate::error::{HttpError, Result};
use crate::response::HttpResponse;

/// Fluent builder for a single request, created by the client's verb
/// shortcuts.
///
/// Fixes the method, layers per-call options onto a [`RequestConfig`], and
/// dispatches through the client pipeline on [`send`](Self::send).
pub struct RequestBuilder<'a> {
    client: &'a HttpClient,
    config: RequestConfig,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a HttpClient, method: Method, url: String) -> Self {
        Self {
            client,
            config: RequestConfig::new(url).method(method),
        }
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config = self.config.header(name, value);
        self
    }

    /// Append a query parameter. `Value::Null` parameters are dropped from
    /// the composed URL.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config = self.config.param(key, value);
        self
    }

    /// Append multiple query parameters.
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, value) in params {
            self.config = self.config.param(key, value);
        }
        self
    }

    /// Set a JSON request body.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        self.config = self.config.json(value);
        self
    }

    /// Set a URL-encoded form body.
    pub fn form<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.config = self.config.body(RequestBody::Form(fields));
        self
    }

    /// Set a plain text body.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.config = self.config.body(RequestBody::Text(text.into()));
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.config = self.config.body(body);
        self
    }

    /// Set a per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Set the response decoding mode.
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.config = self.config.response_type(response_type);
        self
    }

    /// Attach an external cancellation token. The token is authoritative:
    /// no internal timeout timer is armed for this request.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.config = self.config.cancel_token(token);
        self
    }

    /// Attach a download progress callback.
    pub fn on_download_progress(mut self, f: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.config = self.config.on_download_progress(f);
        self
    }

    /// Set bearer authentication.
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Set basic authentication.
    pub fn basic_auth(
        self,
        username: impl Into<String>,
        password: Option<impl Into<String>>,
    ) -> Self {
        use base64::Engine;
        let credentials = match password {
            Some(p) => format!("{}:{}", username.into(), p.into()),
            None => format!("{}:", username.into()),
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        self.header("Authorization", format!("Basic {encoded}"))
    }

    /// Merge a partial config into this request. Options set directly on
    /// the builder (including the verb's method and URL) win ties.
    pub fn with_config(mut self, config: RequestConfig) -> Self {
        self.config = merge(&config, &self.config);
        self
    }

    /// Dispatch the request through the client pipeline.
    pub async fn send(self) -> Result<HttpResponse> {
        self.client.request(self.config).await
    }
}

/// Compose the full request URL from the effective config.
///
/// An absolute `url` wins over `base_url`; otherwise the two are joined
/// with exactly one slash between them. Query parameters are appended in
/// insertion order, skipping `Null` values; strings append their text
/// unquoted and every other scalar its natural text form.
pub(crate) fn compose_url(config: &RequestConfig) -> Result<url::Url> {
    let target = match &config.base_url {
        Some(base) if !is_absolute(&config.url) => {
            let base = base.trim_end_matches('/');
            let path = config.url.trim_start_matches('/');
            if path.is_empty() {
                base.to_string()
            } else {
                format!("{base}/{path}")
            }
        }
        _ => config.url.clone(),
    };

    let mut url = url::Url::parse(&target).map_err(|e| HttpError::Transport {
        message: format!("invalid URL `{target}`: {e}"),
        config: None,
    })?;

    if config.params.iter().any(|(_, value)| !value.is_null()) {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &config.params {
            let text = match value {
                Value::Null => continue,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            pairs.append_pair(key, &text);
        }
    }

    Ok(url)
}

fn is_absolute(url: &str) -> bool {
    url.contains("://")
}
