//! Request and response interceptor chains.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;

use crate::config::RequestConfig;
use crate::error::{HttpError, Result};
use crate::response::HttpResponse;

/// Stable handle identifying a registered interceptor.
///
/// Handles are monotonic and never reused, so ejecting one entry cannot
/// change which interceptor a previously issued handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorId(u64);

/// A fulfillment/rejection handler pair applied to pipeline values.
///
/// `on_fulfilled` may transform the value or reject; `on_rejected` may
/// recover by returning a replacement value, or re-reject. The defaults
/// pass the value through and re-raise the error respectively, so an
/// implementation only overrides the side it cares about.
#[async_trait]
pub trait Interceptor<T: Send + 'static>: Send + Sync {
    /// Invoked on the success path with the current value.
    async fn on_fulfilled(&self, value: T) -> Result<T> {
        Ok(value)
    }

    /// Invoked when this interceptor's own fulfillment handler rejects.
    /// Returning `Ok` recovers the chain; returning `Err` short-circuits
    /// every remaining interceptor.
    async fn on_rejected(&self, error: HttpError) -> Result<T> {
        Err(error)
    }
}

struct Entry<T: Send + 'static> {
    id: InterceptorId,
    interceptor: Arc<dyn Interceptor<T>>,
}

/// Ordered interceptor registry.
///
/// Entries run strictly sequentially in registration order. Registration
/// needs only `&self`; the chain contents are snapshotted when a run
/// starts, so topology changes made while a request is in flight apply to
/// later requests only.
pub struct InterceptorChain<T: Send + 'static> {
    entries: RwLock<Vec<Entry<T>>>,
    next_id: AtomicU64,
}

impl<T: Send + 'static> InterceptorChain<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register an interceptor at the end of the chain and return its
    /// handle.
    pub fn add(&self, interceptor: impl Interceptor<T> + 'static) -> InterceptorId {
        let id = InterceptorId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push(Entry {
            id,
            interceptor: Arc::new(interceptor),
        });
        id
    }

    /// Remove the interceptor registered under `id`. Removing an unknown
    /// or already-ejected handle is a no-op.
    pub fn eject(&self, id: InterceptorId) {
        self.entries.write().retain(|entry| entry.id != id);
    }

    /// Remove every registered interceptor.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of registered interceptors.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Run `initial` through the chain.
    ///
    /// For each interceptor in registration order: the fulfillment handler
    /// receives the current value; if it rejects, the same interceptor's
    /// rejection handler gets one chance to recover. An unrecovered
    /// rejection short-circuits the remaining chain — no later interceptor
    /// runs at all.
    pub(crate) async fn run(&self, initial: T) -> Result<T> {
        let snapshot: Vec<Arc<dyn Interceptor<T>>> = self
            .entries
            .read()
            .iter()
            .map(|entry| Arc::clone(&entry.interceptor))
            .collect();

        let mut current = initial;
        for interceptor in snapshot {
            match interceptor.on_fulfilled(current).await {
                Ok(value) => current = value,
                Err(error) => match interceptor.on_rejected(error).await {
                    Ok(recovered) => current = recovered,
                    Err(error) => return Err(error),
                },
            }
        }
        Ok(current)
    }
}

/// The two interceptor chains owned by a client instance.
pub struct Interceptors {
    /// Applied to outgoing request configs.
    pub request: InterceptorChain<RequestConfig>,
    /// Applied to incoming responses.
    pub response: InterceptorChain<HttpResponse>,
}

impl Interceptors {
    pub(crate) fn new() -> Self {
        Self {
            request: InterceptorChain::new(),
            response: InterceptorChain::new(),
        }
    }
}

type FulfilledHandler<T> = Box<dyn Fn(T) -> BoxFuture<'static, Result<T>> + Send + Sync>;
type RejectedHandler<T> = Box<dyn Fn(HttpError) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Interceptor assembled from plain closures, for call sites that do not
/// want a dedicated type.
///
/// ```
/// use gantry::{FnInterceptor, RequestConfig};
///
/// let interceptor = FnInterceptor::new()
///     .fulfilled(|config: RequestConfig| async move {
///         Ok(config.header("X-Trace", "abc"))
///     });
/// # let _ = interceptor;
/// ```
pub struct FnInterceptor<T: Send + 'static> {
    fulfilled: Option<FulfilledHandler<T>>,
    rejected: Option<RejectedHandler<T>>,
}

impl<T: Send + 'static> FnInterceptor<T> {
    /// Interceptor with both handlers unset (full pass-through).
    pub fn new() -> Self {
        Self {
            fulfilled: None,
            rejected: None,
        }
    }

    /// Set the fulfillment handler.
    pub fn fulfilled<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.fulfilled = Some(Box::new(move |value| Box::pin(f(value))));
        self
    }

    /// Set the rejection handler.
    pub fn rejected<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HttpError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.rejected = Some(Box::new(move |error| Box::pin(f(error))));
        self
    }
}

impl<T: Send + 'static> Default for FnInterceptor<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send + 'static> Interceptor<T> for FnInterceptor<T> {
    async fn on_fulfilled(&self, value: T) -> Result<T> {
        match &self.fulfilled {
            Some(f) => f(value).await,
            None => Ok(value),
        }
    }

    async fn on_rejected(&self, error: HttpError) -> Result<T> {
        match &self.rejected {
            Some(f) => f(error).await,
            None => Err(error),
        }
    }
}

/// Logs outgoing configs and incoming responses.
pub struct LoggingInterceptor {
    log_headers: bool,
}

impl LoggingInterceptor {
    /// Logging interceptor without header logging.
    pub fn new() -> Self {
        Self { log_headers: false }
    }

    /// Enable logging of headers at trace level.
    pub fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }
}

impl Default for LoggingInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Interceptor<RequestConfig> for LoggingInterceptor {
    async fn on_fulfilled(&self, config: RequestConfig) -> Result<RequestConfig> {
        tracing::debug!(
            method = ?config.method,
            url = %config.url,
            "sending HTTP request"
        );

        if self.log_headers {
            for (name, value) in &config.headers {
                tracing::trace!(header = %name, value = %value, "request header");
            }
        }

        Ok(config)
    }
}

#[async_trait]
impl Interceptor<HttpResponse> for LoggingInterceptor {
    async fn on_fulfilled(&self, response: HttpResponse) -> Result<HttpResponse> {
        tracing::debug!(status = %response.status, "received HTTP response");

        if self.log_headers {
            for (name, value) in &response.headers {
                tracing::trace!(header = %name, value = ?value, "response header");
            }
        }

        Ok(response)
    }
}

/// Adds authentication headers to outgoing configs.
pub struct AuthInterceptor {
    auth: AuthScheme,
}

enum AuthScheme {
    Bearer(String),
    Basic { username: String, password: String },
    ApiKey { header: String, key: String },
}

impl AuthInterceptor {
    /// Bearer token authentication.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            auth: AuthScheme::Bearer(token.into()),
        }
    }

    /// Basic authentication.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            auth: AuthScheme::Basic {
                username: username.into(),
                password: password.into(),
            },
        }
    }

    /// API key sent in a custom header.
    pub fn api_key(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            auth: AuthScheme::ApiKey {
                header: header.into(),
                key: key.into(),
            },
        }
    }
}

#[async_trait]
impl Interceptor<RequestConfig> for AuthInterceptor {
    async fn on_fulfilled(&self, mut config: RequestConfig) -> Result<RequestConfig> {
        match &self.auth {
            AuthScheme::Bearer(token) => {
                config
                    .headers
                    .insert("Authorization".to_string(), format!("Bearer {token}"));
            }
            AuthScheme::Basic { username, password } => {
                use base64::Engine;
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                config
                    .headers
                    .insert("Authorization".to_string(), format!("Basic {credentials}"));
            }
            AuthScheme::ApiKey { header, key } => {
                config.headers.insert(header.clone(), key.clone());
            }
        }

        Ok(config)
    }
}
