//! # Gantry
//!
//! An async HTTP client with per-instance defaults, request/response
//! interceptor chains, URL/query construction, and timeout/cancellation
//! support over a pluggable transport.
//!
//! ## Features
//!
//! - **Instance defaults**: base URL, headers, timeout, and decoding mode
//!   merged into every call, with header-level deep merge
//! - **Interceptors**: ordered request/response handler chains with
//!   recovery and short-circuit semantics, stable ejection handles
//! - **Timeouts & cancellation**: per-request timers or caller-held
//!   [`CancelToken`]s, classified distinctly
//! - **Typed errors**: transport, protocol, timeout, cancellation, and
//!   decode failures are separate [`HttpError`] variants, each carrying the
//!   effective request config
//! - **Pluggable transport**: reqwest-backed by default, mockable for tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gantry::{HttpClient, RequestConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::with_defaults(
//!         RequestConfig::default().base_url("https://api.example.com"),
//!     );
//!
//!     let response = client
//!         .get("/users")
//!         .param("active", true)
//!         .send()
//!         .await?;
//!
//!     println!("status: {}", response.status);
//!     Ok(())
//! }
//! ```
//!
//! ## With Interceptors
//!
//! ```rust,no_run
//! use gantry::{AuthInterceptor, FnInterceptor, HttpClient, HttpResponse, RequestConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::new();
//!
//!     client
//!         .interceptors()
//!         .request
//!         .add(AuthInterceptor::bearer("token"));
//!
//!     let handle = client.interceptors().response.add(
//!         FnInterceptor::new().fulfilled(|response: HttpResponse| async move {
//!             tracing::debug!(status = %response.status, "exchange finished");
//!             Ok(response)
//!         }),
//!     );
//!
//!     let response = client
//!         .request(RequestConfig::new("https://api.example.com/orders"))
//!         .await?;
//!     println!("{:?}", response.body);
//!
//!     client.interceptors().response.eject(handle);
//!     Ok(())
//! }
//! ```

mod cancel;
mod client;
mod config;
mod error;
mod interceptor;
mod request;
mod response;
mod transport;

pub use cancel::CancelToken;
pub use client::HttpClient;
pub use config::{Progress, ProgressCallback, RequestBody, RequestConfig, ResponseType, merge};
pub use error::{HttpError, Result};
pub use interceptor::{
    AuthInterceptor, FnInterceptor, Interceptor, InterceptorChain, InterceptorId, Interceptors,
    LoggingInterceptor,
};
pub use request::RequestBuilder;
pub use response::{HttpResponse, ResponseBody};
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportError, TransportRequest};

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use gantry::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::client::HttpClient;
    pub use crate::config::{RequestBody, RequestConfig, ResponseType, merge};
    pub use crate::error::{HttpError, Result};
    pub use crate::interceptor::{
        AuthInterceptor, FnInterceptor, Interceptor, InterceptorChain, InterceptorId,
        LoggingInterceptor,
    };
    pub use crate::request::RequestBuilder;
    pub use crate::response::{HttpResponse, ResponseBody};
    pub use crate::transport::{RawResponse, Transport, TransportError, TransportRequest};
    pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
}
