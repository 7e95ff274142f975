//! Error types for the request pipeline.

use std::time::Duration;

use http::{HeaderMap, StatusCode};
use thiserror::Error;

use crate::config::RequestConfig;
use crate::response::ResponseBody;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, HttpError>;

/// Errors produced by the request pipeline.
///
/// The variant is decided at the point of failure, never inferred later
/// from the error's shape. Every error reaching a caller carries the
/// effective [`RequestConfig`] of the exchange that produced it; the
/// pipeline attaches it before returning, so [`config`](Self::config) is
/// only `None` for errors still in flight inside an interceptor chain.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The exchange could not be completed at all. No status is available.
    #[error("network error: {message}")]
    Transport {
        /// Description of the underlying failure.
        message: String,
        /// Effective config of the failed exchange.
        config: Option<Box<RequestConfig>>,
    },

    /// A response arrived with a status outside the success range.
    #[error("request failed with status {status}")]
    Protocol {
        /// HTTP status code.
        status: StatusCode,
        /// Canonical reason phrase for the status.
        status_text: String,
        /// Response headers.
        headers: HeaderMap,
        /// Best-effort decoded error body; `None` when decoding failed.
        body: Option<ResponseBody>,
        /// Effective config of the failed exchange.
        config: Option<Box<RequestConfig>>,
    },

    /// A caller-supplied cancellation token fired.
    #[error("request aborted")]
    Cancelled {
        /// Effective config of the aborted exchange.
        config: Option<Box<RequestConfig>>,
    },

    /// The per-request timer fired before the transport completed.
    #[error("timeout of {}ms exceeded", timeout.as_millis())]
    Timeout {
        /// The configured timeout.
        timeout: Duration,
        /// Effective config of the timed-out exchange.
        config: Option<Box<RequestConfig>>,
    },

    /// A success response body could not be decoded as the declared type.
    #[error("decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
        /// Effective config of the exchange.
        config: Option<Box<RequestConfig>>,
    },

    /// Any other failure, normalized so callers never see a raw foreign
    /// value.
    #[error("an unknown error occurred: {message}")]
    Unknown {
        /// Description of the failure.
        message: String,
        /// Effective config of the exchange, when one exists.
        config: Option<Box<RequestConfig>>,
    },
}

impl HttpError {
    /// Transport-level failure with no config attached yet.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            config: None,
        }
    }

    /// Unknown failure with no config attached yet.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
            config: None,
        }
    }

    /// The HTTP status code, for protocol failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The decoded error body, for protocol failures where decoding
    /// succeeded.
    pub fn response_body(&self) -> Option<&ResponseBody> {
        match self {
            Self::Protocol { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// The response headers, for protocol failures.
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            Self::Protocol { headers, .. } => Some(headers),
            _ => None,
        }
    }

    /// The effective config of the exchange that produced this error.
    pub fn config(&self) -> Option<&RequestConfig> {
        match self {
            Self::Transport { config, .. }
            | Self::Protocol { config, .. }
            | Self::Cancelled { config, .. }
            | Self::Timeout { config, .. }
            | Self::Decode { config, .. }
            | Self::Unknown { config, .. } => config.as_deref(),
        }
    }

    /// Whether this is a timeout failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this is a cancellation failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether this is a transport-level failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Whether this is a protocol-level failure.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Attach the effective config unless one is already present.
    pub(crate) fn with_config(mut self, effective: &RequestConfig) -> Self {
        let slot = self.config_slot();
        if slot.is_none() {
            *slot = Some(Box::new(effective.clone()));
        }
        self
    }

    fn config_slot(&mut self) -> &mut Option<Box<RequestConfig>> {
        match self {
            Self::Transport { config, .. }
            | Self::Protocol { config, .. }
            | Self::Cancelled { config, .. }
            | Self::Timeout { config, .. }
            | Self::Decode { config, .. }
            | Self::Unknown { config, .. } => config,
        }
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(e: serde_json::Error) -> Self {
        Self::unknown(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_duration() {
        let err = HttpError::Timeout {
            timeout: Duration::from_millis(250),
            config: None,
        };
        assert_eq!(err.to_string(), "timeout of 250ms exceeded");
    }

    #[test]
    fn test_cancelled_message() {
        let err = HttpError::Cancelled { config: None };
        assert_eq!(err.to_string(), "request aborted");
    }

    #[test]
    fn test_status_only_on_protocol_errors() {
        let err = HttpError::Protocol {
            status: StatusCode::NOT_FOUND,
            status_text: "Not Found".to_string(),
            headers: HeaderMap::new(),
            body: None,
            config: None,
        };
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert!(HttpError::transport("boom").status().is_none());
    }

    #[test]
    fn test_with_config_attaches_once() {
        let first = RequestConfig::new("/first");
        let second = RequestConfig::new("/second");

        let err = HttpError::transport("unreachable").with_config(&first);
        assert_eq!(err.config().map(|c| c.url.as_str()), Some("/first"));

        // A second attachment never overwrites the original.
        let err = err.with_config(&second);
        assert_eq!(err.config().map(|c| c.url.as_str()), Some("/first"));
    }
}
