//! HTTP response wrapper and body decoding.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::{RequestConfig, ResponseType};
use crate::error::{HttpError, Result};

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Parsed JSON value.
    Json(Value),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Bytes),
    /// No body. Produced for 204 responses decoded in a non-JSON mode.
    Empty,
}

impl ResponseBody {
    /// The JSON value, when the body was decoded as JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The text, when the body was decoded as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The bytes, when the body was kept raw.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Whether there is no body.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// A completed HTTP exchange.
///
/// Constructed once by the pipeline, then threaded immutably through the
/// response interceptor chain; each interceptor may return a modified copy.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Decoded body.
    pub body: ResponseBody,
    /// HTTP status code.
    pub status: StatusCode,
    /// Canonical reason phrase for the status.
    pub status_text: String,
    /// Response headers.
    pub headers: HeaderMap,
    /// The effective configuration that produced this response.
    pub config: RequestConfig,
}

impl HttpResponse {
    /// Whether the status is in the success range (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// A specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// The content type, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// The content length, if present.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.parse().ok())
    }

    /// Deserialize the body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let result = match &self.body {
            ResponseBody::Json(value) => serde_json::from_value(value.clone()),
            ResponseBody::Text(text) => serde_json::from_str(text),
            ResponseBody::Bytes(bytes) => serde_json::from_slice(bytes),
            ResponseBody::Empty => serde_json::from_value(Value::Null),
        };
        result.map_err(|e| HttpError::Decode {
            message: e.to_string(),
            config: Some(Box::new(self.config.clone())),
        })
    }

    /// The body text, when decoded as text.
    pub fn text(&self) -> Option<&str> {
        self.body.as_text()
    }

    /// The body bytes, when kept raw.
    pub fn bytes(&self) -> Option<&Bytes> {
        self.body.as_bytes()
    }
}

/// Decode a collected body per the declared response type.
///
/// A 204 status short-circuits decoding regardless of how the response is
/// otherwise classified: JSON mode yields an empty object, every other mode
/// yields [`ResponseBody::Empty`]. Errors carry no config; the caller
/// attaches it.
pub(crate) fn decode_body(
    status: StatusCode,
    response_type: ResponseType,
    bytes: &Bytes,
) -> Result<ResponseBody> {
    if status == StatusCode::NO_CONTENT {
        return Ok(match response_type {
            ResponseType::Json => ResponseBody::Json(Value::Object(Map::new())),
            _ => ResponseBody::Empty,
        });
    }

    match response_type {
        ResponseType::Json => {
            if bytes.is_empty() {
                return Ok(ResponseBody::Json(Value::Object(Map::new())));
            }
            serde_json::from_slice(bytes)
                .map(ResponseBody::Json)
                .map_err(|e| HttpError::Decode {
                    message: e.to_string(),
                    config: None,
                })
        }
        ResponseType::Text => match std::str::from_utf8(bytes) {
            Ok(text) => Ok(ResponseBody::Text(text.to_owned())),
            Err(e) => Err(HttpError::Decode {
                message: e.to_string(),
                config: None,
            }),
        },
        ResponseType::Bytes => Ok(ResponseBody::Bytes(bytes.clone())),
    }
}
