//! Error taxonomy shared by the HTTP and WebSocket sessions.
//!
//! DESIGN
//! ======
//! HTTP failures are a single `ApiError` value whose `status_code` is either
//! a literal HTTP status or one of two negative sentinels (`-1` decode,
//! `-2` unknown/transport). WebSocket failures are a `WsError` enum.
//! `BuildError` is a programmer error raised while materializing a request
//! and never surfaces as an `ApiError` classification of its own.
//!
//! Every error implements [`ErrorCode`] so callers can log or branch on a
//! stable code instead of parsing messages.

use serde::{Serialize, Serializer};
use tokio_tungstenite::tungstenite;

// =============================================================================
// ERROR CODE
// =============================================================================

/// Stable, grepable code plus a retry hint for an error value.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// API ERROR
// =============================================================================

/// Coarse classification of an [`ApiError`], derived from its status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// No HTTP response was received (sentinel `-2`).
    Transport,
    /// A 2xx body did not decode into the expected type (sentinel `-1`).
    Decode,
    /// The server answered with a non-2xx status.
    Service,
}

/// Failure of an HTTP call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("Url: {url}\nStatus code: {status_code}\nMessage: {message}")]
pub struct ApiError {
    /// Absolute URL of the failed request; empty when the failure happened
    /// before a URL existed.
    pub url: String,
    /// Literal HTTP status, or [`ApiError::PARSE_DATA`] / [`ApiError::UNKNOWN`].
    pub status_code: i32,
    /// Raw response body for service errors.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_lossy")]
    pub data: Option<Vec<u8>>,
    pub message: String,
}

impl ApiError {
    /// Sentinel status for a response body that failed to decode.
    pub const PARSE_DATA: i32 = -1;
    /// Sentinel status for a failure with no HTTP response.
    pub const UNKNOWN: i32 = -2;

    /// Response body could not be decoded into the expected type.
    #[must_use]
    pub fn parse_data(url: &str, err: &impl std::fmt::Display) -> Self {
        Self {
            url: url.to_owned(),
            status_code: Self::PARSE_DATA,
            data: None,
            message: format!("Parse data error: {err}"),
        }
    }

    /// Unclassified failure. Used by the catch-all mapping step.
    #[must_use]
    pub fn unknown(url: &str) -> Self {
        Self { url: url.to_owned(), status_code: Self::UNKNOWN, data: None, message: "Unknown error".to_owned() }
    }

    /// Transport failure (DNS, connect, TLS, timeout) with no HTTP response.
    #[must_use]
    pub fn transport(url: &str, err: &impl std::fmt::Display) -> Self {
        Self { url: url.to_owned(), status_code: Self::UNKNOWN, data: None, message: err.to_string() }
    }

    /// Non-2xx HTTP response.
    #[must_use]
    pub fn service(url: &str, status: u16, data: Vec<u8>) -> Self {
        Self {
            url: url.to_owned(),
            status_code: i32::from(status),
            data: Some(data),
            message: "Service error".to_owned(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ApiErrorKind {
        match self.status_code {
            Self::PARSE_DATA => ApiErrorKind::Decode,
            code if code < 0 => ApiErrorKind::Transport,
            _ => ApiErrorKind::Service,
        }
    }
}

impl ErrorCode for ApiError {
    fn error_code(&self) -> &'static str {
        match self.kind() {
            ApiErrorKind::Transport => "E_TRANSPORT",
            ApiErrorKind::Decode => "E_DECODE",
            ApiErrorKind::Service => "E_SERVICE",
        }
    }

    fn retryable(&self) -> bool {
        match self.kind() {
            ApiErrorKind::Transport => true,
            ApiErrorKind::Decode => false,
            ApiErrorKind::Service => matches!(self.status_code, 408 | 429 | 500..=599),
        }
    }
}

#[allow(clippy::ref_option)]
fn serialize_lossy<S: Serializer>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match data {
        Some(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
        None => serializer.serialize_none(),
    }
}

// =============================================================================
// BUILD ERROR
// =============================================================================

/// A request spec that cannot be turned into a wire request.
///
/// These reflect a misconfigured call site, not a runtime condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// The base URL is empty or not an absolute URL.
    #[error("impossible to form base URL from {0:?}")]
    InvalidBaseUrl(String),
    /// Composition produced a string that no longer parses as a URL.
    #[error("unable to retrieve final URL from {0:?}")]
    InvalidFinalUrl(String),
    /// A header name or value is not legal on the wire.
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },
    /// The method token was rejected by the HTTP stack.
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
}

impl ErrorCode for BuildError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidBaseUrl(_) => "E_INVALID_BASE_URL",
            Self::InvalidFinalUrl(_) => "E_INVALID_FINAL_URL",
            Self::InvalidHeader { .. } => "E_INVALID_HEADER",
            Self::InvalidMethod(_) => "E_INVALID_METHOD",
        }
    }
}

// =============================================================================
// WEBSOCKET ERROR
// =============================================================================

/// Failure of a WebSocket operation.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    /// `send` was called without a payload.
    #[error("no message supplied")]
    EmptyMessage,
    /// A typed payload could not be JSON-encoded.
    #[error("data encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    /// The session address is not a valid URL.
    #[error("invalid websocket URL: {0}")]
    InvalidUrl(String),
    /// No socket is open (never connected, handshake pending, or torn down).
    #[error("websocket not connected")]
    NotConnected,
    /// The opening handshake failed.
    #[error("websocket connect failed: {0}")]
    Connect(Box<tungstenite::Error>),
    /// A frame could not be written to the socket.
    #[error("websocket send failed: {0}")]
    Send(Box<tungstenite::Error>),
    /// Reading from the socket failed. Terminal for the connection.
    #[error("websocket receive failed: {0}")]
    Receive(Box<tungstenite::Error>),
    /// The peer closed the connection. Terminal for the connection.
    #[error("websocket closed")]
    Closed,
}

impl ErrorCode for WsError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyMessage => "E_WS_EMPTY_MESSAGE",
            Self::Encode(_) => "E_WS_ENCODE",
            Self::InvalidUrl(_) => "E_WS_INVALID_URL",
            Self::NotConnected => "E_WS_NOT_CONNECTED",
            Self::Connect(_) => "E_WS_CONNECT",
            Self::Send(_) => "E_WS_SEND",
            Self::Receive(_) => "E_WS_RECEIVE",
            Self::Closed => "E_WS_CLOSED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Connect(_) | Self::Send(_) | Self::Receive(_) | Self::Closed)
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
