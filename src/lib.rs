//! Typed network-request runtime.
//!
//! DESIGN
//! ======
//! A [`RequestSpec`] describes one HTTP call declaratively. [`RequestSpec::build`]
//! materializes it into a [`BuiltRequest`], and [`HttpSession`] dispatches it
//! and decodes the response, reporting every failure as an [`ApiError`].
//!
//! [`WsSession`] is the streaming sibling: one long-lived WebSocket with a
//! receive loop, a ping/pong liveness probe, and observable connection state.
//!
//! Nothing here is global. Sessions are plain values that callers construct
//! and pass to whoever needs them.

pub mod config;
pub mod error;
pub mod http;
pub mod request;
pub mod url_builder;
pub mod ws;

pub use config::{HttpConfig, WsConfig};
pub use error::{ApiError, ApiErrorKind, BuildError, ErrorCode, WsError};
pub use http::HttpSession;
pub use request::{Body, Endpoint, Method, RequestSpec};
pub use url_builder::BuiltRequest;
pub use ws::{ConnectionState, MessageStream, WsMessage, WsSession};

#[cfg(test)]
pub(crate) mod test_support;
