//! Declarative request description.
//!
//! A `RequestSpec` is plain data: it carries no behavior beyond defaults and
//! `with_*` builders. Materialization lives in `url_builder`, dispatch in
//! `http`.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

// =============================================================================
// METHOD
// =============================================================================

/// HTTP verb. `Update` is sent as the literal extension token `UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Update,
    Delete,
}

impl Method {
    pub const ALL: [Method; 5] = [Self::Get, Self::Post, Self::Put, Self::Update, Self::Delete];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// BODY
// =============================================================================

/// Request payload. Exactly one variant is active.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// No body is sent.
    #[default]
    None,
    /// A JSON object built from key/value pairs. Keys keep insertion order.
    Structured(serde_json::Map<String, serde_json::Value>),
    /// A serializable value, already converted to JSON.
    Encodable(serde_json::Value),
    /// Bytes sent unchanged.
    Raw(Vec<u8>),
}

impl Body {
    /// JSON object body from key/value pairs.
    pub fn structured<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        Self::Structured(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// JSON body from any serializable value.
    ///
    /// A value that fails to serialize becomes [`Body::None`]: the request is
    /// still built and sent, just without a payload.
    pub fn encodable<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => Self::Encodable(json),
            Err(e) => {
                warn!(error = %e, "http: body encoding failed; sending request without body");
                Self::None
            }
        }
    }

    /// Raw byte body.
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Raw(bytes.into())
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Wire bytes for this body, or `None` when nothing should be sent.
    pub(crate) fn to_bytes(&self) -> Option<Vec<u8>> {
        let encoded = match self {
            Self::None => return None,
            Self::Structured(map) => serde_json::to_vec(map),
            Self::Encodable(value) => serde_json::to_vec(value),
            Self::Raw(bytes) => return Some(bytes.clone()),
        };
        match encoded {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "http: body encoding failed; sending request without body");
                None
            }
        }
    }
}

// =============================================================================
// REQUEST SPEC
// =============================================================================

/// Everything needed to issue one HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub base_url: String,
    pub path: String,
    /// Query items. Order on the wire is unspecified.
    pub parameters: HashMap<String, String>,
    pub body: Body,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
    /// Accept any server certificate for this call only.
    pub skip_tls_validation: bool,
    /// Percent-encode the composed URL a second time (see `url_builder`).
    pub encode_url: bool,
}

impl RequestSpec {
    /// A spec with the default headers (`Content-Type: application/json`),
    /// a 60 second timeout, TLS validation on, and URL encoding on.
    pub fn new(method: Method, base_url: impl Into<String>, path: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_owned(), DEFAULT_CONTENT_TYPE.to_owned());
        Self {
            method,
            base_url: base_url.into(),
            path: path.into(),
            parameters: HashMap::new(),
            body: Body::None,
            headers,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            skip_tls_validation: false,
            encode_url: true,
        }
    }

    pub fn get(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Method::Get, base_url, path)
    }

    pub fn post(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Method::Post, base_url, path)
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Replace all query items.
    #[must_use]
    pub fn with_parameters(mut self, parameters: HashMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Replace all headers, including the default `Content-Type`.
    #[must_use]
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_skip_tls_validation(mut self, skip: bool) -> Self {
        self.skip_tls_validation = skip;
        self
    }

    #[must_use]
    pub fn with_encode_url(mut self, encode: bool) -> Self {
        self.encode_url = encode;
        self
    }
}

// =============================================================================
// ENDPOINT
// =============================================================================

/// A typed request: knows how to describe itself and what it decodes into.
///
/// ```
/// use api_request::{Endpoint, RequestSpec};
///
/// struct TopAnime;
///
/// #[derive(serde::Deserialize)]
/// struct Page {
///     data: Vec<serde_json::Value>,
/// }
///
/// impl Endpoint for TopAnime {
///     type Response = Page;
///
///     fn spec(&self) -> RequestSpec {
///         RequestSpec::get("https://api.jikan.moe", "/v4/top/anime")
///     }
/// }
/// ```
pub trait Endpoint {
    type Response: DeserializeOwned;

    fn spec(&self) -> RequestSpec;
}

#[cfg(test)]
#[path = "request_test.rs"]
mod tests;
