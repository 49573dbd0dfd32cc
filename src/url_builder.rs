//! Materialize a [`RequestSpec`] into a wire-ready [`BuiltRequest`].
//!
//! URL COMPOSITION
//! ===============
//! 1. Trailing `/` on the base URL are stripped.
//! 2. A non-empty path gets a leading `/` if it lacks one, is
//!    percent-encoded with the path set, and is appended. An empty path
//!    leaves the base untouched.
//! 3. Parameters become `name=value` query items, each percent-encoded with
//!    the query-item set (a space becomes `%20`).
//! 4. With `encode_url`, the whole composed string is percent-encoded again
//!    with the query-allowed set. `%` is not in that set, so `%20` turns
//!    into `%2520`. Existing consumers depend on this double encoding.
//!
//! Pure: no I/O, no clock, no shared state.

use std::collections::HashMap;
use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::error::BuildError;
use crate::request::{Method, RequestSpec};

/// Characters left alone when escaping a whole URL: alphanumerics plus
/// `!$&'()*+,-./:;=?@_~`.
const QUERY_ALLOWED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b'-')
    .remove(b'.')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'?')
    .remove(b'@')
    .remove(b'_')
    .remove(b'~');

/// Query names and values additionally escape the pair delimiters `&` and
/// `=`. `+` and `?` pass through unchanged.
const QUERY_ITEM: &AsciiSet = &QUERY_ALLOWED.add(b'&').add(b'=');

/// Path segments: alphanumerics plus `!$&'()*+,-./:=@_~`.
const PATH_ALLOWED: &AsciiSet = &QUERY_ALLOWED.add(b';').add(b'?');

// =============================================================================
// BUILT REQUEST
// =============================================================================

/// The wire form of a [`RequestSpec`]. Produced once, never mutated.
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    /// Absolute URL exactly as it will be sent.
    pub url: String,
    pub method: reqwest::Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl BuiltRequest {
    /// Header value as text, if present and visible ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl RequestSpec {
    /// Materialize this spec.
    ///
    /// Body encoding failures never fail the build; they produce a request
    /// without a body.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when the base URL is empty or unparseable, or a
    /// header cannot be represented on the wire.
    pub fn build(&self) -> Result<BuiltRequest, BuildError> {
        let url = compose_url(&self.base_url, &self.path, &self.parameters, self.encode_url)?;
        Ok(BuiltRequest {
            url,
            method: http_method(self.method)?,
            headers: header_map(&self.headers)?,
            body: self.body.to_bytes(),
            timeout: self.timeout,
        })
    }
}

// =============================================================================
// COMPOSITION
// =============================================================================

/// Compose the absolute URL string for a request.
///
/// # Errors
///
/// Returns [`BuildError::InvalidBaseUrl`] for an empty or relative base, and
/// [`BuildError::InvalidFinalUrl`] if the composed string no longer parses.
pub fn compose_url(
    base_url: &str,
    path: &str,
    parameters: &HashMap<String, String>,
    encode_url: bool,
) -> Result<String, BuildError> {
    let base = base_url.trim_end_matches('/');
    if base.is_empty() || Url::parse(base).is_err() {
        return Err(BuildError::InvalidBaseUrl(base_url.to_owned()));
    }

    let mut composed = base.to_owned();
    if !path.is_empty() {
        if !path.starts_with('/') {
            composed.push('/');
        }
        composed.extend(utf8_percent_encode(path, PATH_ALLOWED));
    }

    if !parameters.is_empty() {
        let query = parameters
            .iter()
            .map(|(name, value)| {
                format!("{}={}", utf8_percent_encode(name, QUERY_ITEM), utf8_percent_encode(value, QUERY_ITEM))
            })
            .collect::<Vec<_>>()
            .join("&");
        composed.push('?');
        composed.push_str(&query);
    }

    if encode_url {
        composed = utf8_percent_encode(&composed, QUERY_ALLOWED).to_string();
    }

    if Url::parse(&composed).is_err() {
        return Err(BuildError::InvalidFinalUrl(composed));
    }
    Ok(composed)
}

fn http_method(method: Method) -> Result<reqwest::Method, BuildError> {
    reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|_| BuildError::InvalidMethod(method.as_str().to_owned()))
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, BuildError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| BuildError::InvalidHeader { name: name.clone(), reason: e.to_string() })?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| BuildError::InvalidHeader { name: name.clone(), reason: e.to_string() })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[cfg(test)]
#[path = "url_builder_test.rs"]
mod tests;
