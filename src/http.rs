//! HTTP session — dispatch a built request and classify the outcome.
//!
//! DESIGN
//! ======
//! `HttpSession` wraps a `reqwest::Client` (an `Arc` internally, so clones
//! are cheap and share the pool). Each call is a single attempt:
//!
//! - no response at all          → `ApiError` status `-2` (transport)
//! - 2xx                          → body, raw or JSON-decoded (`-1` on decode failure)
//! - anything else                → `ApiError` with the literal status and raw body
//!
//! A request with `skip_tls_validation` gets a throwaway client that accepts
//! any certificate; the shared client is never reconfigured.
//!
//! ERROR HANDLING
//! ==============
//! Internally failures are a `Failure`: either an already-classified
//! `ApiError` or something else (bad spec, client build error). The single
//! `From<Failure> for ApiError` conversion turns the latter into an
//! `ApiError::unknown("")` and passes the former through untouched.

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::error::{ApiError, BuildError};
use crate::request::{Endpoint, RequestSpec};
use crate::url_builder::BuiltRequest;

// =============================================================================
// FAILURE FUNNEL
// =============================================================================

enum Failure {
    Api(ApiError),
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl From<ApiError> for Failure {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

impl From<BuildError> for Failure {
    fn from(err: BuildError) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<reqwest::Error> for Failure {
    fn from(err: reqwest::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<Failure> for ApiError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Api(err) => err,
            Failure::Other(err) => {
                warn!(error = %err, "http: unclassified failure");
                ApiError::unknown("")
            }
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Executes [`RequestSpec`]s. Stateless between calls.
#[derive(Clone, Debug)]
pub struct HttpSession {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpSession {
    /// Build a session with default settings.
    ///
    /// # Errors
    ///
    /// Returns a transport `ApiError` if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, ApiError> {
        Self::from_config(HttpConfig::default())
    }

    /// Build a session from explicit settings.
    ///
    /// # Errors
    ///
    /// Returns a transport `ApiError` if the TLS backend cannot be initialized.
    pub fn from_config(config: HttpConfig) -> Result<Self, ApiError> {
        let client = client_builder(&config)
            .build()
            .map_err(|e| ApiError::transport("", &e))?;
        Ok(Self { client, config })
    }

    /// Wrap a caller-built client. Its settings are used for every request
    /// that does not skip TLS validation.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client, config: HttpConfig::default() }
    }

    /// Execute `spec` and decode a 2xx body as JSON into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] with status `-2` when no response arrived, `-1`
    /// when the body does not decode into `T`, or the literal HTTP status for
    /// any non-2xx response.
    pub async fn execute<T: DeserializeOwned>(&self, spec: &RequestSpec) -> Result<T, ApiError> {
        let (url, body) = self.dispatch(spec).await?;
        serde_json::from_slice(&body).map_err(|e| {
            warn!(%url, error = %e, "http: response decode failed");
            ApiError::parse_data(&url, &e)
        })
    }

    /// Execute `spec` and return a 2xx body unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] with status `-2` when no response arrived, or the
    /// literal HTTP status for any non-2xx response.
    pub async fn execute_raw(&self, spec: &RequestSpec) -> Result<Vec<u8>, ApiError> {
        self.dispatch(spec).await.map(|(_, body)| body)
    }

    /// Execute a typed [`Endpoint`].
    ///
    /// # Errors
    ///
    /// Same as [`HttpSession::execute`].
    pub async fn call<E: Endpoint>(&self, endpoint: &E) -> Result<E::Response, ApiError> {
        self.execute(&endpoint.spec()).await
    }

    async fn dispatch(&self, spec: &RequestSpec) -> Result<(String, Vec<u8>), ApiError> {
        Ok(self.try_dispatch(spec).await?)
    }

    async fn try_dispatch(&self, spec: &RequestSpec) -> Result<(String, Vec<u8>), Failure> {
        let built = spec.build()?;
        let client = self.client_for(spec.skip_tls_validation)?;
        let url = built.url.clone();

        debug!(method = %built.method, %url, insecure = spec.skip_tls_validation, "http: dispatch");

        let response = send(&client, built).await.map_err(|e| {
            warn!(%url, error = %e, "http: transport failure");
            ApiError::transport(&url, &e)
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            warn!(%url, error = %e, "http: body read failed");
            ApiError::transport(&url, &e)
        })?;

        if status.is_success() {
            debug!(%url, status = status.as_u16(), bytes = body.len(), "http: success");
            return Ok((url, body.to_vec()));
        }

        warn!(%url, status = status.as_u16(), "http: service error");
        Err(ApiError::service(&url, status.as_u16(), body.to_vec()).into())
    }

    fn client_for(&self, skip_tls_validation: bool) -> Result<reqwest::Client, reqwest::Error> {
        if !skip_tls_validation {
            return Ok(self.client.clone());
        }
        client_builder(&self.config)
            .danger_accept_invalid_certs(true)
            .build()
    }
}

fn client_builder(config: &HttpConfig) -> reqwest::ClientBuilder {
    let builder = reqwest::Client::builder().connect_timeout(config.connect_timeout());
    match &config.user_agent {
        Some(agent) => builder.user_agent(agent.as_str()),
        None => builder,
    }
}

async fn send(client: &reqwest::Client, built: BuiltRequest) -> Result<reqwest::Response, reqwest::Error> {
    let mut request = client
        .request(built.method, built.url.as_str())
        .headers(built.headers)
        .timeout(built.timeout);
    if let Some(body) = built.body {
        request = request.body(body);
    }
    request.send().await
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
