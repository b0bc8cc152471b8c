use crate::config::Configuration;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error types for export operations
#[derive(Debug, Error, Clone)]
pub enum ExportError {
    /// Transport-layer error (connect failure, TLS, request timeout)
    #[error("transport error: {0}")]
    Transport(String),
    /// Backend answered with a non-success HTTP status
    #[error("export rejected with status {0}")]
    Status(u16),
    /// Transport could not be constructed from the configuration
    #[error("transport initialization failed: {0}")]
    Init(String),
}

/// Trait for delivering an encoded export request to a backend.
///
/// A transport makes exactly one delivery attempt per call; retry and
/// buffering policy live with the caller, which discards the batch either
/// way.
///
/// Uses native async fn in traits. `impl Future` return types are not
/// object-safe; for dynamic dispatch use [`TransportBoxed`].
pub trait Transport: Send + Sync {
    /// Posts one serialized request body to `url`.
    fn post(
        &self,
        url: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Returns the transport name for debugging.
    fn name(&self) -> &str;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<(), ExportError> {
        (**self).post(url, body).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Object-safe version of [`Transport`] for dynamic dispatch.
pub trait TransportBoxed: Send + Sync {
    /// Posts one serialized request body to `url` (boxed future for object
    /// safety).
    fn post_boxed<'a>(
        &'a self,
        url: &'a str,
        body: Vec<u8>,
    ) -> std::pin::Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + 'a>>;

    /// Returns the transport name for debugging.
    fn name(&self) -> &str;
}

/// Blanket implementation: any Transport can be used as TransportBoxed
impl<T: Transport> TransportBoxed for T {
    fn post_boxed<'a>(
        &'a self,
        url: &'a str,
        body: Vec<u8>,
    ) -> std::pin::Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + 'a>> {
        Box::pin(self.post(url, body))
    }

    fn name(&self) -> &str {
        Transport::name(self)
    }
}

/// OTLP/HTTP transport carrying protobuf request bodies.
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Builds the HTTP client from the configuration.
    ///
    /// The connect timeout is half the request timeout, so a dead endpoint
    /// fails fast and still leaves time for the response. With `insecure`
    /// set, certificate verification is disabled.
    pub fn new(config: &Configuration) -> Result<Self, ExportError> {
        let timeout = config.timeout();
        let client = reqwest::Client::builder()
            .connect_timeout(timeout / 2 + Duration::from_millis(1))
            .danger_accept_invalid_certs(config.insecure)
            .user_agent(concat!("pgtel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExportError::Init(e.to_string()))?;
        Ok(Self { client, timeout })
    }
}

impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<(), ExportError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-protobuf")
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| ExportError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Status(status.as_u16()));
        }
        debug!(url, status = status.as_u16(), "export delivered");
        Ok(())
    }

    fn name(&self) -> &str {
        "otlp_http"
    }
}

/// Null transport that discards all requests, for hosts that want the
/// pipeline running without a backend, and for tests
pub struct NullTransport;

impl Transport for NullTransport {
    async fn post(&self, _url: &str, _body: Vec<u8>) -> Result<(), ExportError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}
