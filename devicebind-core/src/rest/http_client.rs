//! `reqwest`-backed REST client with retry and backoff for idempotent requests.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::{future::retry_notify, ExponentialBackoff};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};

use super::{HttpMethod, RestClient, RestRequest, RestResponse};
use crate::error::{DeviceBindError, Result, TransportError};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of retry attempts for GET requests.
const MAX_RETRIES: u32 = 3;

const INITIAL_INTERVAL: Duration = Duration::from_millis(100);

const MAX_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retry attempts for transient errors (GET only).
    pub max_retries: u32,
    /// Initial retry interval.
    pub initial_interval: Duration,
    /// Maximum retry interval.
    pub max_interval: Duration,
    /// Refuse plain-http URLs.
    pub https_only: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: MAX_RETRIES,
            initial_interval: INITIAL_INTERVAL,
            max_interval: MAX_INTERVAL,
            https_only: true,
        }
    }
}

impl HttpClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let timeout = std::env::var("DEVICEBIND_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let max_retries = std::env::var("DEVICEBIND_HTTP_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_retries);

        let https_only = std::env::var("DEVICEBIND_HTTPS_ONLY")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(defaults.https_only);

        Self {
            timeout,
            max_retries,
            https_only,
            ..defaults
        }
    }
}

pub struct HttpRestClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpRestClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .https_only(config.https_only)
            .build()
            .map_err(|e| {
                DeviceBindError::ConfigError(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    async fn send_once(
        &self,
        request: &RestRequest,
        retryable: bool,
    ) -> std::result::Result<RestResponse, backoff::Error<TransportError>> {
        let start = Instant::now();

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(request.url.clone()),
            HttpMethod::Post => self.client.post(request.url.clone()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            let latency_ms = start.elapsed().as_millis() as u64;
            let err = TransportError::Network(e.to_string());
            if is_transient_error(&e) {
                warn!(error = %e, latency_ms, "Transient error, will retry");
                backoff::Error::transient(err)
            } else {
                warn!(error = %e, latency_ms, "Permanent error, aborting");
                backoff::Error::permanent(err)
            }
        })?;

        let status = response.status();
        debug!(status = %status, "Received HTTP response");

        let body = response.bytes().await.map_err(|e| {
            backoff::Error::permanent(TransportError::Network(format!(
                "Failed to read response body: {e}"
            )))
        })?;
        let response = RestResponse {
            status: status.as_u16(),
            body: body.to_vec(),
        };

        if retryable && is_transient_status(status) {
            warn!(status = %status, "Transient HTTP status, will retry");
            let err = response.ensure_success().err().unwrap_or(TransportError::Status {
                status: status.as_u16(),
                server_error: None,
            });
            return Err(backoff::Error::transient(err));
        }

        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        Ok(response)
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_interval,
            max_interval: self.config.max_interval,
            max_elapsed_time: Some(self.config.timeout * self.config.max_retries),
            ..Default::default()
        }
    }
}

#[async_trait]
impl RestClient for HttpRestClient {
    #[instrument(level = "debug", skip(self, request), fields(method = %request.method, host = request.url.host_str().unwrap_or_default()))]
    async fn submit(
        &self,
        request: RestRequest,
    ) -> std::result::Result<RestResponse, TransportError> {
        if request.method != HttpMethod::Get || self.config.max_retries == 0 {
            return match self.send_once(&request, false).await {
                Ok(response) => Ok(response),
                Err(backoff::Error::Permanent(e)) | Err(backoff::Error::Transient { err: e, .. }) => {
                    Err(e)
                }
            };
        }

        let request = &request;
        retry_notify(
            self.build_backoff(),
            || async move { self.send_once(request, true).await },
            |err: TransportError, duration: Duration| {
                warn!(
                    error = %err,
                    retry_after_ms = duration.as_millis() as u64,
                    "Retry scheduled"
                );
            },
        )
        .await
    }
}

/// Check if a reqwest error is transient and should be retried.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

/// Check if an HTTP status code indicates a transient error.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::BAD_GATEWAY
    )
}
