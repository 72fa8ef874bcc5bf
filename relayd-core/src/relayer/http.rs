//! HTTP forwarder: the production [`Relayer`].
//!
//! Rebuilds the recorded request (method, destination, headers, body) and
//! delivers it under a [`RetryPolicy`]. Any HTTP response counts as a
//! delivery; statuses >= 400 are only logged.
//!
//! reqwest inserts `accept: */*` into requests that carry no `Accept`
//! header of their own; an event's own `Accept` values are sent unchanged.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use relayd_sdk::objects::{Request, WebhookEvent};
use tracing::{debug, warn};

use super::Relayer;
use crate::error::RelayError;
use crate::retry::{AttemptError, RetryError, RetryPolicy};

/// Configuration for [`HttpRelayer`].
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub retry: RetryPolicy,
    /// Timeout of a single attempt.
    pub timeout: Duration,
    /// Accept invalid TLS certificates from destinations.
    pub insecure: bool,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            insecure: false,
        }
    }
}

/// "Last mile" relayer delivering events over HTTP.
///
/// Holds no per-event state; one instance serves a whole session.
#[derive(Debug, Clone)]
pub struct HttpRelayer {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpRelayer {
    /// Create a new relayer.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Request`] if the HTTP client cannot be built
    /// (e.g. the TLS backend fails to initialise).
    pub fn new(config: ForwarderConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        Ok(Self {
            client,
            retry: config.retry,
        })
    }

    /// Use a preconfigured `reqwest::Client` (proxy, custom roots, …).
    pub fn with_http_client(client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn send(&self, outbound: &Outbound, request: &Request) -> Result<(), RelayError> {
        let result = self
            .retry
            .run(|attempt| {
                let mut http_request = reqwest::Request::new(outbound.method.clone(), outbound.url.clone());
                *http_request.headers_mut() = outbound.headers.clone();
                *http_request.body_mut() = Some(request.body.clone().into());
                let client = &self.client;
                async move {
                    debug!(attempt, "sending webhook request");
                    client.execute(http_request).await.map_err(classify)
                }
            })
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                if status.as_u16() > 399 {
                    warn!(
                        status_code = status.as_u16(),
                        destination = %request.destination,
                        method = %request.method,
                        "relayer: unexpected status code"
                    );
                } else {
                    debug!(status_code = status.as_u16(), "webhook request delivered");
                }
                // Read the body to the end so the connection returns to the pool.
                if let Err(e) = response.bytes().await {
                    debug!(error = %e, "failed to drain response body");
                }
                Ok(())
            }
            Err(RetryError::Exhausted { attempts, error }) => Err(RelayError::Exhausted {
                attempts,
                source: error,
            }),
            Err(RetryError::Aborted { error, .. }) => Err(RelayError::Request(error)),
        }
    }
}

#[async_trait]
impl Relayer for HttpRelayer {
    async fn relay(&self, event: &WebhookEvent) -> Result<(), RelayError> {
        let outbound = Outbound::from_request(&event.request)?;
        self.send(&outbound, &event.request).await
    }
}

/// Validated request line and headers, reused across attempts.
#[derive(Debug)]
struct Outbound {
    method: Method,
    url: Url,
    headers: HeaderMap,
}

impl Outbound {
    fn from_request(request: &Request) -> Result<Self, RelayError> {
        let method = if request.method.is_empty() {
            Method::GET
        } else {
            Method::from_bytes(request.method.as_bytes())
                .map_err(|_| RelayError::InvalidMethod(request.method.clone()))?
        };
        let url = Url::parse(&request.destination).map_err(|source| {
            RelayError::InvalidDestination {
                destination: request.destination.clone(),
                source,
            }
        })?;

        Ok(Self {
            method,
            url,
            headers: outbound_headers(&request.headers)?,
        })
    }
}

/// Copy every value of every header, in order. Headers the HTTP client
/// derives from the URL and body are skipped.
fn outbound_headers(headers: &BTreeMap<String, Vec<String>>) -> Result<HeaderMap, RelayError> {
    let mut map = HeaderMap::new();
    for (name, values) in headers {
        if is_managed_header(name) {
            continue;
        }
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RelayError::InvalidHeader(name.clone()))?;
        for value in values {
            let header_value = HeaderValue::from_bytes(value.as_bytes())
                .map_err(|_| RelayError::InvalidHeader(name.clone()))?;
            map.append(header_name.clone(), header_value);
        }
    }
    Ok(map)
}

fn is_managed_header(name: &str) -> bool {
    ["host", "content-length", "transfer-encoding", "trailer"]
        .iter()
        .any(|managed| name.eq_ignore_ascii_case(managed))
}

/// Requests that could not even be built are not worth another attempt.
fn classify(error: reqwest::Error) -> AttemptError<reqwest::Error> {
    if error.is_builder() {
        AttemptError::Permanent(error)
    } else {
        AttemptError::Transient(error)
    }
}
