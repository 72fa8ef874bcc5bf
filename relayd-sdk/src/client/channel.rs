//! Authenticated channel to the dispatch service.

use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request as CallRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;

use super::subscription::{Incoming, Subscription, read_frame};
use super::ConnectionError;
use crate::credentials::PerCallCredentials;
use crate::objects::{ClientMessage, ServerMessage, StreamCloseCode, SubscriptionFilter};

/// Default dispatch service address.
pub const DEFAULT_ADDRESS: &str = "api.webhookrelay.com:40000";

/// Path of the subscription stream endpoint.
pub const STREAM_PATH: &str = "/v1/webhooks/stream";

/// First delay between transient dial failures.
const INITIAL_DIAL_BACKOFF: Duration = Duration::from_millis(100);

pub(super) type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dial parameters for a [`Channel`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// `host:port`, or a full `ws://` / `wss://` URL.
    pub address: String,
    /// Overall deadline for dialing and for the subscription handshake.
    pub dial_timeout: Duration,
    /// Ceiling of the exponential backoff between transient dial failures.
    pub backoff_max_delay: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            dial_timeout: Duration::from_secs(5),
            backoff_max_delay: Duration::from_secs(5),
        }
    }
}

impl ConnectOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn with_dial_timeout(mut self, dial_timeout: Duration) -> Self {
        self.dial_timeout = dial_timeout;
        self
    }

    pub fn with_backoff_max_delay(mut self, backoff_max_delay: Duration) -> Self {
        self.backoff_max_delay = backoff_max_delay;
        self
    }
}

/// Turn a configured address into the stream endpoint URL.
///
/// A bare `host:port` becomes `wss://host:port/v1/webhooks/stream`. Full
/// URLs keep their scheme; an empty path is replaced by [`STREAM_PATH`].
pub fn endpoint_url(address: &str) -> Result<Url, ConnectionError> {
    let invalid = |reason: String| ConnectionError::InvalidAddress {
        address: address.to_owned(),
        reason,
    };

    let raw = if address.contains("://") {
        address.to_owned()
    } else {
        format!("wss://{address}")
    };
    let mut url = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(STREAM_PATH);
    }

    Ok(url)
}

/// A configured, credential-bearing channel to the dispatch service.
///
/// The credentials act as an interceptor: their metadata is attached to
/// the opening request of every call made through this channel. A channel
/// carries exactly one subscription call; [`Channel::subscribe`] consumes
/// it.
pub struct Channel {
    endpoint: Url,
    options: ConnectOptions,
    credentials: Arc<dyn PerCallCredentials>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("endpoint", &self.endpoint.as_str())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Validate the address and bind the credentials to a new channel.
    ///
    /// Fails with [`ConnectionError::InsecureTransport`] when the
    /// credentials require transport security and the endpoint is not
    /// `wss://`. No network I/O happens here.
    pub fn new(
        options: ConnectOptions,
        credentials: Arc<dyn PerCallCredentials>,
    ) -> Result<Self, ConnectionError> {
        let endpoint = endpoint_url(&options.address)?;
        if credentials.require_transport_security() && endpoint.scheme() != "wss" {
            return Err(ConnectionError::InsecureTransport(endpoint));
        }
        Ok(Self {
            endpoint,
            options,
            credentials,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Dial the endpoint and start the server-streamed subscription.
    ///
    /// Returns once the server has acknowledged the filter. Every failure
    /// up to that point is a [`ConnectionError`].
    pub async fn subscribe(
        self,
        filter: &SubscriptionFilter,
    ) -> Result<Subscription, ConnectionError> {
        let mut socket = self.dial().await?;
        debug!(endpoint = %self.endpoint, "channel established");

        time::timeout(self.options.dial_timeout, initiate(&mut socket, filter))
            .await
            .map_err(|_| ConnectionError::Timeout(self.options.dial_timeout))??;

        Ok(Subscription::new(socket))
    }

    /// Build the opening request with the credential metadata attached.
    fn call_request(&self) -> Result<CallRequest, ConnectionError> {
        let mut request = self.endpoint.as_str().into_client_request()?;
        for (key, value) in self.credentials.request_metadata() {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| ConnectionError::InvalidMetadata { key })?;
            let value =
                HeaderValue::from_str(&value).map_err(|_| ConnectionError::InvalidMetadata { key })?;
            request.headers_mut().insert(name, value);
        }
        Ok(request)
    }

    async fn dial(&self) -> Result<Socket, ConnectionError> {
        let deadline = Instant::now() + self.options.dial_timeout;
        let mut backoff = INITIAL_DIAL_BACKOFF.min(self.options.backoff_max_delay);
        let mut attempt: u32 = 1;

        loop {
            let request = self.call_request()?;
            match time::timeout_at(deadline, connect_async(request)).await {
                Err(_) => return Err(ConnectionError::Timeout(self.options.dial_timeout)),
                Ok(Ok((socket, _))) => return Ok(socket),
                Ok(Err(tungstenite::Error::Http(response))) => {
                    return Err(ConnectionError::Rejected(response.status()));
                }
                Ok(Err(e)) if is_transient(&e) => {
                    if Instant::now() + backoff >= deadline {
                        return Err(ConnectionError::Transport(e));
                    }
                    warn!(
                        endpoint = %self.endpoint,
                        error = %e,
                        attempt,
                        delay_ms = backoff.as_millis() as u64,
                        "dial failed, retrying"
                    );
                    time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.options.backoff_max_delay);
                    attempt += 1;
                }
                Ok(Err(e)) => return Err(ConnectionError::Transport(e)),
            }
        }
    }
}

/// Send the filter and wait for the server's verdict.
async fn initiate(
    socket: &mut Socket,
    filter: &SubscriptionFilter,
) -> Result<(), ConnectionError> {
    let frame = serde_json::to_string(&ClientMessage::Subscribe {
        filter: filter.clone(),
    })?;
    socket.send(Message::Text(frame)).await?;

    loop {
        match read_frame(socket).await? {
            Incoming::Message(ServerMessage::Subscribed) => return Ok(()),
            Incoming::Message(ServerMessage::Error { code, reason }) => {
                return Err(ConnectionError::Subscription { code, reason });
            }
            Incoming::Message(ServerMessage::Webhook(_)) => {
                return Err(ConnectionError::Protocol(
                    "webhook frame before subscription acknowledgement",
                ));
            }
            Incoming::Closed(frame) => {
                let (code, reason) =
                    frame.unwrap_or((StreamCloseCode::NORMAL, String::new()));
                return Err(ConnectionError::ClosedBeforeAck { code, reason });
            }
            Incoming::Ended => {
                return Err(ConnectionError::ClosedBeforeAck {
                    code: StreamCloseCode::NORMAL,
                    reason: "connection dropped".to_string(),
                });
            }
            Incoming::Malformed(e) => return Err(ConnectionError::Json(e)),
            Incoming::Control => continue,
        }
    }
}

/// Failures worth another dial attempt. TLS errors surface from rustls as
/// `InvalidData` and are final.
fn is_transient(error: &tungstenite::Error) -> bool {
    match error {
        tungstenite::Error::Io(e) => e.kind() != std::io::ErrorKind::InvalidData,
        _ => false,
    }
}
