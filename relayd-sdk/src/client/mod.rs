//! Subscription channel to the webhook-dispatch service.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the wire types do not pull in `tokio-tungstenite`.

mod channel;
mod subscription;

pub use channel::{Channel, ConnectOptions, DEFAULT_ADDRESS, STREAM_PATH, endpoint_url};
pub use subscription::Subscription;

use std::time::Duration;

use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::http::StatusCode;
use url::Url;

/// Errors raised before the subscription starts streaming. Always fatal to
/// the session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The configured server address cannot be turned into an endpoint.
    #[error("invalid server address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Credentials require an encrypted channel but the endpoint is `ws://`.
    #[error("refusing to attach credentials to unencrypted channel {0}")]
    InsecureTransport(Url),

    /// A credential value cannot be carried as call metadata.
    #[error("invalid credential metadata {key:?}")]
    InvalidMetadata { key: &'static str },

    /// The dial or the subscription handshake did not finish in time.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure (DNS, TCP, TLS, WebSocket handshake, …).
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// The server answered the opening handshake with a non-upgrade status.
    #[error("server rejected connection with status {0}")]
    Rejected(StatusCode),

    /// The server refused the subscription call.
    #[error("subscription rejected (code {code}): {reason}")]
    Subscription { code: u16, reason: String },

    /// The stream closed before the server acknowledged the subscription.
    #[error("stream closed before subscription was acknowledged (code {code}): {reason}")]
    ClosedBeforeAck { code: u16, reason: String },

    /// The server sent something other than an acknowledgement first.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// A handshake frame could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that terminate an established subscription. Always fatal to the
/// session; the channel is not reopened.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Transport failure while waiting for the next frame.
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// The connection dropped without a close frame.
    #[error("connection dropped without close frame")]
    Disconnected,

    /// The server aborted the stream with an error frame.
    #[error("server error (code {code}): {reason}")]
    Server { code: u16, reason: String },

    /// The server closed the stream with a non-normal close code.
    #[error("stream closed abnormally (code {code}): {reason}")]
    Closed { code: u16, reason: String },

    /// A frame could not be decoded.
    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),
}
