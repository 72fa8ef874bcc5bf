//! Error taxonomy of a relay session.
//!
//! Only [`SessionError`] ever leaves a session. [`RelayError`] is contained
//! in the consumption loop: it is logged and the next event is processed.

use relayd_sdk::client::{ConnectionError, StreamError};
use thiserror::Error;

/// Errors that can occur while forwarding a single event.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The event's method is not a valid HTTP method token.
    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    /// The event's destination is not an absolute URL.
    #[error("invalid destination {destination:?}: {source}")]
    InvalidDestination {
        destination: String,
        #[source]
        source: url::ParseError,
    },

    /// A header name or value cannot be sent over HTTP.
    #[error("invalid header {0:?}")]
    InvalidHeader(String),

    /// Every attempt failed at the transport level.
    #[error("delivery failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The request could not be sent at all (not retried).
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Failure reported by a relayer other than the HTTP forwarder.
    #[error("{0}")]
    Custom(String),
}

/// Errors that terminate a relay session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Dial, TLS, authentication or subscription initiation failed.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The established stream failed mid-way.
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),
}
