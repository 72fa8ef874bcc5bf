//! Frame types for the webhook subscription stream.
//!
//! The stream endpoint upgrades to a WebSocket connection. Frames are
//! internally-tagged JSON objects so both sides can dispatch on `"type"`.
//!
//! # Protocol
//!
//! 1. The client sends exactly one [`ClientMessage::Subscribe`] frame
//!    carrying its [`SubscriptionFilter`].
//! 2. The server acknowledges with [`ServerMessage::Subscribed`], or
//!    rejects the subscription with [`ServerMessage::Error`] and closes.
//! 3. Every webhook is pushed as a [`ServerMessage::Webhook`] frame.
//! 4. The stream ends with a normal close frame
//!    ([`StreamCloseCode::NORMAL`]). Any other close code, or an `error`
//!    frame after the acknowledgement, terminates the stream with an error.

use serde::{Deserialize, Serialize};

use super::filter::SubscriptionFilter;
use super::webhook::WebhookEvent;

/// Client-to-server frame.
///
/// ```json
/// {"type":"subscribe","filter":{"bucket":"","destination":""}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { filter: SubscriptionFilter },
}

/// Server-to-client frame.
///
/// ```json
/// {"type":"subscribed"}
/// {"type":"webhook","bucket":{...},"request":{...}}
/// {"type":"error","code":16,"reason":"invalid access key"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The subscription was accepted; webhook frames follow.
    Subscribed,

    /// One webhook to relay.
    Webhook(WebhookEvent),

    /// The server refused or aborted the subscription.
    Error {
        /// Application-level status code.
        code: u16,
        /// Human-readable reason.
        reason: String,
    },
}

/// Well-known close codes used by the subscription stream.
pub struct StreamCloseCode;

impl StreamCloseCode {
    /// The server has no more events for this subscription.
    pub const NORMAL: u16 = 1000;

    /// The server is going away (restart, deploy).
    pub const GOING_AWAY: u16 = 1001;

    /// An unexpected server-side error ended the stream.
    pub const INTERNAL_ERROR: u16 = 1011;

    /// The credentials were rejected.
    pub const UNAUTHENTICATED: u16 = 4001;
}
