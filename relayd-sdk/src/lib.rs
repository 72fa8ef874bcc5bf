//! Shared types for relayd, the webhook relay edge client.
//!
//! The [`objects`] module holds the wire types exchanged with the central
//! webhook-dispatch service. The [`client`] module (behind the `client`
//! feature) opens the authenticated subscription channel and turns it into
//! a stream of [`objects::WebhookEvent`]s.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

#[cfg(feature = "client")]
pub mod client;
pub mod credentials;
pub mod objects;
