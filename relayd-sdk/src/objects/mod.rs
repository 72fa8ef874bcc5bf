//! Wire objects of the webhook subscription protocol.

pub mod filter;
pub mod stream;
pub mod webhook;

pub use filter::SubscriptionFilter;
pub use stream::{ClientMessage, ServerMessage, StreamCloseCode};
pub use webhook::{Bucket, Request, WebhookEvent};
