//! The relaying capability handed to a session.

mod http;

pub use http::{ForwarderConfig, HttpRelayer};

use async_trait::async_trait;
use relayd_sdk::objects::WebhookEvent;

use crate::error::RelayError;

/// Forwards one webhook event to its destination.
///
/// Implementations must resolve the outcome (success, exhausted retries or
/// hard failure) before returning; the session does not receive the next
/// event until then.
#[async_trait]
pub trait Relayer: Send + Sync {
    async fn relay(&self, event: &WebhookEvent) -> Result<(), RelayError>;
}
