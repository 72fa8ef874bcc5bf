//! Subscription filter sent once when the stream is opened.

use serde::{Deserialize, Serialize};

/// Optional scope narrowing which events the server streams.
///
/// Both fields empty means "all events". The server applies the scoping;
/// the client only forwards the values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub destination: String,
}

impl SubscriptionFilter {
    /// Filter that matches every event the credentials can see.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    /// Returns `true` if neither a bucket nor a destination is set.
    pub fn is_unscoped(&self) -> bool {
        self.bucket.is_empty() && self.destination.is_empty()
    }
}
