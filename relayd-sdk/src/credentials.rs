//! Per-call credentials attached to the subscription channel.
//!
//! The dispatch service authenticates every call by two metadata entries:
//!
//! ```text
//! access_key: {access key}
//! secret_key: {access secret}
//! ```
//!
//! Credentials are bound to a channel instance, never to process-wide
//! state, so two channels can run side by side with different keys.

use std::fmt;

/// Metadata key carrying the access key.
pub const ACCESS_KEY_METADATA: &str = "access_key";

/// Metadata key carrying the access secret.
pub const SECRET_KEY_METADATA: &str = "secret_key";

/// Source of authentication metadata for every outbound call on a channel.
pub trait PerCallCredentials: Send + Sync {
    /// Metadata entries to attach to the next call.
    fn request_metadata(&self) -> Vec<(&'static str, String)>;

    /// Whether the channel must be transport-encrypted before the metadata
    /// may be attached. The channel refuses to dial otherwise.
    fn require_transport_security(&self) -> bool {
        true
    }
}

/// Fixed access-key/secret pair issued by the dispatch service.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessKeyCredentials {
    access_key: String,
    access_secret: String,
}

impl AccessKeyCredentials {
    pub fn new(access_key: impl Into<String>, access_secret: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            access_secret: access_secret.into(),
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }
}

impl fmt::Debug for AccessKeyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeyCredentials")
            .field("access_key", &self.access_key)
            .field("access_secret", &"<redacted>")
            .finish()
    }
}

impl PerCallCredentials for AccessKeyCredentials {
    fn request_metadata(&self) -> Vec<(&'static str, String)> {
        vec![
            (ACCESS_KEY_METADATA, self.access_key.clone()),
            (SECRET_KEY_METADATA, self.access_secret.clone()),
        ]
    }
}
