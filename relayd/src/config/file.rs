//! TOML file configuration structures.
//!
//! These structs directly map to the optional `relayd.toml` file. Every
//! field may be omitted; command-line flags and environment variables take
//! precedence over the file.

use serde::{Deserialize, Serialize};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Dispatch service connection section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// `host:port` or a `wss://` URL.
    pub address: Option<String>,
    /// Dial deadline in seconds.
    pub dial_timeout_secs: Option<u64>,
    /// Ceiling of the dial backoff in seconds.
    pub backoff_max_delay_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    pub key: Option<String>,
    pub secret: Option<String>,
}

/// Subscription scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    pub bucket: Option<String>,
    pub destination: Option<String>,
}

/// Forwarder section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Maximum delivery attempts per event.
    pub retries: Option<u32>,
    /// Timeout of a single delivery attempt in seconds.
    pub timeout_secs: Option<u64>,
    /// Accept invalid TLS certificates from destinations.
    pub insecure: Option<bool>,
}
