//! Validated runtime configuration consumed by a relay session.

use relayd_core::ForwarderConfig;
use relayd_sdk::client::ConnectOptions;
use relayd_sdk::credentials::AccessKeyCredentials;
use relayd_sdk::objects::SubscriptionFilter;

/// Immutable configuration of one relay session.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub connect: ConnectOptions,
    pub credentials: AccessKeyCredentials,
    pub filter: SubscriptionFilter,
    pub forwarder: ForwarderConfig,
}
