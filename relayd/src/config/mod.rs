//! Configuration module for relayd.
//!
//! Handles loading configuration from an optional TOML file, command-line
//! flags and environment variables, and validates the result.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::RuntimeConfig;
use relayd_core::{ForwarderConfig, RetryPolicy};
use relayd_sdk::client::{ConnectOptions, DEFAULT_ADDRESS};
use relayd_sdk::credentials::AccessKeyCredentials;
use relayd_sdk::objects::SubscriptionFilter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub address: Option<String>,
    pub key: Option<String>,
    pub secret: Option<String>,
    pub bucket: Option<String>,
    pub destination: Option<String>,
    pub retries: Option<u32>,
    pub insecure: bool,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    overrides: Overrides,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: Option<impl AsRef<Path>>, overrides: Overrides) -> Self {
        Self {
            config_path: config_path.map(|p| p.as_ref().to_path_buf()),
            overrides,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file, if one was given
    /// 2. Apply command-line and environment overrides
    /// 3. Validate the result
    pub fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        let file_config = match &self.config_path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            None => FileConfig::default(),
        };

        self.build(file_config)
    }

    fn build(&self, file: FileConfig) -> Result<RuntimeConfig, ConfigError> {
        let o = self.overrides.clone();

        let key = o.key.or(file.credentials.key).unwrap_or_default();
        let secret = o.secret.or(file.credentials.secret).unwrap_or_default();
        if key.is_empty() {
            return Err(ConfigError::ValidationError(
                "access key is required (--key or RELAY_KEY)".to_string(),
            ));
        }
        if secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "access secret is required (--secret or RELAY_SECRET)".to_string(),
            ));
        }

        let retries = o.retries.or(file.relay.retries).unwrap_or(5);
        if retries == 0 {
            return Err(ConfigError::ValidationError(
                "retries must be at least 1".to_string(),
            ));
        }

        let mut connect = ConnectOptions::new(
            o.address
                .or(file.server.address)
                .unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
        );
        if let Some(secs) = file.server.dial_timeout_secs {
            connect = connect.with_dial_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = file.server.backoff_max_delay_secs {
            connect = connect.with_backoff_max_delay(Duration::from_secs(secs));
        }

        let mut forwarder = ForwarderConfig {
            retry: RetryPolicy::new(retries),
            insecure: o.insecure || file.relay.insecure.unwrap_or(false),
            ..ForwarderConfig::default()
        };
        if let Some(secs) = file.relay.timeout_secs {
            forwarder.timeout = Duration::from_secs(secs);
        }

        let filter = SubscriptionFilter {
            bucket: o.bucket.or(file.filter.bucket).unwrap_or_default(),
            destination: o.destination.or(file.filter.destination).unwrap_or_default(),
        };

        Ok(RuntimeConfig {
            connect,
            credentials: AccessKeyCredentials::new(key, secret),
            filter,
            forwarder,
        })
    }
}
