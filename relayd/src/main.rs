//! relayd
//!
//! Edge-side relay client: subscribes to webhook events from the central
//! dispatch service and forwards each one to its recorded destination.

mod config;
mod shutdown;

use clap::Parser;
use config::{ConfigLoader, Overrides};
use relayd_core::{HttpRelayer, RelaySession};
use shutdown::shutdown_signal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// relayd - relay webhooks from the dispatch service to private endpoints
#[derive(Parser, Debug)]
#[command(name = "relayd")]
#[command(version, about, long_about = None, disable_version_flag = true)]
struct Args {
    /// Access key to use
    #[arg(short = 'k', long, env = "RELAY_KEY")]
    key: Option<String>,

    /// Access secret to use
    #[arg(short, long, env = "RELAY_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Server address to connect to (default: api.webhookrelay.com:40000)
    #[arg(short, long, env = "RELAY_ADDRESS")]
    address: Option<String>,

    /// Only receive webhooks of this bucket
    #[arg(long)]
    bucket: Option<String>,

    /// Only receive webhooks for this destination
    #[arg(long)]
    destination: Option<String>,

    /// Maximum delivery attempts per webhook (default: 5)
    #[arg(long)]
    retries: Option<u32>,

    /// Accept invalid TLS certificates from destinations
    #[arg(long, default_value = "false")]
    insecure: bool,

    /// Enable debug logging
    #[arg(short = 'D', long, default_value = "false")]
    debug: bool,

    /// Path to an optional configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print version information
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            address: self.address.clone(),
            key: self.key.clone(),
            secret: self.secret.clone(),
            bucket: self.bucket.clone(),
            destination: self.destination.clone(),
            retries: self.retries,
            insecure: self.insecure,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    init_tracing(args.debug);

    tracing::info!("Starting relayd v{}", env!("CARGO_PKG_VERSION"));

    let config = ConfigLoader::new(args.config.as_ref(), args.overrides())
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    tracing::debug!(
        address = %config.connect.address,
        bucket = %config.filter.bucket,
        destination = %config.filter.destination,
        max_attempts = config.forwarder.retry.max_attempts,
        "Configuration loaded"
    );

    let relayer = HttpRelayer::new(config.forwarder.clone())?;
    let session = RelaySession::new(
        config.connect.clone(),
        Arc::new(config.credentials.clone()),
        relayer,
    );

    // Dropping the session future closes the channel.
    tokio::select! {
        result = session.run(&config.filter) => {
            let report = result?;
            tracing::info!(
                received = report.received,
                relayed = report.relayed,
                failed = report.failed,
                "Relay session finished"
            );
        }
        _ = shutdown_signal() => {}
    }

    Ok(())
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
