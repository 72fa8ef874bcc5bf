#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

pub mod error;
pub mod relayer;
pub mod retry;
pub mod session;

pub use error::{RelayError, SessionError};
pub use relayer::{ForwarderConfig, HttpRelayer, Relayer};
pub use retry::RetryPolicy;
pub use session::{RelaySession, SessionReport, SessionState, consume};
