//! Relay session: subscribe, consume, forward.
//!
//! A session drives `Connecting → Streaming → (Closed | Failed)`. Events
//! are handled strictly one at a time: the relayer's outcome for an event
//! is resolved before the next one is received, so there is no queue and
//! a slow destination stalls the stream.

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use relayd_sdk::client::{Channel, ConnectOptions, StreamError};
use relayd_sdk::credentials::PerCallCredentials;
use relayd_sdk::objects::{SubscriptionFilter, WebhookEvent};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::SessionError;
use crate::relayer::Relayer;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    /// The server ended the stream cleanly.
    Closed,
    /// Connection or stream failure.
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Streaming => write!(f, "streaming"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Event counters of a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub received: u64,
    pub relayed: u64,
    pub failed: u64,
}

/// One run of connect-subscribe-consume-forward.
pub struct RelaySession<R> {
    options: ConnectOptions,
    credentials: Arc<dyn PerCallCredentials>,
    relayer: R,
    state_tx: watch::Sender<SessionState>,
}

impl<R: Relayer> RelaySession<R> {
    pub fn new(
        options: ConnectOptions,
        credentials: Arc<dyn PerCallCredentials>,
        relayer: R,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Connecting);
        Self {
            options,
            credentials,
            relayer,
            state_tx,
        }
    }

    /// Observe state transitions. Obtain the receiver before [`Self::run`].
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Run the session to completion.
    ///
    /// Returns `Ok` when the server ends the stream cleanly, regardless of
    /// how many individual deliveries failed. Connection and stream
    /// failures end the session with an error; there is no reconnect.
    pub async fn run(self, filter: &SubscriptionFilter) -> Result<SessionReport, SessionError> {
        let result = self.drive(filter).await;
        let terminal = match &result {
            Ok(_) => SessionState::Closed,
            Err(_) => SessionState::Failed,
        };
        self.transition(terminal);
        result
    }

    async fn drive(&self, filter: &SubscriptionFilter) -> Result<SessionReport, SessionError> {
        let channel = Channel::new(self.options.clone(), self.credentials.clone())?;
        let subscription = channel.subscribe(filter).await.inspect_err(|e| {
            error!(host = %self.options.address, error = %e, "failed to open subscription");
        })?;

        info!(host = %self.options.address, "relayd: connected...");
        self.transition(SessionState::Streaming);

        consume(subscription.into_stream(), &self.relayer).await
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state_tx.send_replace(next);
        debug!(from = %previous, to = %next, "session state changed");
    }
}

/// Forward every event of `stream` through `relayer`, in receipt order.
///
/// Relay failures are logged and swallowed. A stream error ends the loop
/// and is returned; the end of the stream returns the counters.
pub async fn consume<S, R>(stream: S, relayer: &R) -> Result<SessionReport, SessionError>
where
    S: Stream<Item = Result<WebhookEvent, StreamError>>,
    R: Relayer + ?Sized,
{
    let mut stream = std::pin::pin!(stream);
    let mut report = SessionReport::default();

    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, "failed to get stream from server");
                return Err(SessionError::Stream(e));
            }
        };
        report.received += 1;

        match relayer.relay(&event).await {
            Ok(()) => {
                report.relayed += 1;
                info!(
                    bucket = %event.bucket.name,
                    destination = %event.request.destination,
                    "webhook request relayed"
                );
            }
            Err(e) => {
                report.failed += 1;
                error!(
                    error = %e,
                    destination = %event.request.destination,
                    method = %event.request.method,
                    "failed to relay webhook request"
                );
            }
        }
    }

    info!(
        received = report.received,
        relayed = report.relayed,
        failed = report.failed,
        "subscription closed by server"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use async_trait::async_trait;
    use relayd_sdk::objects::Bucket;
    use std::sync::Mutex;

    /// Records events; fails for destinations listed in `failing`.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<WebhookEvent>>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl Relayer for Recorder {
        async fn relay(&self, event: &WebhookEvent) -> Result<(), RelayError> {
            self.seen.lock().unwrap().push(event.clone());
            if self.failing.contains(&event.request.destination) {
                return Err(RelayError::Custom("relayer error".into()));
            }
            Ok(())
        }
    }

    fn event(destination: &str) -> WebhookEvent {
        WebhookEvent::new(
            Bucket {
                id: "xx".into(),
                name: "bucket_name".into(),
            },
            "POST",
            destination,
        )
        .with_header("X-Multi", "1")
        .with_header("X-Multi", "2")
        .with_body(&b"{\"a\":1}"[..])
    }

    #[tokio::test]
    async fn test_events_forwarded_once_in_order_unmodified() {
        let events = vec![event("http://a"), event("http://b"), event("http://c")];
        let recorder = Recorder::default();

        let stream = futures_util::stream::iter(events.clone().into_iter().map(Ok));
        let report = consume(stream, &recorder).await.unwrap();

        assert_eq!(*recorder.seen.lock().unwrap(), events);
        assert_eq!(
            report,
            SessionReport {
                received: 3,
                relayed: 3,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_relay_failure_does_not_stop_stream() {
        let recorder = Recorder {
            failing: vec!["http://a".into()],
            ..Recorder::default()
        };

        let stream = futures_util::stream::iter(vec![Ok(event("http://a")), Ok(event("http://b"))]);
        let report = consume(stream, &recorder).await.unwrap();

        assert_eq!(recorder.seen.lock().unwrap().len(), 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.relayed, 1);
    }

    #[tokio::test]
    async fn test_stream_error_is_fatal() {
        let recorder = Recorder::default();
        let stream = futures_util::stream::iter(vec![
            Ok(event("http://a")),
            Err(StreamError::Disconnected),
            Ok(event("http://never")),
        ]);

        let result = consume(stream, &recorder).await;

        assert!(matches!(
            result,
            Err(SessionError::Stream(StreamError::Disconnected))
        ));
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_event_twice_is_delivered_twice() {
        let recorder = Recorder::default();
        let stream = futures_util::stream::iter(vec![Ok(event("http://a")), Ok(event("http://a"))]);

        let report = consume(stream, &recorder).await.unwrap();

        assert_eq!(report.relayed, 2);
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0], seen[1]);
    }

    #[tokio::test]
    async fn test_invalid_address_fails_before_streaming() {
        let recorder = Recorder::default();
        let creds = Arc::new(relayd_sdk::credentials::AccessKeyCredentials::new("k", "s"));
        let session = RelaySession::new(ConnectOptions::new("ftp://nowhere"), creds, recorder);
        let state = session.state();

        let result = session.run(&SubscriptionFilter::all()).await;

        assert!(matches!(result, Err(SessionError::Connection(_))));
        assert_eq!(*state.borrow(), SessionState::Failed);
    }
}
