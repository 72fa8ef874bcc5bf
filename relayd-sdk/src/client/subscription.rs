//! The server-streamed event sequence of one subscription.

use futures_util::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, trace};

use super::StreamError;
use super::channel::Socket;
use crate::objects::{ServerMessage, StreamCloseCode, WebhookEvent};

/// One decoded read from the socket.
pub(super) enum Incoming {
    Message(ServerMessage),
    Malformed(serde_json::Error),
    /// Close frame, with its code and reason if the peer sent one.
    Closed(Option<(u16, String)>),
    /// The socket ended without a close frame.
    Ended,
    /// Ping, pong or raw frames; answered by the transport.
    Control,
}

pub(super) async fn read_frame(socket: &mut Socket) -> Result<Incoming, tungstenite::Error> {
    let Some(message) = socket.next().await else {
        return Ok(Incoming::Ended);
    };
    let message = match message {
        Ok(message) => message,
        // EOF before any close frame.
        Err(tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)) => {
            return Ok(Incoming::Ended);
        }
        Err(e) => return Err(e),
    };
    let incoming = match message {
        Message::Text(text) => decode(serde_json::from_str(&text)),
        Message::Binary(data) => decode(serde_json::from_slice(&data)),
        Message::Close(frame) => {
            Incoming::Closed(frame.map(|f| (u16::from(f.code), f.reason.into_owned())))
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Incoming::Control,
    };
    Ok(incoming)
}

fn decode(result: Result<ServerMessage, serde_json::Error>) -> Incoming {
    match result {
        Ok(message) => Incoming::Message(message),
        Err(e) => Incoming::Malformed(e),
    }
}

/// A lazy, finite, non-restartable sequence of webhook events.
///
/// Yields events in receipt order until the server ends the stream. A
/// terminal error is yielded once; afterwards, and after a clean end, the
/// sequence only returns `None`. Dropping the subscription closes the
/// underlying connection.
pub struct Subscription {
    socket: Socket,
    finished: bool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub(super) fn new(socket: Socket) -> Self {
        Self {
            socket,
            finished: false,
        }
    }

    /// Block until the next event, the end of the stream, or a failure.
    pub async fn next_event(&mut self) -> Option<Result<WebhookEvent, StreamError>> {
        if self.finished {
            return None;
        }

        let outcome = loop {
            let incoming = match read_frame(&mut self.socket).await {
                Ok(incoming) => incoming,
                Err(e) => break Some(Err(StreamError::Transport(e))),
            };
            match incoming {
                Incoming::Message(ServerMessage::Webhook(event)) => return Some(Ok(event)),
                Incoming::Message(ServerMessage::Subscribed) | Incoming::Control => {
                    trace!("skipping control frame");
                }
                Incoming::Message(ServerMessage::Error { code, reason }) => {
                    break Some(Err(StreamError::Server { code, reason }));
                }
                Incoming::Malformed(e) => break Some(Err(StreamError::Decode(e))),
                Incoming::Closed(None) => break None,
                Incoming::Closed(Some((code, _))) if code == StreamCloseCode::NORMAL => break None,
                Incoming::Closed(Some((code, reason))) => {
                    break Some(Err(StreamError::Closed { code, reason }));
                }
                Incoming::Ended => break Some(Err(StreamError::Disconnected)),
            }
        };

        self.finished = true;
        if outcome.is_none() {
            debug!("subscription ended by server");
            // Flush the close reply queued by the transport.
            let _ = self.socket.close(None).await;
        }
        outcome
    }

    /// Adapt the subscription into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<WebhookEvent, StreamError>> + Send {
        futures_util::stream::unfold(self, |mut subscription| async move {
            subscription
                .next_event()
                .await
                .map(|item| (item, subscription))
        })
    }
}
