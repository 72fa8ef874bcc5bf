//! End-to-end session tests against an in-process subscription server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use relayd_core::{RelayError, RelaySession, Relayer, SessionError, SessionState};
use relayd_sdk::client::{ConnectOptions, ConnectionError, STREAM_PATH, StreamError};
use relayd_sdk::credentials::{AccessKeyCredentials, PerCallCredentials};
use relayd_sdk::objects::{Bucket, ClientMessage, ServerMessage, SubscriptionFilter, WebhookEvent};

/// Credentials that allow a plaintext channel to the local test server.
struct PlaintextCredentials;

impl PerCallCredentials for PlaintextCredentials {
    fn request_metadata(&self) -> Vec<(&'static str, String)> {
        vec![
            ("access_key", "dummy".to_string()),
            ("secret_key", "dummy".to_string()),
        ]
    }

    fn require_transport_security(&self) -> bool {
        false
    }
}

/// Relayer double capturing "relayed" events.
#[derive(Clone, Default)]
struct DummyRelayer {
    relayed: Arc<Mutex<Vec<WebhookEvent>>>,
    error: Option<String>,
}

impl DummyRelayer {
    fn failing(reason: &str) -> Self {
        Self {
            error: Some(reason.to_string()),
            ..Self::default()
        }
    }

    fn relayed(&self) -> Vec<WebhookEvent> {
        self.relayed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Relayer for DummyRelayer {
    async fn relay(&self, event: &WebhookEvent) -> Result<(), RelayError> {
        if let Some(reason) = &self.error {
            return Err(RelayError::Custom(reason.clone()));
        }
        self.relayed.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
struct Seen {
    filters: Vec<SubscriptionFilter>,
    metadata: Vec<(String, String)>,
}

#[derive(Clone, Default)]
struct FakeServer {
    webhooks: Vec<WebhookEvent>,
    /// Reject the subscription call with this reason.
    reject: Option<String>,
    /// Abort the stream with this reason after sending the webhooks.
    abort: Option<String>,
    /// Refuse the handshake unless this access key is presented.
    required_key: Option<String>,
    /// Never acknowledge the subscription.
    no_ack: bool,
    /// Send a frame that is not a server message after the webhooks.
    garbage_frame: bool,
    /// End the stream with this close code instead of 1000.
    close_code: Option<u16>,
    /// Drop the connection after the webhooks without a close frame.
    drop_without_close: bool,
    seen: Arc<Mutex<Seen>>,
}

fn header(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn stream_handler(
    State(server): State<FakeServer>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let access_key = header(&headers, "access_key");
    server
        .seen
        .lock()
        .unwrap()
        .metadata
        .push((access_key.clone(), header(&headers, "secret_key")));

    if server.required_key.as_ref().is_some_and(|key| *key != access_key) {
        return (StatusCode::UNAUTHORIZED, "invalid access key").into_response();
    }
    ws.on_upgrade(move |socket| serve(socket, server))
}

async fn serve(mut socket: WebSocket, server: FakeServer) {
    let Some(Ok(Message::Text(text))) = socket.recv().await else {
        return;
    };
    let ClientMessage::Subscribe { filter } = serde_json::from_str(text.as_str()).unwrap();
    server.seen.lock().unwrap().filters.push(filter);

    if let Some(reason) = &server.reject {
        send(&mut socket, &ServerMessage::Error { code: 2, reason: reason.clone() }).await;
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: 4002,
                reason: "rejected".into(),
            })))
            .await;
        return;
    }

    if server.no_ack {
        while let Some(Ok(_)) = socket.recv().await {}
        return;
    }

    send(&mut socket, &ServerMessage::Subscribed).await;
    for event in &server.webhooks {
        send(&mut socket, &ServerMessage::Webhook(event.clone())).await;
    }

    if let Some(reason) = &server.abort {
        send(&mut socket, &ServerMessage::Error { code: 14, reason: reason.clone() }).await;
        return;
    }
    if server.garbage_frame {
        socket
            .send(Message::Text(r#"{"type":"unknown"}"#.to_string().into()))
            .await
            .unwrap();
        return;
    }
    if server.drop_without_close {
        return;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: server.close_code.unwrap_or(1000),
            reason: if server.close_code.is_some() { "internal error" } else { "" }.into(),
        })))
        .await;
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) {
    let json = serde_json::to_string(message).unwrap();
    socket.send(Message::Text(json.into())).await.unwrap();
}

async fn serve_on(listener: tokio::net::TcpListener, server: FakeServer) {
    let app = Router::new()
        .route(STREAM_PATH, get(stream_handler))
        .with_state(server);
    axum::serve(listener, app).await.unwrap();
}

async fn spawn_server(server: FakeServer) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_on(listener, server));
    addr
}

/// Start the server on a free port only after `delay`.
async fn spawn_server_late(server: FakeServer, delay: Duration) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        serve_on(listener, server).await;
    });
    addr
}

fn options(addr: SocketAddr) -> ConnectOptions {
    ConnectOptions::new(format!("ws://{addr}")).with_dial_timeout(Duration::from_secs(2))
}

fn session(addr: SocketAddr, relayer: DummyRelayer) -> RelaySession<DummyRelayer> {
    RelaySession::new(options(addr), Arc::new(PlaintextCredentials), relayer)
}

fn sample_event() -> WebhookEvent {
    WebhookEvent::new(
        Bucket {
            id: "xx".into(),
            name: "bucket_name".into(),
        },
        "GET",
        "http://localhost:3000",
    )
}

#[tokio::test]
async fn test_single_event_is_relayed() {
    let server = FakeServer {
        webhooks: vec![sample_event()],
        ..FakeServer::default()
    };
    let seen = server.seen.clone();
    let addr = spawn_server(server).await;
    let relayer = DummyRelayer::default();

    let session = session(addr, relayer.clone());
    let state = session.state();
    let report = session.run(&SubscriptionFilter::all()).await.unwrap();

    let relayed = relayer.relayed();
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].bucket.id, "xx");
    assert_eq!(relayed[0].bucket.name, "bucket_name");
    assert_eq!(relayed[0].request.destination, "http://localhost:3000");
    assert_eq!(report.received, 1);
    assert_eq!(*state.borrow(), SessionState::Closed);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.metadata, vec![("dummy".to_string(), "dummy".to_string())]);
}

#[tokio::test]
async fn test_rejected_subscription_is_connection_error() {
    let addr = spawn_server(FakeServer {
        webhooks: vec![sample_event()],
        reject: Some("dummy testing error".into()),
        ..FakeServer::default()
    })
    .await;
    let relayer = DummyRelayer::default();

    let session = session(addr, relayer.clone());
    let state = session.state();
    let err = session.run(&SubscriptionFilter::all()).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Connection(ConnectionError::Subscription { code: 2, .. })
    ));
    assert!(err.to_string().contains("dummy testing error"));
    assert!(relayer.relayed().is_empty());
    assert_eq!(*state.borrow(), SessionState::Failed);
}

#[tokio::test]
async fn test_relayer_errors_do_not_fail_session() {
    let addr = spawn_server(FakeServer {
        webhooks: vec![sample_event()],
        ..FakeServer::default()
    })
    .await;
    let relayer = DummyRelayer::failing("relayer error");

    let report = session(addr, relayer.clone())
        .run(&SubscriptionFilter::all())
        .await
        .unwrap();

    assert!(relayer.relayed().is_empty());
    assert_eq!(report.received, 1);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_events_relayed_in_receipt_order_unmodified() {
    let webhooks: Vec<_> = (0..10)
        .map(|i| {
            sample_event()
                .with_header("X-Sequence", i.to_string())
                .with_header("X-Multi", "first")
                .with_header("X-Multi", "second")
                .with_body(vec![0u8, 159, 146, 150, i as u8])
        })
        .collect();
    let addr = spawn_server(FakeServer {
        webhooks: webhooks.clone(),
        ..FakeServer::default()
    })
    .await;
    let relayer = DummyRelayer::default();

    session(addr, relayer.clone())
        .run(&SubscriptionFilter::all())
        .await
        .unwrap();

    assert_eq!(relayer.relayed(), webhooks);
}

#[tokio::test]
async fn test_filter_is_sent_to_server() {
    let server = FakeServer::default();
    let seen = server.seen.clone();
    let addr = spawn_server(server).await;
    let filter = SubscriptionFilter::all()
        .with_bucket("github")
        .with_destination("http://localhost:8080/hooks");

    session(addr, DummyRelayer::default()).run(&filter).await.unwrap();

    assert_eq!(seen.lock().unwrap().filters, vec![filter]);
}

#[tokio::test]
async fn test_mid_stream_error_fails_session_after_relaying() {
    let addr = spawn_server(FakeServer {
        webhooks: vec![sample_event(), sample_event()],
        abort: Some("server shutting down".into()),
        ..FakeServer::default()
    })
    .await;
    let relayer = DummyRelayer::default();

    let session = session(addr, relayer.clone());
    let state = session.state();
    let err = session.run(&SubscriptionFilter::all()).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Stream(StreamError::Server { code: 14, .. })
    ));
    assert_eq!(relayer.relayed().len(), 2);
    assert_eq!(*state.borrow(), SessionState::Failed);
}

#[tokio::test]
async fn test_handshake_rejection() {
    let addr = spawn_server(FakeServer {
        webhooks: vec![sample_event()],
        required_key: Some("expected".into()),
        ..FakeServer::default()
    })
    .await;
    let relayer = DummyRelayer::default();

    let err = session(addr, relayer.clone())
        .run(&SubscriptionFilter::all())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SessionError::Connection(ConnectionError::Rejected(status)) if status.as_u16() == 401
    ));
    assert!(relayer.relayed().is_empty());
}

#[tokio::test]
async fn test_unreachable_server() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let relayer = DummyRelayer::default();

    let session = RelaySession::new(
        options(addr).with_dial_timeout(Duration::from_millis(300)),
        Arc::new(PlaintextCredentials),
        relayer.clone(),
    );
    let err = session.run(&SubscriptionFilter::all()).await.unwrap_err();

    assert!(matches!(err, SessionError::Connection(_)));
    assert!(relayer.relayed().is_empty());
}

#[tokio::test]
async fn test_tls_credentials_never_sent_over_plaintext() {
    let server = FakeServer {
        webhooks: vec![sample_event()],
        ..FakeServer::default()
    };
    let seen = server.seen.clone();
    let addr = spawn_server(server).await;
    let relayer = DummyRelayer::default();

    let session = RelaySession::new(
        options(addr),
        Arc::new(AccessKeyCredentials::new("key", "secret")),
        relayer.clone(),
    );
    let err = session.run(&SubscriptionFilter::all()).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Connection(ConnectionError::InsecureTransport(_))
    ));
    assert!(seen.lock().unwrap().metadata.is_empty());
    assert!(relayer.relayed().is_empty());
}

#[tokio::test]
async fn test_dial_retries_until_server_listens() {
    let addr = spawn_server_late(
        FakeServer {
            webhooks: vec![sample_event()],
            ..FakeServer::default()
        },
        Duration::from_millis(1000),
    )
    .await;
    let relayer = DummyRelayer::default();

    // Uncapped doubling would sleep through to 1.5s; a 150ms ceiling
    // redials every 150ms once the delay saturates.
    let session = RelaySession::new(
        options(addr)
            .with_dial_timeout(Duration::from_secs(5))
            .with_backoff_max_delay(Duration::from_millis(150)),
        Arc::new(PlaintextCredentials),
        relayer.clone(),
    );
    let started = tokio::time::Instant::now();
    let report = session.run(&SubscriptionFilter::all()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.received, 1);
    assert_eq!(relayer.relayed().len(), 1);
    assert!(elapsed >= Duration::from_millis(950), "connected at {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1400), "connected at {elapsed:?}");
}

#[tokio::test]
async fn test_missing_acknowledgement_times_out() {
    let addr = spawn_server(FakeServer {
        webhooks: vec![sample_event()],
        no_ack: true,
        ..FakeServer::default()
    })
    .await;
    let relayer = DummyRelayer::default();

    let session = RelaySession::new(
        options(addr).with_dial_timeout(Duration::from_millis(300)),
        Arc::new(PlaintextCredentials),
        relayer.clone(),
    );
    let state = session.state();
    let err = session.run(&SubscriptionFilter::all()).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Connection(ConnectionError::Timeout(timeout)) if timeout == Duration::from_millis(300)
    ));
    assert!(relayer.relayed().is_empty());
    assert_eq!(*state.borrow(), SessionState::Failed);
}

#[tokio::test]
async fn test_abnormal_close_code_fails_session() {
    let addr = spawn_server(FakeServer {
        webhooks: vec![sample_event()],
        close_code: Some(1011),
        ..FakeServer::default()
    })
    .await;
    let relayer = DummyRelayer::default();

    let session = session(addr, relayer.clone());
    let state = session.state();
    let err = session.run(&SubscriptionFilter::all()).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Stream(StreamError::Closed { code: 1011, ref reason }) if reason == "internal error"
    ));
    assert_eq!(relayer.relayed().len(), 1);
    assert_eq!(*state.borrow(), SessionState::Failed);
}

#[tokio::test]
async fn test_malformed_frame_fails_session() {
    let addr = spawn_server(FakeServer {
        webhooks: vec![sample_event(), sample_event()],
        garbage_frame: true,
        ..FakeServer::default()
    })
    .await;
    let relayer = DummyRelayer::default();

    let err = session(addr, relayer.clone())
        .run(&SubscriptionFilter::all())
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Stream(StreamError::Decode(_))));
    assert_eq!(relayer.relayed().len(), 2);
}

#[tokio::test]
async fn test_connection_drop_without_close_frame() {
    let addr = spawn_server(FakeServer {
        webhooks: vec![sample_event()],
        drop_without_close: true,
        ..FakeServer::default()
    })
    .await;
    let relayer = DummyRelayer::default();

    let session = session(addr, relayer.clone());
    let state = session.state();
    let err = session.run(&SubscriptionFilter::all()).await.unwrap_err();

    assert!(matches!(err, SessionError::Stream(StreamError::Disconnected)));
    assert_eq!(relayer.relayed().len(), 1);
    assert_eq!(*state.borrow(), SessionState::Failed);
}
