use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hubsync_core::event::PushEvent;
use hubsync_core::types::ConnectionStatus;
use hubsync_runtime::transport::{ChannelEvent, ChannelOptions, PushChannel};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// How the test server treats each accepted connection.
#[derive(Clone)]
enum Script {
    /// Send these frames, then echo every received text frame to `received`.
    SendThenListen(Vec<String>),
    /// Send these frames, then close the connection.
    SendThenClose(Vec<String>),
}

struct TestServer {
    addr: SocketAddr,
    accepts: Arc<AtomicUsize>,
    received: mpsc::UnboundedReceiver<String>,
}

impl TestServer {
    async fn start(script: Script) -> Self {
        Self::start_at("127.0.0.1:0".parse().unwrap(), script).await
    }

    async fn start_at(addr: SocketAddr, script: Script) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));
        let (received_tx, received) = mpsc::unbounded_channel();

        let counter = Arc::clone(&accepts);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let script = script.clone();
                let received_tx = received_tx.clone();
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    match script {
                        Script::SendThenListen(frames) => {
                            for frame in frames {
                                ws.send(Message::Text(frame)).await.unwrap();
                            }
                            while let Some(Ok(msg)) = ws.next().await {
                                if let Message::Text(text) = msg {
                                    let _ = received_tx.send(text);
                                }
                            }
                        }
                        Script::SendThenClose(frames) => {
                            for frame in frames {
                                ws.send(Message::Text(frame)).await.unwrap();
                            }
                            let _ = ws.close(None).await;
                        }
                    }
                });
            }
        });

        Self {
            addr,
            accepts,
            received,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

fn options(url: String) -> ChannelOptions {
    ChannelOptions {
        url,
        backoff: vec![Duration::from_millis(20)],
        queue_capacity: 16,
    }
}

async fn next_event(rx: &mut mpsc::Receiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for channel event")
        .expect("channel closed")
}

async fn next_status(rx: &mut mpsc::Receiver<ChannelEvent>) -> ConnectionStatus {
    loop {
        if let ChannelEvent::Status(status) = next_event(rx).await {
            return status;
        }
    }
}

async fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn free_port_url() -> String {
    format!("ws://{}/ws", free_addr().await)
}

#[tokio::test]
async fn frames_arrive_in_order_and_malformed_ones_are_dropped() {
    let server = TestServer::start(Script::SendThenListen(vec![
        r#"{"type": "agent_thinking", "data": {"agent": "Coder", "task_id": 1}}"#.into(),
        "not json at all".into(),
        r#"{"type": "agent_response", "data": {"token": 42}}"#.into(),
        r#"{"type": "agent_response", "data": {"agent": "Coder", "token": "hi"}}"#.into(),
        r#"{"type": "pong", "data": {}}"#.into(),
    ]))
    .await;

    let (events_tx, mut events_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let (channel, _handle) = PushChannel::spawn(options(server.url()), events_tx, cancel.clone());
    channel.connect();

    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connected);

    let kinds: Vec<String> = {
        let mut kinds = Vec::new();
        for _ in 0..3 {
            match next_event(&mut events_rx).await {
                ChannelEvent::Frame(event) => kinds.push(event.kind().to_string()),
                other => panic!("unexpected {other:?}"),
            }
        }
        kinds
    };
    assert_eq!(kinds, vec!["agent_thinking", "agent_response", "pong"]);
    assert_eq!(channel.status(), ConnectionStatus::Connected);

    cancel.cancel();
}

#[tokio::test]
async fn send_reaches_server_only_while_open() {
    let mut server = TestServer::start(Script::SendThenListen(vec![])).await;
    let (events_tx, mut events_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let (channel, _handle) = PushChannel::spawn(options(server.url()), events_tx, cancel.clone());

    assert!(!channel.send("get_status", &serde_json::json!({})));

    channel.connect();
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connected);

    assert!(channel.send("get_status", &serde_json::json!({})));
    let text = tokio::time::timeout(Duration::from_secs(5), server.received.recv())
        .await
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["type"], "get_status");

    cancel.cancel();
}

#[tokio::test]
async fn server_close_triggers_reconnect() {
    let server = TestServer::start(Script::SendThenClose(vec![
        r#"{"type": "error", "data": {"message": "bye"}}"#.into(),
    ]))
    .await;
    let (events_tx, mut events_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let (channel, _handle) = PushChannel::spawn(options(server.url()), events_tx, cancel.clone());
    channel.connect();

    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connected);
    match next_event(&mut events_rx).await {
        ChannelEvent::Frame(PushEvent::Error(err)) => assert_eq!(err.message, "bye"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Disconnected);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connected);
    assert!(server.accepts.load(Ordering::SeqCst) >= 2);

    cancel.cancel();
}

#[tokio::test]
async fn failed_dial_reports_error_and_retries() {
    let (events_tx, mut events_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let (channel, _handle) = PushChannel::spawn(options(free_port_url().await), events_tx, cancel.clone());
    channel.connect();

    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Error);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Error);

    cancel.cancel();
}

#[tokio::test]
async fn disconnect_cancels_pending_reconnect() {
    let (events_tx, mut events_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let mut opts = options(free_port_url().await);
    opts.backoff = vec![Duration::from_millis(200)];
    let (channel, _handle) = PushChannel::spawn(opts, events_tx, cancel.clone());
    channel.connect();

    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Error);
    channel.disconnect();
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Disconnected);

    let quiet = tokio::time::timeout(Duration::from_millis(500), events_rx.recv()).await;
    assert!(quiet.is_err(), "no reconnect attempt expected after disconnect");
    assert_eq!(channel.status(), ConnectionStatus::Disconnected);

    cancel.cancel();
}

#[tokio::test]
async fn explicit_disconnect_then_connect_again() {
    let server = TestServer::start(Script::SendThenListen(vec![])).await;
    let (events_tx, mut events_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let (channel, _handle) = PushChannel::spawn(options(server.url()), events_tx, cancel.clone());

    channel.connect();
    channel.connect();
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connected);

    channel.disconnect();
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Disconnected);
    assert!(!channel.send("ping", &serde_json::json!({})));

    channel.connect();
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connected);
    assert_eq!(server.accepts.load(Ordering::SeqCst), 2);

    cancel.cancel();
}

#[tokio::test]
async fn cancel_stops_the_driver() {
    let server = TestServer::start(Script::SendThenListen(vec![])).await;
    let (events_tx, mut events_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let (channel, handle) = PushChannel::spawn(options(server.url()), events_tx, cancel.clone());
    channel.connect();
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connected);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("driver should stop within timeout")
        .unwrap();
    assert_eq!(channel.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn backoff_steps_up_and_resets_after_open() {
    let addr = free_addr().await;
    let (events_tx, mut events_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let mut opts = options(format!("ws://{addr}/ws"));
    opts.backoff = vec![Duration::from_millis(20), Duration::from_secs(5)];
    let (channel, _handle) = PushChannel::spawn(opts, events_tx, cancel.clone());
    channel.connect();

    // First failure waits 20ms, the second one 5s.
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Error);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Error);
    let quiet = tokio::time::timeout(Duration::from_millis(500), events_rx.recv()).await;
    assert!(quiet.is_err(), "second retry should wait for the longer delay");

    // Bring the server up and skip the long wait. After a successful open the
    // schedule starts over, so the closure that follows retries after 20ms.
    let server = TestServer::start_at(addr, Script::SendThenClose(vec![])).await;
    channel.connect();
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connected);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Disconnected);

    let reconnect = tokio::time::timeout(Duration::from_secs(2), next_status(&mut events_rx))
        .await
        .expect("reconnect should use the first delay again");
    assert_eq!(reconnect, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut events_rx).await, ConnectionStatus::Connected);
    assert!(server.accepts.load(Ordering::SeqCst) >= 2);

    cancel.cancel();
}
