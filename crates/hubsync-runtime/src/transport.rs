//! Push channel: one WebSocket connection with automatic reconnection.
//!
//! A single driver task owns the socket and walks an explicit state machine:
//!
//! ```text
//!   Idle --connect--> Dialing --ok--> Connected
//!    ^                  |  ^              |
//!    |               fail  |           closed
//!    |                  v  |              v
//!    +---disconnect--- Backoff(delay) <---+
//! ```
//!
//! At most one reconnect timer exists: it lives inside the `Backoff` state
//! and is dropped when that state is left. Decoded frames go to a single
//! consumer, in arrival order.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hubsync_core::backoff::ReconnectBackoff;
use hubsync_core::event::{PushEvent, encode_frame, parse_frame};
use hubsync_core::types::ConnectionStatus;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// After this many consecutive failed dials, log them at debug level.
const DEBUG_LOG_THRESHOLD: u32 = 10;

/// What the driver reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Status(ConnectionStatus),
    Frame(PushEvent),
}

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub url: String,
    pub backoff: Vec<Duration>,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Connect,
    Disconnect,
}

/// Handle to the channel driver. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PushChannel {
    control_tx: mpsc::UnboundedSender<Control>,
    outbound_tx: mpsc::Sender<String>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl PushChannel {
    /// Start the driver in the `Idle` state. It runs until `cancel` fires or
    /// the consumer behind `events` goes away.
    pub fn spawn(
        options: ChannelOptions,
        events: mpsc::Sender<ChannelEvent>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::channel(options.queue_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);

        let driver = Driver {
            url: options.url,
            backoff: ReconnectBackoff::new(options.backoff),
            consecutive_failures: 0,
            control_rx,
            outbound_rx,
            events,
            status_tx,
            cancel,
        };
        let handle = tokio::spawn(driver.run());

        (
            Self {
                control_tx,
                outbound_tx,
                status_rx,
            },
            handle,
        )
    }

    /// Open the connection. No-op while connected or dialing; during a
    /// backoff wait it dials immediately.
    pub fn connect(&self) {
        let _ = self.control_tx.send(Control::Connect);
    }

    /// Close the connection and stop reconnecting until the next `connect`.
    pub fn disconnect(&self) {
        let _ = self.control_tx.send(Control::Disconnect);
    }

    /// Queue a `{type, data}` frame. Returns `false` (dropping the frame) if
    /// the channel is not open right now or the write queue is full.
    pub fn send(&self, kind: &str, data: &serde_json::Value) -> bool {
        if !self.status().is_open() {
            return false;
        }
        self.outbound_tx.try_send(encode_frame(kind, data)).is_ok()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }
}

enum Phase {
    Idle,
    Dialing,
    Backoff(Duration),
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct Driver {
    url: String,
    backoff: ReconnectBackoff,
    consecutive_failures: u32,
    control_rx: mpsc::UnboundedReceiver<Control>,
    outbound_rx: mpsc::Receiver<String>,
    events: mpsc::Sender<ChannelEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        info!(url = %self.url, "channel: driver started");
        let mut phase = Phase::Idle;
        loop {
            let next = match phase {
                Phase::Idle => self.idle().await,
                Phase::Dialing => self.dial().await,
                Phase::Backoff(delay) => self.wait(delay).await,
            };
            match next {
                Some(p) => phase = p,
                None => break,
            }
        }
        let _ = self.status_tx.send(ConnectionStatus::Disconnected);
        info!("channel: driver stopped");
    }

    async fn idle(&mut self) -> Option<Phase> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                ctrl = self.control_rx.recv() => match ctrl? {
                    Control::Connect => return Some(Phase::Dialing),
                    Control::Disconnect => continue,
                },
            }
        }
    }

    async fn dial(&mut self) -> Option<Phase> {
        // Frames queued for an earlier connection are stale.
        while self.outbound_rx.try_recv().is_ok() {}

        self.set_status(ConnectionStatus::Connecting).await?;
        let dial = tokio_tungstenite::connect_async(self.url.clone());
        tokio::pin!(dial);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                ctrl = self.control_rx.recv() => match ctrl? {
                    Control::Connect => continue,
                    Control::Disconnect => {
                        info!("channel: dial abandoned by disconnect");
                        self.set_status(ConnectionStatus::Disconnected).await?;
                        return Some(Phase::Idle);
                    }
                },
                result = &mut dial => match result {
                    Ok((ws, _response)) => {
                        info!(url = %self.url, "channel: connected");
                        self.backoff.reset();
                        self.consecutive_failures = 0;
                        self.set_status(ConnectionStatus::Connected).await?;
                        return self.pump(ws).await;
                    }
                    Err(e) => {
                        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                        if self.consecutive_failures >= DEBUG_LOG_THRESHOLD {
                            debug!(
                                consecutive_failures = self.consecutive_failures,
                                "channel: connection error: {e}"
                            );
                        } else {
                            warn!("channel: connection error: {e}");
                        }
                        self.set_status(ConnectionStatus::Error).await?;
                        return Some(Phase::Backoff(self.backoff.next_delay()));
                    }
                },
            }
        }
    }

    async fn pump(&mut self, ws: WsStream) -> Option<Phase> {
        let (mut sink, mut stream) = ws.split();

        let reason = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return None;
                }
                ctrl = self.control_rx.recv() => match ctrl {
                    Some(Control::Connect) => {}
                    Some(Control::Disconnect) => {
                        let _ = sink.send(Message::Close(None)).await;
                        info!("channel: disconnected");
                        self.set_status(ConnectionStatus::Disconnected).await?;
                        return Some(Phase::Idle);
                    }
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return None;
                    }
                },
                frame = self.outbound_rx.recv() => {
                    let text = frame?;
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        break format!("write error: {e}");
                    }
                }
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !self.deliver(&text).await {
                            return None;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break "closed by server".to_string(),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break format!("read error: {e}"),
                    None => break "stream ended".to_string(),
                },
            }
        };

        warn!(reason = %reason, "channel: connection lost");
        self.set_status(ConnectionStatus::Disconnected).await?;
        Some(Phase::Backoff(self.backoff.next_delay()))
    }

    async fn wait(&mut self, delay: Duration) -> Option<Phase> {
        info!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.backoff.attempt(),
            "channel: reconnecting after backoff"
        );
        let timer = tokio::time::sleep(delay);
        tokio::pin!(timer);

        tokio::select! {
            _ = self.cancel.cancelled() => None,
            ctrl = self.control_rx.recv() => match ctrl? {
                Control::Connect => Some(Phase::Dialing),
                Control::Disconnect => {
                    info!("channel: reconnect cancelled by disconnect");
                    self.set_status(ConnectionStatus::Disconnected).await?;
                    Some(Phase::Idle)
                }
            },
            _ = &mut timer => Some(Phase::Dialing),
        }
    }

    /// Decode and forward one text frame. Returns `false` once the consumer
    /// is gone.
    async fn deliver(&mut self, text: &str) -> bool {
        match parse_frame(text) {
            Ok(event) => self.events.send(ChannelEvent::Frame(event)).await.is_ok(),
            Err(e) => {
                debug!(error = %e, "channel: dropping malformed frame");
                true
            }
        }
    }

    /// Publish a status change. Unchanged statuses are not re-announced.
    /// Returns `None` once the consumer is gone.
    async fn set_status(&mut self, status: ConnectionStatus) -> Option<()> {
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            debug!(status = %status, "channel: status changed");
            self.events.send(ChannelEvent::Status(status)).await.ok()?;
        }
        Some(())
    }
}
