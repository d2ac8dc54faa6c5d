//! Persistent WebSocket link to the crew server.
//!
//! A spawned driver task owns the socket. It reports lifecycle changes and
//! raw text frames on an event channel, pings on a fixed heartbeat and
//! reconnects after unclean closes following [`ReconnectPolicy`].

use crate::backoff::ReconnectPolicy;
use crate::config::ConnectionConfig;
use crew_core::dispatch::{CloseInfo, ConnectionEvent};
use crew_core::protocol::OutboundMessage;
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const DISCONNECT_REASON: &str = "Client disconnect";
const NO_STATUS_RECEIVED: u16 = 1005;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct Link {
    state: ConnectionState,
    /// Bumped for every new driver so a superseded one cannot publish.
    generation: u64,
}

#[derive(Debug)]
struct Shared {
    link: Mutex<Link>,
    policy: Mutex<ReconnectPolicy>,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn policy(&self) -> MutexGuard<'_, ReconnectPolicy> {
        self.policy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.link().generation == generation
    }

    fn set_state(&self, generation: u64, state: ConnectionState) {
        let mut link = self.link();
        if link.generation == generation {
            link.state = state;
        }
    }
}

pub struct ConnectionManager {
    config: ConnectionConfig,
    shared: Arc<Shared>,
    events: mpsc::Sender<ConnectionEvent>,
    outbound: Option<mpsc::Sender<String>>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Creates a closed manager and the receiver its events arrive on.
    pub fn new(config: ConnectionConfig) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let policy = ReconnectPolicy::new(config.reconnect_base, config.max_reconnect_attempts);
        let shared = Arc::new(Shared {
            link: Mutex::new(Link {
                state: ConnectionState::Closed,
                generation: 0,
            }),
            policy: Mutex::new(policy),
        });
        let manager = Self {
            config,
            shared,
            events,
            outbound: None,
            shutdown: None,
            task: None,
        };
        (manager, rx)
    }

    /// Starts a driver unless one is already connecting or connected.
    /// Must be called from within a tokio runtime.
    pub fn connect(&mut self) {
        let generation = {
            let mut link = self.shared.link();
            if matches!(
                link.state,
                ConnectionState::Connecting | ConnectionState::Open
            ) {
                return;
            }
            link.generation += 1;
            link.state = ConnectionState::Connecting;
            link.generation
        };
        // A driver waiting out a reconnect delay is replaced.
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let driver = Driver {
            config: self.config.clone(),
            shared: self.shared.clone(),
            events: self.events.clone(),
            generation,
            shutdown: shutdown_rx,
            outbound: outbound_rx,
        };
        debug!("ws_driver_start: generation={generation} url={}", self.config.url);
        self.shutdown = Some(shutdown_tx);
        self.outbound = Some(outbound_tx);
        self.task = Some(tokio::spawn(driver.run()));
    }

    /// Closes with a normal closure and cancels heartbeat and any pending
    /// reconnect. Calling it again is a no-op.
    pub fn disconnect(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };
        {
            let mut link = self.shared.link();
            link.state = match link.state {
                ConnectionState::Open => ConnectionState::Closing,
                _ => ConnectionState::Closed,
            };
        }
        let _ = shutdown.send(true);
        self.outbound = None;
    }

    /// Like [`disconnect`](Self::disconnect), then waits for the driver to exit.
    pub async fn close(&mut self) {
        self.disconnect();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Queues a message if the link is open. Returns false otherwise.
    pub fn send(&self, message: &OutboundMessage) -> bool {
        if self.state() != ConnectionState::Open {
            return false;
        }
        let Some(outbound) = self.outbound.as_ref() else {
            return false;
        };
        let encoded = match message.encode() {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!("ws_encode_error: {err}");
                return false;
            }
        };
        outbound.try_send(encoded).is_ok()
    }

    pub fn request_status(&self) -> bool {
        self.send(&OutboundMessage::status_request())
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.link().state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.policy().attempts()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
    }
}

enum SessionEnd {
    Closed(CloseInfo),
    Shutdown,
}

struct Driver {
    config: ConnectionConfig,
    shared: Arc<Shared>,
    events: mpsc::Sender<ConnectionEvent>,
    generation: u64,
    shutdown: watch::Receiver<bool>,
    outbound: mpsc::Receiver<String>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            self.shared
                .set_state(self.generation, ConnectionState::Connecting);
            let connect = tokio::select! {
                result = connect_async(self.config.url.as_str()) => result,
                _ = self.shutdown.changed() => {
                    self.finish();
                    return;
                }
            };

            match connect {
                Ok((ws, _)) => {
                    self.shared.policy().reset();
                    self.shared.set_state(self.generation, ConnectionState::Open);
                    info!("ws_connected: {}", self.config.url);
                    self.emit(ConnectionEvent::Connected).await;

                    let end = self.session(ws).await;
                    self.shared.set_state(self.generation, ConnectionState::Closed);
                    match end {
                        SessionEnd::Shutdown => {
                            self.emit(ConnectionEvent::Disconnected(CloseInfo::normal(
                                DISCONNECT_REASON,
                            )))
                            .await;
                            return;
                        }
                        SessionEnd::Closed(close) => {
                            info!(
                                "ws_disconnected: code={} clean={}",
                                close.code, close.clean
                            );
                            let clean = close.clean;
                            self.emit(ConnectionEvent::Disconnected(close)).await;
                            if clean {
                                return;
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!("ws_connect_error: {err}");
                    self.shared.set_state(self.generation, ConnectionState::Closed);
                    self.emit(ConnectionEvent::Error(err.to_string())).await;
                    self.emit(ConnectionEvent::Disconnected(CloseInfo::abnormal()))
                        .await;
                }
            }

            let delay = self.shared.policy().next_delay();
            let Some(delay) = delay else {
                info!(
                    "ws_reconnect_exhausted: max_attempts={}",
                    self.config.max_reconnect_attempts
                );
                return;
            };
            info!(
                "ws_reconnect_scheduled: attempt={} delay_ms={}",
                self.shared.policy().attempts(),
                delay.as_millis()
            );
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = self.shutdown.changed() => {
                    self.finish();
                    return;
                }
            }
        }
    }

    async fn session(&mut self, mut ws: Socket) -> SessionEnd {
        let period = self.config.heartbeat_interval;
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        let mut server_close: Option<CloseInfo> = None;

        loop {
            tokio::select! {
                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.emit(ConnectionEvent::Message(text)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        // The reply is flushed on the next read, which then ends the stream.
                        server_close = Some(close_info(frame));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        if let Some(close) = server_close.take() {
                            return SessionEnd::Closed(close);
                        }
                        warn!("ws_read_error: {err}");
                        self.emit(ConnectionEvent::Error(err.to_string())).await;
                        return SessionEnd::Closed(CloseInfo::abnormal());
                    }
                    None => {
                        return SessionEnd::Closed(server_close.unwrap_or_else(CloseInfo::abnormal));
                    }
                },
                Some(out) = self.outbound.recv() => {
                    if let Err(err) = ws.send(Message::Text(out)).await {
                        warn!("ws_send_error: {err}");
                        self.emit(ConnectionEvent::Error(err.to_string())).await;
                        return SessionEnd::Closed(CloseInfo::abnormal());
                    }
                }
                _ = heartbeat.tick() => {
                    let Ok(ping) = OutboundMessage::ping().encode() else {
                        continue;
                    };
                    if let Err(err) = ws.send(Message::Text(ping)).await {
                        warn!("ws_heartbeat_error: {err}");
                        self.emit(ConnectionEvent::Error(err.to_string())).await;
                        return SessionEnd::Closed(CloseInfo::abnormal());
                    }
                }
                _ = self.shutdown.changed() => {
                    close_gracefully(&mut ws).await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    async fn emit(&self, event: ConnectionEvent) {
        if !self.shared.is_current(self.generation) {
            debug!("ws_stale_event_dropped: generation={}", self.generation);
            return;
        }
        let _ = self.events.send(event).await;
    }

    fn finish(&self) {
        self.shared.set_state(self.generation, ConnectionState::Closed);
    }
}

async fn close_gracefully(ws: &mut Socket) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: DISCONNECT_REASON.into(),
    };
    if let Err(err) = ws.close(Some(frame)).await {
        debug!("ws_close_error: {err}");
        return;
    }
    // Wait for the server's close reply so the handshake completes.
    let drain = async { while let Some(Ok(_)) = ws.next().await {} };
    if time::timeout(CLOSE_DRAIN_TIMEOUT, drain).await.is_err() {
        debug!("ws_close_drain_timeout");
    }
}

fn close_info(frame: Option<CloseFrame<'_>>) -> CloseInfo {
    match frame {
        Some(frame) => {
            let code = u16::from(frame.code);
            CloseInfo {
                code,
                reason: frame.reason.to_string(),
                clean: code != CloseInfo::abnormal().code,
            }
        }
        None => CloseInfo {
            code: NO_STATUS_RECEIVED,
            reason: String::new(),
            clean: true,
        },
    }
}
