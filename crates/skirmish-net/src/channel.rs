//! WebSocket channel client for the game server.
//!
//! Manages the full connection lifecycle: connecting, joining a topic,
//! heartbeat keepalive, routing inbound events to subscribers, and clean
//! disconnect. State changes are broadcast via a [`watch`] channel so any
//! number of consumers can react without polling.
//!
//! Three background tasks run per connection: a reader that decodes frames
//! and routes them, a writer that owns the socket sink, and a heartbeat
//! ticker. All three exit when the connection is closed from either side.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::messages::{
    Frame, MessageError, PHOENIX_TOPIC, PHX_CLOSE, PHX_ERROR, PHX_REPLY, Reply, decode_frame,
    encode_frame,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// WebSocket handshake in progress.
    Connecting,
    /// Socket open, ready for communication.
    Connected,
    /// Connection lost or intentionally closed.
    Disconnected,
}

/// Observable connection state backed by a [`watch`] channel.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Creates a watch initialized to [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx, rx }
    }

    /// Sets the state, notifying subscribers only if it changed.
    pub fn set(&self, state: ConnectionState) {
        self.tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    /// Returns a new subscriber.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// Current state.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

// ---------------------------------------------------------------------------
// Config, session, errors
// ---------------------------------------------------------------------------

/// Shortest heartbeat period used, whatever the config says.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

/// Timing knobs for one connection.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Period between heartbeats, floored at [`MIN_HEARTBEAT_INTERVAL`].
    /// Default: 30 s.
    pub heartbeat_interval: Duration,
    /// Silence from the server longer than this marks the connection lost.
    /// Default: 60 s.
    pub heartbeat_timeout: Duration,
    /// How long [`ChannelClient::join`] waits for the reply. Default: 10 s.
    pub join_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            join_timeout: Duration::from_secs(10),
        }
    }
}

/// A successful join. Outbound pushes go to this topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Joined topic.
    pub topic: String,
    /// Ref of the join that opened this session.
    pub join_ref: String,
    /// Player id assigned by the server, if the join reply carried one.
    pub player_id: Option<String>,
}

impl Session {
    fn from_reply(topic: &str, join_ref: String, response: &Value) -> Self {
        let player_id = match response.get("player_id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        Self {
            topic: topic.to_string(),
            join_ref,
            player_id,
        }
    }
}

/// Errors produced by the channel client.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The WebSocket could not be opened.
    #[error("websocket connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame could not be encoded.
    #[error(transparent)]
    Message(#[from] MessageError),

    /// The server answered the join with an error.
    #[error("join of {topic} rejected: {response}")]
    JoinRejected {
        /// Topic that was refused.
        topic: String,
        /// Server-provided reason.
        response: Value,
    },

    /// No join reply arrived in time.
    #[error("join of {0} timed out")]
    JoinTimeout(String),

    /// No topic has been joined yet.
    #[error("no channel joined")]
    NotJoined,

    /// The connection is closed.
    #[error("connection closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

enum Outbound {
    Text(String),
    Close,
}

/// State shared between the client handle and its background tasks.
struct Shared {
    state: ConnectionStateWatch,
    shutdown_tx: watch::Sender<bool>,
    pending: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
    subscriptions: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>,
    last_heard: Mutex<Instant>,
    next_ref: AtomicU64,
}

/// Locks a mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn make_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Marks the connection lost and stops every background task.
    fn close(&self) {
        self.shutdown_tx.send_replace(true);
        self.state.set(ConnectionState::Disconnected);
        // Dropping the senders wakes any join still waiting for a reply.
        lock(&self.pending).clear();
    }

    fn route(&self, frame: Frame) {
        *lock(&self.last_heard) = Instant::now();

        if frame.event == PHX_REPLY {
            let Some(msg_ref) = frame.msg_ref.as_deref() else {
                return;
            };
            let waiter = lock(&self.pending).remove(msg_ref);
            match (waiter, frame.reply()) {
                (Some(tx), Ok(reply)) => {
                    let _ = tx.send(reply);
                }
                (None, _) if frame.topic == PHOENIX_TOPIC => {}
                (_, Err(error)) => tracing::warn!(%error, "undecodable reply"),
                (None, Ok(_)) => tracing::trace!(msg_ref, "reply for unknown ref"),
            }
            return;
        }

        if frame.event == PHX_CLOSE || frame.event == PHX_ERROR {
            tracing::warn!(topic = %frame.topic, event = %frame.event, "channel closed by server");
            self.close();
            return;
        }

        let mut subscriptions = lock(&self.subscriptions);
        match subscriptions.get_mut(&frame.event) {
            Some(subscribers) => {
                subscribers.retain(|tx| tx.send(frame.payload.clone()).is_ok());
            }
            None => tracing::trace!(event = %frame.event, "no subscriber for event"),
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelClient
// ---------------------------------------------------------------------------

/// Handle to one WebSocket connection.
///
/// Created via [`ChannelClient::connect`]. Dropping the handle closes the
/// connection.
pub struct ChannelClient {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Outbound>,
    session: Mutex<Option<Session>>,
    config: ChannelConfig,
}

impl ChannelClient {
    /// Opens a WebSocket to `url` and starts the reader, writer and heartbeat
    /// tasks. Returns once the handshake completes.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Connect`] if the handshake fails.
    pub async fn connect(url: &str, config: ChannelConfig) -> Result<Self, ChannelError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            state: ConnectionStateWatch::new(),
            shutdown_tx,
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            last_heard: Mutex::new(Instant::now()),
            next_ref: AtomicU64::new(1),
        });
        shared.state.set(ConnectionState::Connecting);

        let ws = match connect_async(url).await {
            Ok((ws, _response)) => ws,
            Err(error) => {
                shared.state.set(ConnectionState::Disconnected);
                return Err(error.into());
            }
        };
        *lock(&shared.last_heard) = Instant::now();
        shared.state.set(ConnectionState::Connected);
        tracing::info!(url, "connected");

        let (sink, stream) = ws.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::write_loop(
            sink,
            outbound_rx,
            Arc::clone(&shared),
            shutdown_rx.clone(),
        ));
        tokio::spawn(Self::read_loop(
            stream,
            Arc::clone(&shared),
            shutdown_rx.clone(),
        ));
        tokio::spawn(Self::heartbeat_loop(
            outbound.clone(),
            Arc::clone(&shared),
            config.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            shared,
            outbound,
            session: Mutex::new(None),
            config,
        })
    }

    /// The connection state watch.
    pub fn state(&self) -> &ConnectionStateWatch {
        &self.shared.state
    }

    /// The current session, once joined.
    pub fn session(&self) -> Option<Session> {
        lock(&self.session).clone()
    }

    /// Returns an ordered stream of payloads for inbound `event`s.
    ///
    /// Subscribe before [`join`](Self::join) to be sure not to miss the first
    /// push after the join reply.
    pub fn subscribe(&self, event: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.shared.subscriptions)
            .entry(event.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Joins `topic` and waits for the server's reply.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::JoinRejected`] if the server replies with `error`.
    /// - [`ChannelError::JoinTimeout`] if no reply arrives in time.
    /// - [`ChannelError::Closed`] if the connection drops first.
    pub async fn join(&self, topic: &str, params: Value) -> Result<Session, ChannelError> {
        let join_ref = self.shared.make_ref();
        let (tx, rx) = oneshot::channel();
        lock(&self.shared.pending).insert(join_ref.clone(), tx);

        tracing::debug!(topic, join_ref = %join_ref, "joining");
        self.send(&Frame::join(topic, &join_ref, params))?;

        let reply = match tokio::time::timeout(self.config.join_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(ChannelError::Closed),
            Err(_) => {
                lock(&self.shared.pending).remove(&join_ref);
                return Err(ChannelError::JoinTimeout(topic.to_string()));
            }
        };

        if !reply.is_ok() {
            tracing::warn!(topic, response = %reply.response, "join rejected");
            return Err(ChannelError::JoinRejected {
                topic: topic.to_string(),
                response: reply.response,
            });
        }

        let session = Session::from_reply(topic, join_ref, &reply.response);
        tracing::info!(
            topic,
            player_id = session.player_id.as_deref().unwrap_or("-"),
            "joined channel"
        );
        *lock(&self.session) = Some(session.clone());
        Ok(session)
    }

    /// Pushes `event` to the joined topic without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotJoined`] before a successful join and
    /// [`ChannelError::Closed`] once the connection is gone.
    pub fn push(&self, event: &str, payload: Value) -> Result<(), ChannelError> {
        let session = lock(&self.session).clone().ok_or(ChannelError::NotJoined)?;
        let msg_ref = self.shared.make_ref();
        tracing::debug!(event, msg_ref = %msg_ref, "push");
        self.send(&Frame::push(
            &session.topic,
            &session.join_ref,
            &msg_ref,
            event,
            payload,
        ))
    }

    /// Leaves the joined topic, if any, then closes the connection.
    pub fn leave(&self) {
        if let Some(session) = lock(&self.session).take() {
            let msg_ref = self.shared.make_ref();
            let frame = Frame::leave(&session.topic, &session.join_ref, &msg_ref);
            if let Err(error) = self.send(&frame) {
                tracing::debug!(%error, "leave not sent");
            }
            tracing::info!(topic = %session.topic, "left channel");
        }
        self.disconnect();
    }

    /// Closes the connection. Background tasks exit and state becomes
    /// [`ConnectionState::Disconnected`] immediately.
    pub fn disconnect(&self) {
        let _ = self.outbound.send(Outbound::Close);
        self.shared.close();
    }

    fn send(&self, frame: &Frame) -> Result<(), ChannelError> {
        if self.shared.state.current() == ConnectionState::Disconnected {
            return Err(ChannelError::Closed);
        }
        let text = encode_frame(frame)?;
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| ChannelError::Closed)
    }

    /// Owns the socket sink. Exits on [`Outbound::Close`], a write error, or
    /// shutdown.
    async fn write_loop(
        mut sink: SplitSink<WsStream, Message>,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        shared: Arc<Shared>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                msg = outbound.recv() => {
                    match msg {
                        Some(Outbound::Text(text)) => {
                            if let Err(error) = sink.send(Message::Text(text)).await {
                                tracing::warn!(%error, "websocket write failed");
                                shared.close();
                                break;
                            }
                        }
                        Some(Outbound::Close) | None => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    /// Decodes inbound frames and routes them until the socket closes or
    /// shutdown is signalled.
    async fn read_loop(
        mut stream: SplitStream<WsStream>,
        shared: Arc<Shared>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => match decode_frame(&text) {
                            Ok(frame) => shared.route(frame),
                            Err(error) => tracing::warn!(%error, "dropping undecodable frame"),
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("server closed the connection");
                            shared.close();
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            tracing::warn!(%error, "websocket read failed");
                            shared.close();
                            break;
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Sends a heartbeat every `heartbeat_interval`. If nothing has been
    /// heard from the server for `heartbeat_timeout`, the connection is
    /// declared lost.
    async fn heartbeat_loop(
        outbound: mpsc::UnboundedSender<Outbound>,
        shared: Arc<Shared>,
        config: ChannelConfig,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let period = config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let silent_for = lock(&shared.last_heard).elapsed();
                    if silent_for > config.heartbeat_timeout {
                        tracing::warn!(?silent_for, "heartbeat timeout");
                        shared.close();
                        break;
                    }
                    let frame = Frame::heartbeat(&shared.make_ref());
                    let Ok(text) = encode_frame(&frame) else {
                        continue;
                    };
                    if outbound.send(Outbound::Text(text)).is_err() {
                        break;
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
