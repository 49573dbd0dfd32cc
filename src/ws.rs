//! WebSocket session — one socket, one receive loop, one liveness probe.
//!
//! DESIGN
//! ======
//! `connect()` spawns a single driver task per connection. The driver does
//! the handshake, parks the write half in a shared slot (so `send` and the
//! probe can use it), then runs two futures side by side:
//!
//! - receive loop: publishes text/binary frames, routes pongs to the probe,
//!   and ends the connection on the first read failure or peer close.
//! - liveness probe: pings immediately, then every `ping_interval`. A
//!   matching pong within `pong_timeout` means `Connected`, anything else
//!   `Disconnected`. Once the state is not `Connected` at a tick, the probe
//!   stops for good; the receive loop keeps running.
//!
//! The probe is the only path into `Connected`. A finished handshake alone
//! does not count.
//!
//! ORDERING
//! ========
//! State changes and message publication both happen under `Shared::inner`,
//! so every subscriber sees one total order per session. Each connection
//! carries a generation number; a driver whose generation is no longer
//! current cannot publish anything.
//!
//! LIFECYCLE
//! =========
//! 1. `connect` → fresh message channel, driver spawned
//! 2. handshake → first probe → `Connected` on pong
//! 3. `disconnect` / drop → driver aborted, stream finished, close frame sent
//! 4. read failure → state `Disconnected`, stream ends with the error
//!
//! There is no reconnect. Callers observe `Disconnected` and call `connect`
//! again if they want a new socket.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::WsConfig;
use crate::error::WsError;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Writer = SplitSink<Socket, Message>;
type Reader = SplitStream<Socket>;
type WriterSlot = Arc<tokio::sync::Mutex<Option<Writer>>>;

// =============================================================================
// PUBLIC TYPES
// =============================================================================

/// Liveness of the socket as last measured by the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    #[default]
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        })
    }
}

/// An inbound data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone)]
enum StreamItem {
    Message(WsMessage),
    Finished,
    Failed(Arc<WsError>),
}

/// One subscriber's view of a connection's inbound messages.
///
/// Yields messages in arrival order. Ends with `None` after a clean
/// `disconnect`, or with one `Some(Err(_))` and then `None` when the
/// connection fails.
pub struct MessageStream {
    rx: Option<broadcast::Receiver<StreamItem>>,
}

impl MessageStream {
    fn finished() -> Self {
        Self { rx: None }
    }

    /// Wait for the next message.
    pub async fn next(&mut self) -> Option<Result<WsMessage, Arc<WsError>>> {
        loop {
            let rx = self.rx.as_mut()?;
            let item = match rx.recv().await {
                Ok(item) => item,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "ws: subscriber lagged; messages dropped");
                    continue;
                }
                Err(RecvError::Closed) => StreamItem::Finished,
            };
            match item {
                StreamItem::Message(message) => return Some(Ok(message)),
                StreamItem::Finished => {
                    self.rx = None;
                    return None;
                }
                StreamItem::Failed(err) => {
                    self.rx = None;
                    return Some(Err(err));
                }
            }
        }
    }
}

// =============================================================================
// SHARED STATE
// =============================================================================

struct Link {
    generation: u64,
    events: broadcast::Sender<StreamItem>,
    writer: WriterSlot,
    driver: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    generation: u64,
    link: Option<Link>,
}

impl Inner {
    fn current(&self, generation: u64) -> Option<&Link> {
        self.link
            .as_ref()
            .filter(|link| link.generation == generation)
    }

    fn take_current(&mut self, generation: u64) -> Option<Link> {
        if self.current(generation).is_some() { self.link.take() } else { None }
    }
}

struct Shared {
    id: Uuid,
    state: watch::Sender<ConnectionState>,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Publish `state` if it differs from the current value. Caller holds the lock.
    fn update_state(&self, state: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            info!(session = %self.id, %state, "ws: state changed");
        }
    }

    /// Returns `false` once `generation` has been superseded or torn down.
    fn set_state(&self, generation: u64, state: ConnectionState) -> bool {
        let inner = self.lock();
        if inner.current(generation).is_none() {
            return false;
        }
        self.update_state(state);
        true
    }

    fn publish(&self, generation: u64, message: WsMessage) {
        let inner = self.lock();
        if let Some(link) = inner.current(generation) {
            // No subscribers is fine; the frame is simply dropped.
            let _ = link.events.send(StreamItem::Message(message));
        }
    }

    fn fail(&self, generation: u64, err: WsError) {
        let mut inner = self.lock();
        let Some(link) = inner.take_current(generation) else {
            return;
        };
        self.update_state(ConnectionState::Disconnected);
        let _ = link.events.send(StreamItem::Failed(Arc::new(err)));
    }

    fn writer(&self) -> Option<WriterSlot> {
        self.lock()
            .link
            .as_ref()
            .map(|link| Arc::clone(&link.writer))
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// A reusable WebSocket session bound to one address.
pub struct WsSession {
    url: Url,
    config: WsConfig,
    shared: Arc<Shared>,
}

impl WsSession {
    #[must_use]
    pub fn new(url: Url, config: WsConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Shared { id: Uuid::new_v4(), state, inner: Mutex::new(Inner::default()) };
        Self { url, config, shared: Arc::new(shared) }
    }

    /// Build a session from a URL string.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::InvalidUrl`] if `url` does not parse.
    pub fn parse(url: &str, config: WsConfig) -> Result<Self, WsError> {
        let url = Url::parse(url).map_err(|e| WsError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self::new(url, config))
    }

    /// Identifier used in this session's log lines.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Observe state changes. Only actual changes are published.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Subscribe to the current connection's messages.
    ///
    /// Subscribe after `connect`; each connection has its own stream. With no
    /// live connection the returned stream is already finished.
    #[must_use]
    pub fn messages(&self) -> MessageStream {
        match &self.shared.lock().link {
            Some(link) => MessageStream { rx: Some(link.events.subscribe()) },
            None => MessageStream::finished(),
        }
    }

    /// Open the socket in the background and start the receive loop and
    /// liveness probe. Returns immediately.
    ///
    /// A connection that is still live is torn down first.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn connect(&self) {
        let mut inner = self.shared.lock();
        if let Some(previous) = inner.link.take() {
            warn!(session = %self.shared.id, "ws: connect while connected; dropping previous socket");
            previous.driver.abort();
            self.shared.update_state(ConnectionState::Disconnected);
            let _ = previous.events.send(StreamItem::Finished);
        }

        inner.generation += 1;
        let generation = inner.generation;
        let (events, _) = broadcast::channel(self.config.channel_capacity.max(1));
        let writer = WriterSlot::default();
        let driver = tokio::spawn(drive(
            Arc::clone(&self.shared),
            generation,
            Arc::clone(&writer),
            self.url.clone(),
            self.config,
        ));
        inner.link = Some(Link { generation, events, writer, driver });

        info!(session = %self.shared.id, url = %self.url, generation, "ws: connecting");
    }

    /// Tear the connection down: stop the receive loop and probe, mark the
    /// session `Disconnected`, finish the message stream without error, and
    /// send a close frame.
    pub async fn disconnect(&self) {
        let link = {
            let mut inner = self.shared.lock();
            let link = inner.link.take();
            self.shared.update_state(ConnectionState::Disconnected);
            if let Some(link) = &link {
                let _ = link.events.send(StreamItem::Finished);
            }
            link
        };
        let Some(link) = link else {
            return;
        };

        link.driver.abort();
        let writer = link.writer.lock().await.take();
        if let Some(mut writer) = writer {
            match tokio::time::timeout(CLOSE_TIMEOUT, writer.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(session = %self.shared.id, error = %e, "ws: close frame failed"),
                Err(_) => debug!(session = %self.shared.id, "ws: close frame timed out"),
            }
        }
        info!(session = %self.shared.id, "ws: disconnected");
    }

    /// Send one frame. `data` wins over `text` when both are given.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::EmptyMessage`] when neither is given (nothing is
    /// written), [`WsError::NotConnected`] without an open socket, or
    /// [`WsError::Send`] when the write fails.
    pub async fn send(&self, data: Option<Vec<u8>>, text: Option<String>) -> Result<(), WsError> {
        let message = match (data, text) {
            (Some(bytes), _) => Message::Binary(bytes.into()),
            (None, Some(text)) => Message::Text(text.into()),
            (None, None) => return Err(WsError::EmptyMessage),
        };
        self.write(message).await
    }

    /// Send a text frame.
    ///
    /// # Errors
    ///
    /// See [`WsSession::send`].
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), WsError> {
        self.send(None, Some(text.into())).await
    }

    /// Send a binary frame.
    ///
    /// # Errors
    ///
    /// See [`WsSession::send`].
    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<(), WsError> {
        self.send(Some(data.into()), None).await
    }

    /// JSON-encode `value` and send it as a binary frame.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Encode`] if `value` cannot be encoded (nothing is
    /// written), otherwise see [`WsSession::send`].
    pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), WsError> {
        let bytes = serde_json::to_vec(value)?;
        self.send(Some(bytes), None).await
    }

    async fn write(&self, message: Message) -> Result<(), WsError> {
        let Some(slot) = self.shared.writer() else {
            return Err(WsError::NotConnected);
        };
        let mut guard = slot.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(WsError::NotConnected);
        };
        writer.send(message).await.map_err(|e| {
            warn!(session = %self.shared.id, error = %e, "ws: send failed");
            WsError::Send(Box::new(e))
        })
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        if let Some(link) = inner.link.take() {
            link.driver.abort();
            let _ = link.events.send(StreamItem::Finished);
        }
    }
}

// =============================================================================
// DRIVER
// =============================================================================

async fn drive(shared: Arc<Shared>, generation: u64, writer: WriterSlot, url: Url, config: WsConfig) {
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            warn!(session = %shared.id, %url, error = %e, "ws: connect failed");
            shared.fail(generation, WsError::Connect(Box::new(e)));
            return;
        }
    };
    debug!(session = %shared.id, "ws: handshake complete");

    let (sink, reader) = socket.split();
    *writer.lock().await = Some(sink);

    let (pong_tx, pong_rx) = mpsc::unbounded_channel();
    let receive = receive_loop(&shared, generation, reader, pong_tx);
    let liveness = liveness_loop(&shared, generation, &writer, pong_rx, config);
    tokio::pin!(receive);
    tokio::pin!(liveness);

    tokio::select! {
        () = &mut receive => {}
        () = &mut liveness => receive.await,
    }

    writer.lock().await.take();
}

async fn receive_loop(
    shared: &Shared,
    generation: u64,
    mut reader: Reader,
    pongs: mpsc::UnboundedSender<Vec<u8>>,
) {
    let failure = loop {
        match reader.next().await {
            Some(Ok(Message::Text(text))) => shared.publish(generation, WsMessage::Text(text.as_str().to_owned())),
            Some(Ok(Message::Binary(bytes))) => shared.publish(generation, WsMessage::Binary(bytes.to_vec())),
            Some(Ok(Message::Pong(payload))) => {
                let _ = pongs.send(payload.to_vec());
            }
            Some(Ok(Message::Ping(_) | Message::Frame(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                debug!(session = %shared.id, ?frame, "ws: peer sent close");
                break WsError::Closed;
            }
            Some(Err(e)) => break WsError::Receive(Box::new(e)),
            None => break WsError::Closed,
        }
    };

    warn!(session = %shared.id, error = %failure, "ws: receive loop ended");
    shared.fail(generation, failure);
}

async fn liveness_loop(
    shared: &Shared,
    generation: u64,
    writer: &WriterSlot,
    mut pongs: mpsc::UnboundedReceiver<Vec<u8>>,
    config: WsConfig,
) {
    let mut ticker = tokio::time::interval(config.ping_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut nonce: u64 = 0;
    loop {
        nonce = nonce.wrapping_add(1);
        let alive = probe(writer, &mut pongs, nonce, config.pong_timeout()).await;
        let state = if alive { ConnectionState::Connected } else { ConnectionState::Disconnected };
        if !shared.set_state(generation, state) {
            return;
        }

        ticker.tick().await;
        if shared.state() != ConnectionState::Connected {
            shared.set_state(generation, ConnectionState::Disconnected);
            debug!(session = %shared.id, "ws: liveness probe stopped");
            return;
        }
    }
}

/// Ping with `nonce` as payload and wait for the matching pong.
async fn probe(
    writer: &WriterSlot,
    pongs: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    nonce: u64,
    wait: Duration,
) -> bool {
    // Late pongs from earlier probes must not satisfy this one.
    while pongs.try_recv().is_ok() {}

    let payload = nonce.to_be_bytes().to_vec();
    {
        let mut guard = writer.lock().await;
        let Some(sink) = guard.as_mut() else {
            return false;
        };
        if let Err(e) = sink.send(Message::Ping(payload.clone().into())).await {
            debug!(error = %e, "ws: ping failed");
            return false;
        }
    }

    let matched = async {
        while let Some(pong) = pongs.recv().await {
            if pong == payload {
                return true;
            }
        }
        false
    };
    tokio::time::timeout(wait, matched).await.unwrap_or(false)
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
