//! The realtime sync client.
//!
//! One [`SyncClient`] owns at most one live WebSocket. A spawned connection
//! task owns the socket, drains the outbound queue and processes inbound
//! frames in delivery order. Public methods are synchronous: they touch
//! client state under a short-lived lock and enqueue frames.

use crate::config::ClientConfig;
use crate::dispatch::{self, Event};
use crate::ids::{self, RequestIds};
use futures_util::{SinkExt, StreamExt};
use roomsync_core::{
    ClientFrame, ConnectionState, CredentialSource, MessageStore, MethodError, ResumeToken,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};

enum Outbound {
    Frame(ClientFrame),
    Close,
}

/// Why a session ended.
#[derive(Debug, thiserror::Error)]
enum CloseReason {
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("server closed the connection")]
    ServerClosed,
    #[error("closed by owner")]
    Requested,
    #[error("login rejected: {0}")]
    AuthRejected(MethodError),
    #[error("server refused protocol version, proposes {0}")]
    VersionRejected(String),
}

/// What the connection task does after handling one inbound frame.
#[derive(Debug)]
enum Step {
    Continue,
    Reply(ClientFrame),
    Close(CloseReason),
}

struct Shared {
    config: ClientConfig,
    credentials: Arc<dyn CredentialSource>,
    store: Arc<dyn MessageStore>,
    inner: Mutex<Inner>,
    state: watch::Sender<ConnectionState>,
}

#[derive(Default)]
struct Inner {
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    request_ids: RequestIds,
    /// room id -> request id of its `sub` frame
    subscriptions: HashMap<String, String>,
    attempts: u32,
    /// Bumped by every manual connect/disconnect; a connection task whose
    /// generation is stale must not touch state.
    generation: u64,
    driver: Option<JoinHandle<()>>,
    /// Tasks told to close, still flushing their queue. Never aborted.
    closing: Vec<JoinHandle<()>>,
}

impl Inner {
    fn send(&mut self, frame: ClientFrame) -> bool {
        let Some(tx) = &self.outbound else {
            tracing::error!(id = ?frame.id(), "not connected, dropping frame");
            return false;
        };
        if tx.send(Outbound::Frame(frame)).is_err() {
            tracing::error!("connection task gone, dropping frame");
            self.outbound = None;
            return false;
        }
        true
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, generation: u64, state: ConnectionState) -> bool {
        let inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        self.state.send_replace(state);
        true
    }
}

/// Client for the backend's real-time message stream.
///
/// Construct it once in the application's composition root, call
/// [`connect`](Self::connect), and dispose of it with
/// [`shutdown`](Self::shutdown). Cloning yields another handle to the same
/// connection. All methods must be called from within a tokio runtime.
#[derive(Clone)]
pub struct SyncClient {
    shared: Arc<Shared>,
}

impl SyncClient {
    /// Create an idle client. Nothing is opened until [`connect`](Self::connect).
    pub fn new(
        config: ClientConfig,
        credentials: Arc<dyn CredentialSource>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            shared: Arc::new(Shared {
                config,
                credentials,
                store,
                inner: Mutex::new(Inner::default()),
                state,
            }),
        }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Open the transport, replacing any existing connection.
    ///
    /// Resets the reconnect counter, so this also restarts a client that
    /// gave up.
    pub fn connect(&self) {
        let mut inner = self.shared.lock();
        if let Some(old) = inner.driver.take() {
            old.abort();
        }
        inner.outbound = None;
        inner.attempts = 0;
        inner.generation += 1;
        let generation = inner.generation;
        inner.driver = Some(tokio::spawn(drive(self.shared.clone(), generation)));
    }

    /// Close the transport.
    ///
    /// Frames queued before this call are written first, even if
    /// [`connect`](Self::connect) is called again right away. The
    /// subscription map is left untouched; the next session clears it.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        inner.generation += 1;
        match inner.outbound.take() {
            Some(tx) => {
                let _ = tx.send(Outbound::Close);
                inner.closing.retain(|task| !task.is_finished());
                if let Some(driver) = inner.driver.take() {
                    inner.closing.push(driver);
                }
            }
            None => {
                if let Some(driver) = inner.driver.take() {
                    driver.abort();
                }
            }
        }
        self.shared.state.send_replace(ConnectionState::Closed);
        tracing::info!("disconnected");
    }

    /// Disconnect and wait for every connection task to finish.
    pub async fn shutdown(&self) {
        self.disconnect();
        let tasks: Vec<_> = {
            let mut guard = self.shared.lock();
            let inner = &mut *guard;
            inner.closing.drain(..).chain(inner.driver.take()).collect()
        };
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Subscribe to a room's message stream.
    ///
    /// Returns the subscription's request id, or `None` while no transport
    /// is open. A room that is already subscribed keeps its existing
    /// subscription and nothing is sent.
    pub fn subscribe_to_room(&self, room_id: &str) -> Option<String> {
        let mut inner = self.shared.lock();
        if inner.outbound.is_none() {
            tracing::error!(room = room_id, "not connected, cannot subscribe");
            return None;
        }
        if let Some(existing) = inner.subscriptions.get(room_id) {
            tracing::debug!(room = room_id, id = %existing, "already subscribed");
            return Some(existing.clone());
        }
        let id = inner.request_ids.next();
        if !inner.send(ClientFrame::subscribe(room_id, id.clone())) {
            return None;
        }
        inner.subscriptions.insert(room_id.to_string(), id.clone());
        tracing::info!(room = room_id, id = %id, "subscribed");
        Some(id)
    }

    /// Cancel a room subscription. No-op for rooms not subscribed.
    pub fn unsubscribe_from_room(&self, room_id: &str) {
        let mut inner = self.shared.lock();
        let Some(subscription) = inner.subscriptions.remove(room_id) else {
            return;
        };
        let id = inner.request_ids.next();
        inner.send(ClientFrame::unsubscribe(&subscription, id));
        tracing::info!(room = room_id, id = %subscription, "unsubscribed");
    }

    /// Send a message to a room without waiting for acknowledgment.
    ///
    /// Returns the client-generated message id immediately. Delivery is not
    /// confirmed; the REST API remains the durable write path.
    pub fn send_message(&self, room_id: &str, text: &str, token: Option<&str>) -> String {
        let message_id = ids::message_id();
        let mut inner = self.shared.lock();
        let id = inner.request_ids.next();
        inner.send(ClientFrame::send_message(
            &message_id,
            room_id,
            text,
            token.unwrap_or_default(),
            id,
        ));
        message_id
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Observe state changes, e.g. to re-subscribe after a reconnect.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Consecutive failed reconnects since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().attempts
    }

    /// Request id of a room's live subscription.
    pub fn subscription_id(&self, room_id: &str) -> Option<String> {
        self.shared.lock().subscriptions.get(room_id).cloned()
    }

    /// Rooms in the subscription map, sorted.
    pub fn subscribed_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.shared.lock().subscriptions.keys().cloned().collect();
        rooms.sort();
        rooms
    }
}

/// Connection task: run sessions until told to stop or out of retries.
async fn drive(shared: Arc<Shared>, generation: u64) {
    let policy = shared.config.reconnect;
    loop {
        if !shared.set_state(generation, ConnectionState::Connecting) {
            return;
        }
        let reason = session(&shared, generation).await;

        let attempt = {
            let mut inner = shared.lock();
            if inner.generation != generation {
                return;
            }
            inner.outbound = None;
            match reason {
                CloseReason::Requested => return,
                CloseReason::AuthRejected(error) => {
                    tracing::error!(%error, "resume token rejected, not reconnecting");
                    shared.state.send_replace(ConnectionState::Unauthorized);
                    return;
                }
                CloseReason::VersionRejected(version) => {
                    tracing::error!(%version, "protocol version refused, not reconnecting");
                    shared.state.send_replace(ConnectionState::Unsupported);
                    return;
                }
                reason => tracing::warn!(%reason, "connection lost"),
            }
            match policy.next_attempt(inner.attempts) {
                Some(attempt) => {
                    inner.attempts = attempt;
                    shared.state.send_replace(ConnectionState::Disconnected);
                    attempt
                }
                None => {
                    tracing::error!(max = policy.max_attempts, "max reconnection attempts reached");
                    shared.state.send_replace(ConnectionState::Exhausted);
                    return;
                }
            }
        };

        let delay = policy.delay_for(attempt);
        tracing::info!(
            attempt,
            max = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnecting"
        );
        tokio::time::sleep(delay).await;
    }
}

/// One transport lifetime: open, handshake, pump frames until closed.
async fn session(shared: &Shared, generation: u64) -> CloseReason {
    let url = shared.config.url.as_str();
    let (ws, _) = match tokio_tungstenite::connect_async(url).await {
        Ok(ok) => ok,
        Err(e) => return CloseReason::Transport(e),
    };
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let token = read_token(shared).await;

    // Install the new queue before anyone can observe `Connected`.
    let login_id = {
        let mut inner = shared.lock();
        if inner.generation != generation {
            return CloseReason::Requested;
        }
        inner.attempts = 0;
        inner.request_ids = RequestIds::default();
        if !inner.subscriptions.is_empty() {
            let dropped: Vec<String> = inner.subscriptions.drain().map(|(room, _)| room).collect();
            tracing::info!(rooms = ?dropped, "new session, previous subscriptions dropped");
        }

        let _ = tx.send(Outbound::Frame(ClientFrame::connect()));
        let login_id = token.map(|token| {
            let id = inner.request_ids.next();
            let _ = tx.send(Outbound::Frame(ClientFrame::login(&token, id.clone())));
            tracing::debug!(%token, "resuming session");
            id
        });
        inner.outbound = Some(tx);
        shared.state.send_replace(ConnectionState::Connected);
        login_id
    };
    if login_id.is_none() {
        tracing::warn!("no resume token stored, session is unauthenticated");
    }
    tracing::info!(url, "connected");

    loop {
        tokio::select! {
            out = rx.recv() => match out {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = write(&mut sink, &frame).await {
                        return e;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    return CloseReason::Requested;
                }
            },

            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => return CloseReason::Transport(e),
                    None => return CloseReason::ServerClosed,
                };
                match msg {
                    Message::Text(text) => match on_text(shared, generation, text.as_str(), login_id.as_deref()) {
                        Step::Continue => {}
                        Step::Reply(frame) => {
                            if let Err(e) = write(&mut sink, &frame).await {
                                return e;
                            }
                        }
                        Step::Close(reason) => {
                            let _ = sink.close().await;
                            return reason;
                        }
                    },
                    Message::Close(frame) => {
                        tracing::debug!(?frame, "close frame from server");
                        return CloseReason::ServerClosed;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Read the resume token off the runtime; sources may touch the filesystem.
async fn read_token(shared: &Shared) -> Option<ResumeToken> {
    let credentials = shared.credentials.clone();
    match tokio::task::spawn_blocking(move || credentials.resume_token()).await {
        Ok(Ok(token)) => token,
        Ok(Err(error)) => {
            tracing::warn!(%error, "failed to read resume token");
            None
        }
        Err(error) => {
            tracing::warn!(%error, "resume token reader failed");
            None
        }
    }
}

async fn write<S>(sink: &mut S, frame: &ClientFrame) -> Result<(), CloseReason>
where
    S: futures_util::Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = match frame.to_text() {
        Ok(text) => text,
        Err(error) => {
            tracing::error!(%error, "failed to encode frame");
            return Ok(());
        }
    };
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}

fn on_text(shared: &Shared, generation: u64, text: &str, login_id: Option<&str>) -> Step {
    let event = match dispatch::dispatch(text) {
        Ok(event) => event,
        Err(error) => {
            tracing::warn!(%error, "dropping inbound frame");
            return Step::Continue;
        }
    };

    match event {
        Event::Handshake { session } => tracing::debug!(%session, "handshake accepted"),
        Event::VersionRejected { version } => return Step::Close(CloseReason::VersionRejected(version)),
        Event::Ping { id } => return Step::Reply(ClientFrame::pong(id)),
        Event::MethodResult { id, error } => match error {
            Some(error) if login_id == Some(id.as_str()) => {
                return Step::Close(CloseReason::AuthRejected(error));
            }
            Some(error) => tracing::warn!(%id, %error, "method failed"),
            None if login_id == Some(id.as_str()) => tracing::info!("authenticated"),
            None => tracing::debug!(%id, "method acknowledged"),
        },
        Event::Message(message) => {
            tracing::debug!(room = %message.room_id, id = %message.id, "message");
            let room_id = message.room_id.clone();
            shared.store.append(&room_id, message);
        }
        Event::Removed { collection, id } => {
            tracing::info!(%collection, id = ?id, "removed");
        }
        Event::SubscriptionEnded { id, error } => {
            let mut inner = shared.lock();
            if inner.generation == generation {
                inner.subscriptions.retain(|_, sub| *sub != id);
            }
            match error {
                Some(error) => tracing::warn!(%id, %error, "subscription refused"),
                None => tracing::info!(%id, "subscription ended"),
            }
        }
        Event::Ignored => {}
    }
    Step::Continue
}
