//! Mock DDP backend for integration tests.
//!
//! Accepts WebSocket connections on a loopback port, answers the handshake
//! and login, records every frame the client sends, and lets a test push raw
//! frames to (or drop) the current connection.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use roomsync_client::ConnectionState;
use roomsync_core::ClientFrame;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// What the backend observed.
#[derive(Debug)]
pub enum Seen {
    Frame(ClientFrame),
    /// The client closed its side.
    Closed,
}

enum Push {
    Text(String),
    Drop,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Answer every login with a 403 error.
    pub reject_login: bool,
}

struct BackendState {
    options: Options,
    seen: mpsc::UnboundedSender<Seen>,
    current: Mutex<Option<mpsc::UnboundedSender<Push>>>,
    connections: AtomicUsize,
}

pub struct MockBackend {
    pub url: String,
    state: Arc<BackendState>,
    seen: mpsc::UnboundedReceiver<Seen>,
}

impl MockBackend {
    pub async fn start(options: Options) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen) = mpsc::unbounded_channel();
        let state = Arc::new(BackendState {
            options,
            seen: seen_tx,
            current: Mutex::new(None),
            connections: AtomicUsize::new(0),
        });

        let accept_state = state.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, client_addr)) = listener.accept().await else {
                    return;
                };
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                let state = accept_state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, client_addr, state).await {
                        tracing::debug!("mock connection from {} ended: {}", client_addr, e);
                    }
                });
            }
        });

        Self {
            url: format!("ws://{addr}/websocket"),
            state,
            seen,
        }
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Send a raw text frame on the current connection.
    pub fn push(&self, text: impl Into<String>) {
        let current = self.state.current.lock().unwrap();
        current
            .as_ref()
            .expect("no live connection")
            .send(Push::Text(text.into()))
            .unwrap();
    }

    /// Drop the current connection from the server side.
    pub fn drop_connection(&self) {
        if let Some(tx) = self.state.current.lock().unwrap().take() {
            let _ = tx.send(Push::Drop);
        }
    }

    pub async fn next_seen(&mut self) -> Seen {
        tokio::time::timeout(TIMEOUT, self.seen.recv())
            .await
            .expect("timed out waiting for the client")
            .expect("backend stopped")
    }

    /// Next frame from the client, skipping close notices.
    pub async fn next_frame(&mut self) -> ClientFrame {
        loop {
            if let Seen::Frame(frame) = self.next_seen().await {
                return frame;
            }
        }
    }

    /// Consume the `connect` handshake and, if expected, the login.
    pub async fn expect_handshake(&mut self, with_login: bool) -> Option<ClientFrame> {
        assert!(matches!(self.next_frame().await, ClientFrame::Connect { .. }));
        if !with_login {
            return None;
        }
        let login = self.next_frame().await;
        assert!(matches!(&login, ClientFrame::Method { method, .. } if method == "login"));
        Some(login)
    }

    /// Wait until the client closes its side, skipping frames.
    pub async fn expect_closed(&mut self) {
        loop {
            if let Seen::Closed = self.next_seen().await {
                return;
            }
        }
    }

    /// Nothing arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(seen)) = tokio::time::timeout(window, self.seen.recv()).await {
            panic!("unexpected {seen:?}");
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<BackendState>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();
    let (push_tx, mut push_rx) = mpsc::unbounded_channel();
    *state.current.lock().unwrap() = Some(push_tx);

    tracing::debug!("mock backend: connection from {}", addr);

    loop {
        tokio::select! {
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    _ => {
                        let _ = state.seen.send(Seen::Closed);
                        break;
                    }
                };
                let text = match msg {
                    Message::Text(text) => text,
                    Message::Close(_) => {
                        let _ = state.seen.send(Seen::Closed);
                        break;
                    }
                    _ => continue,
                };
                let frame: ClientFrame = serde_json::from_str(text.as_str()).unwrap();
                if let Some(reply) = reply_to(&frame, state.options) {
                    sink.send(Message::Text(reply.into())).await?;
                }
                let _ = state.seen.send(Seen::Frame(frame));
            }

            push = push_rx.recv() => match push {
                Some(Push::Text(text)) => sink.send(Message::Text(text.into())).await?,
                Some(Push::Drop) | None => break,
            }
        }
    }
    Ok(())
}

fn reply_to(frame: &ClientFrame, options: Options) -> Option<String> {
    let reply = match frame {
        ClientFrame::Connect { .. } => json!({"msg": "connected", "session": "mock-session"}),
        ClientFrame::Method { method, id, .. } if method == "login" => {
            if options.reject_login {
                json!({
                    "msg": "result",
                    "id": id,
                    "error": {
                        "error": 403,
                        "reason": "You've been logged out by the server. Please log in again.",
                        "errorType": "Meteor.Error",
                    },
                })
            } else {
                json!({"msg": "result", "id": id, "result": {"id": "u1", "token": "tok", "type": "resume"}})
            }
        }
        _ => return None,
    };
    Some(reply.to_string())
}

/// Wait until the client's state satisfies `pred`.
pub async fn wait_for_state(
    rx: &mut watch::Receiver<ConnectionState>,
    pred: impl FnMut(&ConnectionState) -> bool,
) -> ConnectionState {
    *tokio::time::timeout(TIMEOUT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("client dropped")
}

/// Poll `check` until it holds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !check() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A listener that accepts TCP connections and drops them before the
/// WebSocket handshake, recording when each arrived.
pub async fn refusing_listener() -> (String, Arc<Mutex<Vec<Instant>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    let recorded = arrivals.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            recorded.lock().unwrap().push(Instant::now());
            drop(stream);
        }
    });
    (format!("ws://{addr}/websocket"), arrivals)
}
