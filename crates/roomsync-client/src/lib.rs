//! Realtime sync client for DDP chat backends.
//!
//! Keeps one authenticated WebSocket to the backend's real-time endpoint,
//! multiplexes per-room message subscriptions over it and hands normalized
//! messages to a [`MessageStore`](roomsync_core::MessageStore). Lost
//! connections are retried with linear backoff up to a ceiling.

mod client;
mod config;
mod dispatch;
mod ids;

pub use client::SyncClient;
pub use config::{ClientConfig, DEFAULT_URL, ReconnectPolicy};
pub use ids::{MESSAGE_ID_LEN, message_id};
pub use roomsync_core::ConnectionState;
