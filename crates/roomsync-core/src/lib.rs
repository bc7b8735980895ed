//! Core types for roomsync.
//!
//! This crate provides the DDP wire frames spoken by the chat backend's
//! real-time endpoint, the normalized message record handed to consumers,
//! and the contracts the sync client depends on (credentials, message store).
//! It performs no I/O beyond reading a credential file.

mod credential;
mod frame;
mod message;
mod store;

pub use credential::{CredentialError, CredentialSource, FileCredential, ResumeToken, StaticCredential};
pub use frame::{ClientFrame, FrameError, MethodError, ServerFrame, StreamFields};
pub use message::{DdpDate, MessagePayload, NormalizedMessage, UserRef};
pub use store::{InMemoryMessageStore, MessageStore};

/// Collection (and subscription name) carrying per-room message events.
pub const MESSAGE_STREAM: &str = "stream-room-messages";

/// DDP protocol version requested in the `connect` handshake.
pub const DDP_VERSION: &str = "1";

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// Opening the transport.
    Connecting,
    /// Transport open; frames are delivered.
    Connected,
    /// Between sessions, possibly waiting to retry.
    Disconnected,
    /// Closed by the owner.
    Closed,
    /// The server rejected the resume credential. No retry.
    Unauthorized,
    /// The server does not speak our protocol version. No retry.
    Unsupported,
    /// Reconnect ceiling reached. Only a manual connect starts again.
    Exhausted,
}

impl ConnectionState {
    /// Whether the client will not reconnect on its own from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Unauthorized | Self::Unsupported | Self::Exhausted)
    }
}
