//! DDP wire frames.
//!
//! Every frame is a JSON object tagged by its `msg` field. The backend only
//! understands the subset below; outbound frames keep the exact field layout
//! the server expects (`sub`/`unsub` name their target in `method`).

use crate::{DDP_VERSION, MESSAGE_STREAM, ResumeToken};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

/// Frames sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Protocol handshake, sent once per transport.
    Connect { version: String, support: Vec<String> },
    /// Remote method invocation.
    Method {
        method: String,
        params: Vec<Value>,
        id: String,
    },
    /// Subscribe to a named stream.
    Sub {
        method: String,
        params: Vec<Value>,
        id: String,
    },
    /// Cancel a subscription; `method` carries the subscription's request id.
    Unsub {
        method: String,
        params: Vec<Value>,
        id: String,
    },
    /// Keepalive reply.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

impl ClientFrame {
    /// Handshake proposing DDP version 1.
    pub fn connect() -> Self {
        Self::Connect {
            version: DDP_VERSION.to_string(),
            support: vec![DDP_VERSION.to_string()],
        }
    }

    /// Resume an existing session with a previously issued token.
    pub fn login(token: &ResumeToken, id: impl Into<String>) -> Self {
        Self::Method {
            method: "login".to_string(),
            params: vec![json!({ "resume": token.expose() })],
            id: id.into(),
        }
    }

    /// Subscribe to a room's message stream, without replaying history.
    pub fn subscribe(room_id: &str, id: impl Into<String>) -> Self {
        Self::Sub {
            method: MESSAGE_STREAM.to_string(),
            params: vec![json!(room_id), json!(false)],
            id: id.into(),
        }
    }

    /// Cancel the subscription opened by request `subscription_id`.
    pub fn unsubscribe(subscription_id: &str, id: impl Into<String>) -> Self {
        Self::Unsub {
            method: subscription_id.to_string(),
            params: Vec::new(),
            id: id.into(),
        }
    }

    /// Create a message with a client-generated id.
    pub fn send_message(
        message_id: &str,
        room_id: &str,
        text: &str,
        token: &str,
        id: impl Into<String>,
    ) -> Self {
        Self::Method {
            method: "sendMessageLivechat".to_string(),
            params: vec![json!({
                "_id": message_id,
                "rid": room_id,
                "msg": text,
                "token": token,
            })],
            id: id.into(),
        }
    }

    /// Answer a server `ping`, echoing its id.
    pub fn pong(id: Option<String>) -> Self {
        Self::Pong { id }
    }

    /// The request id, for frames that carry one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Method { id, .. } | Self::Sub { id, .. } | Self::Unsub { id, .. } => Some(id),
            Self::Pong { id } => id.as_deref(),
            Self::Connect { .. } => None,
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake accepted.
    Connected { session: String },
    /// Handshake refused; the server proposes another version.
    Failed { version: String },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Outcome of a method invocation.
    Result {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<MethodError>,
    },
    Changed {
        collection: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Value>,
    },
    Added {
        collection: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Value>,
    },
    Removed {
        collection: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// A subscription ended or was refused.
    Nosub {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<MethodError>,
    },
    /// Any tag this client does not act on.
    #[serde(other)]
    Other,
}

impl ServerFrame {
    /// Decode one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(FrameError::Malformed)
    }
}

/// Error object attached to a `result` or `nosub` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodError {
    /// Numeric or string error code.
    #[serde(default)]
    pub error: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, rename = "errorType", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl fmt::Display for MethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.reason, &self.message) {
            (Some(reason), _) => write!(f, "{} ({})", reason, self.error),
            (None, Some(message)) => f.write_str(message),
            (None, None) => write!(f, "error {}", self.error),
        }
    }
}

/// The `fields` object of a stream event: `{eventName, args: [payload, ...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFields {
    #[serde(default, rename = "eventName", skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl StreamFields {
    /// Validate a raw `fields` value and return the first positional argument.
    pub fn first_arg(fields: Option<&Value>) -> Result<Value, FrameError> {
        let fields = fields.ok_or(FrameError::MissingPayload)?;
        let mut parsed = Self::deserialize(fields).map_err(FrameError::InvalidPayload)?;
        if parsed.args.is_empty() {
            return Err(FrameError::MissingPayload);
        }
        Ok(parsed.args.swap_remove(0))
    }
}

/// Error decoding an inbound frame or its payload.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("stream event carries no payload")]
    MissingPayload,
    #[error("payload does not match the message shape: {0}")]
    InvalidPayload(#[source] serde_json::Error),
    #[error("timestamp {0} is out of range")]
    TimestampOutOfRange(i64),
}
