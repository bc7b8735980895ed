//! Normalized chat messages.

use crate::FrameError;
use crate::frame::StreamFields;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire timestamp: `{"$date": <epoch millis>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdpDate {
    #[serde(rename = "$date")]
    pub millis: i64,
}

impl DdpDate {
    /// RFC 3339 in UTC with millisecond precision, e.g. `2023-11-14T22:13:20.000Z`.
    pub fn to_iso8601(self) -> Result<String, FrameError> {
        DateTime::<Utc>::from_timestamp_millis(self.millis)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            .ok_or(FrameError::TimestampOutOfRange(self.millis))
    }
}

/// Sender reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Message payload as it arrives in `fields.args[0]` of a stream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(rename = "_id")]
    pub id: String,
    pub rid: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub alias: Option<String>,
    pub ts: DdpDate,
    pub u: UserRef,
    #[serde(rename = "_updatedAt")]
    pub updated_at: DdpDate,
    #[serde(default)]
    pub reactions: Option<Value>,
    #[serde(default)]
    pub mentions: Option<Vec<Value>>,
    #[serde(default)]
    pub channels: Option<Vec<Value>>,
    #[serde(default)]
    pub starred: Option<Value>,
    #[serde(default)]
    pub t: Option<String>,
    #[serde(default)]
    pub groupable: Option<bool>,
    #[serde(default)]
    pub tmid: Option<String>,
}

/// A chat message as handed to the message store.
///
/// Field names follow the backend's REST message shape, so records coming
/// from the real-time stream and from REST history serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "rid")]
    pub room_id: String,
    #[serde(rename = "msg")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(rename = "u")]
    pub sender: UserRef,
    /// Message time, ISO-8601.
    pub ts: String,
    /// Last edit time, ISO-8601.
    #[serde(rename = "_updatedAt")]
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentions: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starred: Option<Value>,
    /// System message type; absent for ordinary messages.
    #[serde(default, rename = "t", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groupable: Option<bool>,
    /// Parent message id when this is a thread reply.
    #[serde(default, rename = "tmid", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl NormalizedMessage {
    /// Build a message from the `fields` of a message-stream event.
    pub fn from_stream_fields(fields: Option<&Value>) -> Result<Self, FrameError> {
        let payload = StreamFields::first_arg(fields)?;
        let payload = MessagePayload::deserialize(payload).map_err(FrameError::InvalidPayload)?;
        Self::try_from(payload)
    }
}

impl TryFrom<MessagePayload> for NormalizedMessage {
    type Error = FrameError;

    fn try_from(p: MessagePayload) -> Result<Self, Self::Error> {
        Ok(Self {
            ts: p.ts.to_iso8601()?,
            updated_at: p.updated_at.to_iso8601()?,
            id: p.id,
            room_id: p.rid,
            text: p.msg,
            alias: p.alias,
            sender: p.u,
            reactions: p.reactions,
            mentions: p.mentions,
            channels: p.channels,
            starred: p.starred,
            kind: p.t,
            groupable: p.groupable,
            thread_id: p.tmid,
        })
    }
}
