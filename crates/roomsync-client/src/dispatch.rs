//! Inbound frame dispatch.
//!
//! Stateless per frame: text in, [`Event`] out. The connection task decides
//! what each event does to client state.

use roomsync_core::{FrameError, MESSAGE_STREAM, MethodError, NormalizedMessage, ServerFrame};

#[derive(Debug, PartialEq)]
pub(crate) enum Event {
    Handshake { session: String },
    VersionRejected { version: String },
    Ping { id: Option<String> },
    MethodResult { id: String, error: Option<MethodError> },
    Message(NormalizedMessage),
    Removed { collection: String, id: Option<String> },
    SubscriptionEnded { id: String, error: Option<MethodError> },
    Ignored,
}

pub(crate) fn dispatch(text: &str) -> Result<Event, FrameError> {
    let event = match ServerFrame::parse(text)? {
        ServerFrame::Connected { session } => Event::Handshake { session },
        ServerFrame::Failed { version } => Event::VersionRejected { version },
        ServerFrame::Ping { id } => Event::Ping { id },
        ServerFrame::Result { id, error, .. } => Event::MethodResult { id, error },
        ServerFrame::Changed { collection, fields, .. } | ServerFrame::Added { collection, fields, .. } => {
            if collection != MESSAGE_STREAM {
                tracing::trace!(%collection, "ignoring event for unwatched collection");
                return Ok(Event::Ignored);
            }
            Event::Message(NormalizedMessage::from_stream_fields(fields.as_ref())?)
        }
        ServerFrame::Removed { collection, id } => Event::Removed { collection, id },
        ServerFrame::Nosub { id, error } => Event::SubscriptionEnded { id, error },
        ServerFrame::Other => Event::Ignored,
    };
    Ok(event)
}
