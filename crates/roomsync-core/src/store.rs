//! Message store contract.

use crate::NormalizedMessage;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Receives normalized messages from the sync client.
///
/// The client only ever writes; it never reads back.
pub trait MessageStore: Send + Sync {
    fn append(&self, room_id: &str, message: NormalizedMessage);
}

/// Per-room message lists, kept in arrival order.
///
/// A message whose id is already present in the room replaces the earlier
/// record in place. This absorbs edits (`changed` events) and the duplicate
/// that arrives when the same message is written over REST and streamed back.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    rooms: Mutex<HashMap<String, Vec<NormalizedMessage>>>,
}

impl InMemoryMessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a room's messages, oldest first.
    pub fn messages(&self, room_id: &str) -> Vec<NormalizedMessage> {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of messages held for a room.
    pub fn len(&self, room_id: &str) -> usize {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
            .map_or(0, Vec::len)
    }

    /// Empty a room's list.
    pub fn clear(&self, room_id: &str) {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(messages) = rooms.get_mut(room_id) {
            messages.clear();
        }
    }

    /// Rooms that have received at least one message.
    pub fn rooms(&self) -> Vec<String> {
        let rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = rooms.keys().cloned().collect();
        names.sort();
        names
    }
}

impl MessageStore for InMemoryMessageStore {
    fn append(&self, room_id: &str, message: NormalizedMessage) {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        let messages = rooms.entry(room_id.to_string()).or_default();
        match messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => {
                tracing::trace!(room = room_id, id = %message.id, "replacing message");
                *existing = message;
            }
            None => messages.push(message),
        }
    }
}
