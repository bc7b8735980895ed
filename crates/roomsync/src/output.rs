//! Message store that prints each message as one JSON line.

use roomsync_core::{MessageStore, NormalizedMessage};
use std::io::Write;
use std::sync::{Mutex, PoisonError};

pub struct JsonLines<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLines<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> MessageStore for JsonLines<W> {
    fn append(&self, room_id: &str, message: NormalizedMessage) {
        let line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(error) => {
                tracing::error!(room = room_id, %error, "failed to encode message");
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            tracing::error!(room = room_id, %error, "failed to write message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsync_core::UserRef;

    #[test]
    fn writes_one_line_per_message() {
        let store = JsonLines::new(Vec::new());
        for (id, text) in [("a", "one"), ("b", "two")] {
            store.append(
                "GENERAL",
                NormalizedMessage {
                    id: id.to_string(),
                    room_id: "GENERAL".to_string(),
                    text: text.to_string(),
                    alias: None,
                    sender: UserRef {
                        id: "u1".to_string(),
                        username: "alice".to_string(),
                        name: None,
                    },
                    ts: "2023-11-14T22:13:20.000Z".to_string(),
                    updated_at: "2023-11-14T22:13:20.000Z".to_string(),
                    reactions: None,
                    mentions: None,
                    channels: None,
                    starred: None,
                    kind: None,
                    groupable: None,
                    thread_id: None,
                },
            );
        }

        let output = String::from_utf8(store.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["_id"], "a");
        assert_eq!(lines[1]["msg"], "two");
        assert_eq!(lines[1]["rid"], "GENERAL");
    }
}
