//! Request and message identifiers.

use rand::Rng;

/// Alphabet without look-alike characters, as used for backend document ids.
const UNMISTAKABLE: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTWXYZabcdefghijkmnopqrstuvwxyz";

pub const MESSAGE_ID_LEN: usize = 17;

/// Per-connection request id counter. Ids start at "1".
#[derive(Debug, Default)]
pub(crate) struct RequestIds(u64);

impl RequestIds {
    pub(crate) fn next(&mut self) -> String {
        self.0 += 1;
        self.0.to_string()
    }
}

/// A fresh client-side message id.
pub fn message_id() -> String {
    let mut rng = rand::thread_rng();
    (0..MESSAGE_ID_LEN)
        .map(|_| UNMISTAKABLE[rng.gen_range(0..UNMISTAKABLE.len())] as char)
        .collect()
}
