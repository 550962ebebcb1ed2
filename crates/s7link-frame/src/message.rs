use std::fmt;

use serde::{Deserialize, Serialize};

/// Type id reserved for "invalid, never sent". Unparsable ids decode to it.
pub const INVALID_TYPE_ID: i32 = 0;

/// One discrete controller message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Selects the message kind.
    pub type_id: i32,
    /// Sub-identifier within the kind, e.g. which physical channel.
    pub data_id: i32,
    /// Data segment, carried as text.
    pub payload: String,
}

impl Message {
    pub fn new(type_id: i32, data_id: i32, payload: impl Into<String>) -> Self {
        Self {
            type_id,
            data_id,
            payload: payload.into(),
        }
    }

    /// Whether this message may be queued for sending.
    pub fn is_sendable(&self) -> bool {
        self.type_id != INVALID_TYPE_ID
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type={} data_id={} payload={:?}",
            self.type_id, self.data_id, self.payload
        )
    }
}
