/// Errors that make a set of descriptors unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Two descriptors claim the same type id.
    #[error("duplicate message type id {type_id}")]
    DuplicateTypeId { type_id: i32 },
}

/// Errors raised by a handler while acting on a message.
///
/// The dispatcher logs and discards these.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The payload could not be interpreted.
    #[error("invalid payload {payload:?}: {reason}")]
    InvalidPayload { payload: String, reason: String },

    /// The handler does not know this data id.
    #[error("unknown data id {0}")]
    UnknownDataId(i32),

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
