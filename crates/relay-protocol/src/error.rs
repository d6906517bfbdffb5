use thiserror::Error;

/// Errors that can arise when encoding/decoding a frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown leading command letter in a line frame.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    /// Push frame carried an event name this client does not know.
    #[error("unknown event: {0}")]
    UnknownEvent(String),
}
