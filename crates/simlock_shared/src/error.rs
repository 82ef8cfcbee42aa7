//! # Protocol Error Types

use thiserror::Error;

/// Errors that can occur while encoding or decoding lock messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// Bytes did not contain a valid message.
    #[error("failed to decode message: {0}")]
    Decode(String),

    /// Text was not a valid entity identifier.
    #[error("invalid entity id: {0}")]
    InvalidEntityId(String),
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
