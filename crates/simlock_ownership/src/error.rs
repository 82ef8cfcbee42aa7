//! # Ownership Error Types
//!
//! Errors that can occur around the ownership subsystem.
//!
//! Protocol outcomes are NOT errors: a denied lock, a release by a
//! non-holder or a double release are normal results and never show up here.

use simlock_shared::ClientId;
use thiserror::Error;

/// Errors that can occur in the ownership subsystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OwnershipError {
    /// Config file could not be read.
    #[error("failed to read config {path}: {reason}")]
    ConfigIo {
        /// Path that was read.
        path: String,
        /// Underlying I/O failure.
        reason: String,
    },

    /// Config file was read but is not usable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The other end of a message channel is gone.
    #[error("message channel closed")]
    ChannelClosed,

    /// A bounded message channel is full.
    #[error("message channel full")]
    ChannelFull,

    /// Message came from a client the authority does not know.
    #[error("unknown client: {0}")]
    UnknownClient(ClientId),

    /// No client id is free.
    #[error("authority full: {connected} clients connected")]
    AuthorityFull {
        /// Number of clients currently connected.
        connected: usize,
    },
}

/// Result type for ownership operations.
pub type OwnershipResult<T> = Result<T, OwnershipError>;

impl<T> From<crossbeam_channel::TrySendError<T>> for OwnershipError {
    fn from(err: crossbeam_channel::TrySendError<T>) -> Self {
        match err {
            crossbeam_channel::TrySendError::Full(_) => Self::ChannelFull,
            crossbeam_channel::TrySendError::Disconnected(_) => Self::ChannelClosed,
        }
    }
}
