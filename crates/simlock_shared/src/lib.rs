//! # SIMLOCK Shared
//!
//! Common types used by both the client-side arbiter and the authority.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER hold runtime state:
//! - no locks
//! - no channels
//! - no clocks
//!
//! If you need any of those, put them in `simlock_ownership`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod error;
pub mod ids;
pub mod lock;
pub mod protocol;

pub use constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_HATCH_LOCK_MS, DEFAULT_MAX_CINEMATIC_MS,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_TRANSIENT_GRACE_MS, DENIED_MESSAGE,
};
pub use error::{ProtocolError, ProtocolResult};
pub use ids::{ClientId, EntityId, RequestId};
pub use lock::LockKind;
pub use protocol::{ClientMessage, ServerMessage};
