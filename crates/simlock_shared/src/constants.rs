//! # Protocol Constants
//!
//! Defaults for the ownership protocol.
//!
//! Every duration here can be overridden from the session config file;
//! these are the values observed in the shipped game mod.

// =============================================================================
// FAILSAFE
// =============================================================================

/// Maximum time a cinematic may hold its exclusive lock before it is force-ended.
pub const DEFAULT_MAX_CINEMATIC_MS: u64 = 12_000;

/// Duration of a local hatch hold before it unlocks by itself.
pub const DEFAULT_HATCH_LOCK_MS: u64 = 15_000;

// =============================================================================
// LOCKS
// =============================================================================

/// How long a transient record survives on the authority before it is swept.
pub const DEFAULT_TRANSIENT_GRACE_MS: u64 = 2_000;

/// How long a client waits for a lock response before treating it as denied.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

// =============================================================================
// TRANSPORT
// =============================================================================

/// Capacity of the bounded message channels between clients and the authority.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// USER FEEDBACK
// =============================================================================

/// Message shown to the player when another client owns the entity.
pub const DENIED_MESSAGE: &str = "Another player is already using this.";
