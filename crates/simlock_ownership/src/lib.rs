//! # SIMLOCK Ownership - Simulation Ownership Protocol
//!
//! Decides which connected client is authoritative ("simulating") for a
//! shared entity: doors, ladders, cinematics, creatures.
//!
//! ## Architecture
//!
//! - **Table**: entity -> lock record, one mutex, atomic acquire / release / downgrade
//! - **Requests**: correlation ids, coalescing, exactly-once callbacks
//! - **Client**: non-blocking arbiter proxy with a local view of held locks
//! - **Server**: the authority, answering requests in receipt order
//! - **Failsafe**: force-ends interactions that run too long
//! - **Integration**: call-site gate, natural end path, local hatch hold
//!
//! ## Lock Model
//!
//! ```text
//! CLIENT                                   AUTHORITY
//!   |                                          |
//!   |--- LockRequest(door, EXCLUSIVE) -------->|
//!   |                                          | <- at most one EXCLUSIVE
//!   |<-- LockResponse(granted) ----------------|
//!   |                                          |
//!   |    ... interaction runs ...              |
//!   |                                          |
//!   |--- LockRequest(door, TRANSIENT) -------->| <- downgrade, never blocks
//! ```
//!
//! Nothing here is fatal. A denied lock is a normal outcome; the player is
//! told "Another player is already using this." and the game carries on.
//!
//! ## Example
//!
//! ```rust,ignore
//! use simlock_ownership::{LocalHub, OwnershipConfig, LockRequest};
//! use simlock_shared::{EntityId, LockKind};
//!
//! let config = OwnershipConfig::default();
//! let mut hub = LocalHub::new(&config);
//! let session = hub.connect()?.into_session(&config);
//!
//! session.ownership().request_simulation_lock(LockRequest::new(
//!     EntityId::from_u128(42),
//!     LockKind::Exclusive,
//!     |id, granted, ()| println!("{id}: {granted}"),
//!     (),
//! ));
//! hub.pump(now);
//! session.poll(now); // callback fires here
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod client;
pub mod config;
pub mod error;
pub mod failsafe;
pub mod integration;
pub mod request;
pub mod server;
pub mod simulation;
pub mod table;
pub mod transport;

// Re-exports for convenience
pub use client::{ArbiterStats, SimulationOwnership};
pub use config::{FailsafeConfig, HatchConfig, LockConfig, OwnershipConfig, TransportConfig};
pub use error::{OwnershipError, OwnershipResult};
pub use failsafe::{FailsafeMonitor, FailsafeOutcome, FailsafeState, WatchedInteraction};
pub use integration::{
    end_interaction, CinematicMode, CinematicStart, Interception, InteractionGate, InteractionHandler,
    NetworkIdentity, TimedLocalLock,
};
pub use request::{LockCallback, LockRequest, PendingRequests, Submission};
pub use server::{AuthorityStats, LockAuthority};
pub use simulation::{ContentionSimulation, NetworkConditions, SimulationConfig, SimulationStats};
pub use table::{OwnershipRecord, OwnershipTable};
pub use transport::{ClientEndpoint, ClientSession, LocalHub, TransportStats};

/// Maximum number of clients one authority accepts.
pub const MAX_CLIENTS: usize = 128;
