//! # Call-Site Integration
//!
//! Glue between hooked game actions and the ownership core.
//!
//! ## Data Flow
//!
//! ```text
//! player clicks ladder
//!        │
//!        ▼
//! InteractionGate::intercept ──(no id / not enforced / already held)──► run original
//!        │
//!        ▼ Deferred
//! LockRequest ──► authority ──► LockResponse
//!                                   │
//!              granted ◄────────────┴────────────► denied
//!                 │                                   │
//!        handler.proceed()                  handler.denied(id)
//!     (replay guarded by the gate)       ("Another player is already using this.")
//!                 │
//!        ... interaction runs ...
//!                 │
//!   end_interaction / failsafe force_end ──► TRANSIENT (downgrade)
//! ```

pub mod cinematic;
pub mod gate;
pub mod hatch;
pub mod traits;

pub use cinematic::{CinematicMode, CinematicStart};
pub use gate::{end_interaction, Interception, InteractionGate};
pub use hatch::TimedLocalLock;
pub use traits::{InteractionHandler, NetworkIdentity};
