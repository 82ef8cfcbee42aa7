//! # Integration Traits
//!
//! Traits the host game implements so its call sites can take part in the
//! lock protocol without the ownership core knowing how they are hooked.
//!
//! ```text
//! simlock defines:        host implements:
//! ┌──────────────────┐    ┌──────────────────┐
//! │ NetworkIdentity  │ ←─ │ entity component │
//! │ InteractionHandler│ ←─ │ ladder / hatch … │
//! └──────────────────┘    └──────────────────┘
//! ```

use simlock_shared::EntityId;

/// Resolves the multiplayer identity of a game object.
pub trait NetworkIdentity {
    /// Returns the entity id, or `None` if the object is not networked.
    fn try_get_id(&self) -> Option<EntityId>;
}

impl NetworkIdentity for EntityId {
    fn try_get_id(&self) -> Option<EntityId> {
        Some(*self)
    }
}

impl<T: NetworkIdentity> NetworkIdentity for Option<T> {
    fn try_get_id(&self) -> Option<EntityId> {
        self.as_ref().and_then(NetworkIdentity::try_get_id)
    }
}

/// A deferred user action waiting on a lock.
///
/// Carries whatever the call site needs to replay the action (the target
/// object and the player that triggered it).
pub trait InteractionHandler: Send + 'static {
    /// Replays the original action after the lock was granted.
    fn proceed(self);

    /// Gives the player feedback that someone else holds the lock.
    fn denied(self, entity_id: EntityId);
}
