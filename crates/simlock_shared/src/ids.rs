//! # Identifiers
//!
//! Identities that every participant in the protocol must agree on.
//!
//! - [`EntityId`]: a shared game object, stable for its multiplayer lifetime
//! - [`ClientId`]: a connected client, assigned by the authority
//! - [`RequestId`]: correlates one lock request with its response

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;

/// Globally unique identifier of a network-tracked entity.
///
/// Assigned once when the entity is registered with the network layer and
/// never reused while the entity exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Creates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from its raw 128-bit value.
    #[inline]
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Returns the raw 128-bit value.
    #[inline]
    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0.as_u128()
    }
}

impl Default for EntityId {
    /// A fresh random identifier, same as [`EntityId::new`].
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidEntityId(s.to_owned()))
    }
}

/// Identifier of a connected client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u16);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Correlation id pairing a lock request with exactly one response.
///
/// Allocated per client; only unique together with the requesting [`ClientId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Returns the id following this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_text_form() {
        let id = EntityId::from_u128(42);
        let text = id.to_string();

        assert_eq!(text, "00000000-0000-0000-0000-00000000002a");
        assert_eq!(text.parse::<EntityId>().unwrap(), id);
    }

    #[test]
    fn test_entity_id_rejects_garbage() {
        let err = "door-42".parse::<EntityId>().unwrap_err();
        assert_eq!(err, ProtocolError::InvalidEntityId("door-42".to_owned()));
    }

    #[test]
    fn test_random_entity_ids_differ() {
        assert_ne!(EntityId::new(), EntityId::new());
        assert_ne!(EntityId::default(), EntityId::default());
    }

    #[test]
    fn test_request_id_wraps() {
        assert_eq!(RequestId(7).next(), RequestId(8));
        assert_eq!(RequestId(u64::MAX).next(), RequestId(0));
    }
}
