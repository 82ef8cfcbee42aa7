//! Lock messages exchanged between clients and the authority.
//!
//! Only the logical shape of each message is fixed here. The surrounding
//! networking layer owns framing; [`encode`]/[`decode`] give it a JSON body
//! when it has nothing better.
//!
//! ```text
//! CLIENT                                   AUTHORITY
//!   |                                          |
//!   |--- LockRequest { id, entity, kind } ---->|
//!   |                                          | <- FIFO per entity
//!   |<-- LockResponse { id, entity, granted } -|
//!   |                                          |
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::{ClientId, EntityId, RequestId};
use crate::lock::LockKind;

/// Message sent from a client to the authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Ask for a lock on an entity.
    LockRequest {
        /// Correlation id, `None` for fire-and-forget requests.
        request_id: Option<RequestId>,
        /// Target entity.
        entity_id: EntityId,
        /// Requested lock kind.
        kind: LockKind,
        /// Requesting client.
        client: ClientId,
    },
    /// Give a lock back.
    Release {
        /// Target entity.
        entity_id: EntityId,
        /// Releasing client.
        client: ClientId,
    },
}

impl ClientMessage {
    /// Returns the client that sent this message.
    #[must_use]
    pub const fn client(&self) -> ClientId {
        match self {
            Self::LockRequest { client, .. } | Self::Release { client, .. } => *client,
        }
    }

    /// Returns the entity this message is about.
    #[must_use]
    pub const fn entity_id(&self) -> EntityId {
        match self {
            Self::LockRequest { entity_id, .. } | Self::Release { entity_id, .. } => *entity_id,
        }
    }
}

/// Message sent from the authority to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Outcome of a [`ClientMessage::LockRequest`].
    LockResponse {
        /// Correlation id copied from the request.
        request_id: Option<RequestId>,
        /// Target entity.
        entity_id: EntityId,
        /// Lock kind that was requested.
        kind: LockKind,
        /// Whether the lock was granted.
        granted: bool,
    },
    /// The client no longer holds any lock on the entity.
    LockRevoked {
        /// Entity whose lock was taken away.
        entity_id: EntityId,
    },
}

impl ServerMessage {
    /// Returns the entity this message is about.
    #[must_use]
    pub const fn entity_id(&self) -> EntityId {
        match self {
            Self::LockResponse { entity_id, .. } | Self::LockRevoked { entity_id } => *entity_id,
        }
    }
}

/// Encodes a message as a JSON body.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode<M: Serialize>(message: &M) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decodes a message from a JSON body.
///
/// # Errors
///
/// Returns [`ProtocolError::Decode`] if the bytes are not a valid message.
pub fn decode<M: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<M> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let message = ClientMessage::LockRequest {
            request_id: Some(RequestId(3)),
            entity_id: EntityId::from_u128(42),
            kind: LockKind::Exclusive,
            client: ClientId(7),
        };

        let bytes = encode(&message).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["type"], "LockRequest");
        assert_eq!(value["entity_id"], "00000000-0000-0000-0000-00000000002a");
        assert_eq!(value["kind"], "Exclusive");
        assert_eq!(value["client"], 7);
        assert_eq!(decode::<ClientMessage>(&bytes).unwrap(), message);
    }

    #[test]
    fn test_decode_rejects_truncated_body() {
        let bytes = encode(&ServerMessage::LockRevoked {
            entity_id: EntityId::from_u128(1),
        })
        .unwrap();

        let err = decode::<ServerMessage>(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_accessors() {
        let entity_id = EntityId::from_u128(9);
        let release = ClientMessage::Release {
            entity_id,
            client: ClientId(2),
        };

        assert_eq!(release.client(), ClientId(2));
        assert_eq!(release.entity_id(), entity_id);
        assert_eq!(ServerMessage::LockRevoked { entity_id }.entity_id(), entity_id);
    }
}
