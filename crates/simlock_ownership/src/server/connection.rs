//! # Client Connection Management
//!
//! Tracks which clients the authority knows about.
//!
//! ## Design
//!
//! - Fixed number of slots, one per possible client
//! - Ids are handed out round-robin so a recently freed id is not reused at once
//! - Lock state lives in the ownership table, not here

use simlock_shared::ClientId;

use crate::error::{OwnershipError, OwnershipResult};

/// State of a client slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Slot is free.
    #[default]
    Disconnected = 0,
    /// Client is registered and may request locks.
    Connected = 1,
}

/// One client slot.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClientConnection {
    /// Slot state.
    pub state: ConnectionState,
    /// Lock requests handled for this client.
    pub requests: u64,
}

impl ClientConnection {
    /// Returns true if this slot is in use.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.state, ConnectionState::Connected)
    }
}

/// Registry of connected clients.
#[derive(Debug)]
pub struct ConnectedClients {
    slots: Vec<ClientConnection>,
    next_id: usize,
    connected: usize,
}

impl ConnectedClients {
    /// Creates a registry with room for `capacity` clients.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![ClientConnection::default(); capacity.min(usize::from(u16::MAX) + 1)],
            next_id: 0,
            connected: 0,
        }
    }

    /// Claims a free id.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::AuthorityFull`] if every slot is taken.
    pub fn register(&mut self) -> OwnershipResult<ClientId> {
        let capacity = self.slots.len();
        for offset in 0..capacity {
            let index = (self.next_id + offset) % capacity;
            if !self.slots[index].is_active() {
                self.slots[index] = ClientConnection {
                    state: ConnectionState::Connected,
                    requests: 0,
                };
                self.next_id = (index + 1) % capacity;
                self.connected += 1;
                let id = u16::try_from(index).map_err(|_| OwnershipError::AuthorityFull {
                    connected: self.connected,
                })?;
                return Ok(ClientId(id));
            }
        }
        Err(OwnershipError::AuthorityFull {
            connected: self.connected,
        })
    }

    /// Frees the slot of `client`.
    ///
    /// Returns false if the client was not connected.
    pub fn disconnect(&mut self, client: ClientId) -> bool {
        match self.slots.get_mut(usize::from(client.0)) {
            Some(slot) if slot.is_active() => {
                *slot = ClientConnection::default();
                self.connected -= 1;
                true
            }
            _ => false,
        }
    }

    /// Returns true if `client` is connected.
    #[must_use]
    pub fn is_connected(&self, client: ClientId) -> bool {
        self.get(client).is_some()
    }

    /// Counts one handled request for `client`.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::UnknownClient`] if `client` is not connected.
    pub fn record_request(&mut self, client: ClientId) -> OwnershipResult<()> {
        match self.slots.get_mut(usize::from(client.0)) {
            Some(slot) if slot.is_active() => {
                slot.requests += 1;
                Ok(())
            }
            _ => Err(OwnershipError::UnknownClient(client)),
        }
    }

    /// Returns the slot of a connected client.
    #[must_use]
    pub fn get(&self, client: ClientId) -> Option<&ClientConnection> {
        self.slots.get(usize::from(client.0)).filter(|s| s.is_active())
    }

    /// Number of connected clients.
    #[inline]
    #[must_use]
    pub const fn connected(&self) -> usize {
        self.connected
    }
}
