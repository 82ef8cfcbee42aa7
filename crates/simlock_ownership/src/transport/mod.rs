//! # Transport Layer
//!
//! In-process loopback between clients and one [`LockAuthority`].
//!
//! ## Design
//!
//! - One bounded uplink and one bounded downlink per client
//! - [`LocalHub::pump`] serves clients in id order, each in the order it sent
//! - The sender is known from the uplink a message arrived on, never taken
//!   from the message itself
//! - Every message goes through the JSON codec, as it would on a real wire
//!
//! ```text
//!  ClientSession ──► uplink ──┐                 ┌──► downlink ──► ClientSession
//!  ClientSession ──► uplink ──┼──► pump ────────┼──► downlink ──► ClientSession
//!  ClientSession ──► uplink ──┘   LockAuthority └──► downlink ──► ClientSession
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::de::DeserializeOwned;
use serde::Serialize;
use simlock_shared::protocol::{decode, encode};
use simlock_shared::{ClientId, ClientMessage, EntityId, ServerMessage};

use crate::client::SimulationOwnership;
use crate::config::OwnershipConfig;
use crate::error::OwnershipResult;
use crate::server::LockAuthority;

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Messages taken off uplinks.
    pub messages_up: u64,
    /// Messages put on downlinks.
    pub messages_down: u64,
    /// Encoded bytes taken off uplinks.
    pub bytes_up: u64,
    /// Encoded bytes put on downlinks.
    pub bytes_down: u64,
    /// Messages dropped by the codec or a dead downlink.
    pub dropped: u64,
}

/// Channel ends handed to a newly connected client.
#[derive(Debug)]
pub struct ClientEndpoint {
    /// Id assigned by the authority.
    pub client_id: ClientId,
    /// Messages towards the authority.
    pub outbound: Sender<ClientMessage>,
    /// Messages from the authority.
    pub inbound: Receiver<ServerMessage>,
}

impl ClientEndpoint {
    /// Builds the client-side arbiter on top of this endpoint.
    #[must_use]
    pub fn into_session(self, config: &OwnershipConfig) -> ClientSession {
        ClientSession {
            ownership: Arc::new(SimulationOwnership::new(self.client_id, self.outbound, config)),
            inbound: self.inbound,
        }
    }
}

/// A connected client: its arbiter plus the receiving end of its downlink.
#[derive(Debug)]
pub struct ClientSession {
    ownership: Arc<SimulationOwnership>,
    inbound: Receiver<ServerMessage>,
}

impl ClientSession {
    /// The arbiter, to be shared with call-site adapters.
    #[must_use]
    pub const fn ownership(&self) -> &Arc<SimulationOwnership> {
        &self.ownership
    }

    /// Our client id.
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        self.ownership.client_id()
    }

    /// Per-tick client update: applies responses, then times out stale requests.
    ///
    /// Returns the number of messages handled.
    pub fn poll(&self, now: Instant) -> usize {
        let handled = self.ownership.process_incoming(&self.inbound);
        self.ownership.expire_pending(now);
        handled
    }
}

/// In-process hub wiring clients to one authority.
#[derive(Debug)]
pub struct LocalHub {
    authority: Arc<LockAuthority>,
    capacity: usize,
    links: BTreeMap<ClientId, Link>,
    stats: TransportStats,
}

/// Hub side of one client's channels.
#[derive(Debug)]
struct Link {
    uplink: Receiver<ClientMessage>,
    downlink: Sender<ServerMessage>,
}

impl LocalHub {
    /// Creates a hub with a fresh authority.
    #[must_use]
    pub fn new(config: &OwnershipConfig) -> Self {
        Self::with_authority(Arc::new(LockAuthority::new(config)), config)
    }

    /// Creates a hub in front of an existing authority.
    #[must_use]
    pub fn with_authority(authority: Arc<LockAuthority>, config: &OwnershipConfig) -> Self {
        Self {
            authority,
            capacity: config.transport.channel_capacity,
            links: BTreeMap::new(),
            stats: TransportStats::default(),
        }
    }

    /// Registers a client with the authority and opens its channels.
    ///
    /// # Errors
    ///
    /// Returns [`crate::OwnershipError::AuthorityFull`] if no id is free.
    pub fn connect(&mut self) -> OwnershipResult<ClientEndpoint> {
        let client_id = self.authority.register_client()?;
        let (outbound, uplink) = bounded(self.capacity);
        let (downlink, inbound) = bounded(self.capacity);
        self.links.insert(client_id, Link { uplink, downlink });
        Ok(ClientEndpoint {
            client_id,
            outbound,
            inbound,
        })
    }

    /// Closes a client's channels and releases its locks.
    pub fn disconnect(&mut self, client: ClientId) -> Vec<EntityId> {
        self.links.remove(&client);
        self.authority.disconnect_client(client)
    }

    /// Delivers every queued client message to the authority and routes the
    /// responses back to the sender. Then sweeps stale transient records.
    ///
    /// Returns the number of client messages handled.
    pub fn pump(&mut self, now: Instant) -> usize {
        let senders: Vec<ClientId> = self.links.keys().copied().collect();
        let mut handled = 0;
        for sender in senders {
            let queued: Vec<ClientMessage> = match self.links.get(&sender) {
                Some(link) => link.uplink.try_iter().collect(),
                None => continue,
            };
            for message in queued {
                let Some(message) = self.through_wire::<ClientMessage>(&message, true) else {
                    continue;
                };
                handled += 1;
                if let Some(response) = self.authority.handle_from(sender, message, now) {
                    self.deliver(sender, &response);
                }
            }
        }
        self.authority.sweep(now);
        handled
    }

    /// Destroys an entity and notifies its holder.
    ///
    /// Returns true if the entity was locked.
    pub fn destroy_entity(&mut self, entity_id: EntityId) -> bool {
        match self.authority.destroy_entity(entity_id) {
            Some((holder, revoked)) => {
                self.deliver(holder, &revoked);
                true
            }
            None => false,
        }
    }

    /// The authority behind this hub.
    #[must_use]
    pub const fn authority(&self) -> &Arc<LockAuthority> {
        &self.authority
    }

    /// Returns transport statistics.
    #[must_use]
    pub const fn stats(&self) -> &TransportStats {
        &self.stats
    }

    fn deliver(&mut self, client: ClientId, message: &ServerMessage) {
        let Some(message) = self.through_wire::<ServerMessage>(message, false) else {
            return;
        };
        let Some(link) = self.links.get(&client) else {
            tracing::debug!("Dropping message for disconnected {}", client);
            self.stats.dropped += 1;
            return;
        };
        if let Err(err) = link.downlink.try_send(message) {
            tracing::warn!("Could not deliver to {}: {}", client, err);
            self.stats.dropped += 1;
        }
    }

    /// Encodes and decodes `message`, counting the bytes.
    fn through_wire<M: Serialize + DeserializeOwned>(&mut self, message: &M, up: bool) -> Option<M> {
        let result = encode(message).and_then(|bytes| decode::<M>(&bytes).map(|decoded| (bytes.len(), decoded)));
        match result {
            Ok((len, decoded)) => {
                if up {
                    self.stats.messages_up += 1;
                    self.stats.bytes_up += len as u64;
                } else {
                    self.stats.messages_down += 1;
                    self.stats.bytes_down += len as u64;
                }
                Some(decoded)
            }
            Err(err) => {
                tracing::warn!("Dropping message: {}", err);
                self.stats.dropped += 1;
                None
            }
        }
    }
}
