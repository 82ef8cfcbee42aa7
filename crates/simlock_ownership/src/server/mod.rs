//! # Lock Authority
//!
//! The authoritative side of the protocol: owns the ownership table and
//! answers every lock request in receipt order.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      LOCK AUTHORITY                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │ Connected    │  │ Request      │  │ Responses /  │      │
//! │  │ Clients      │──│ Handling     │──│ Revocations  │      │
//! │  └──────────────┘  └──────────────┘  └──────────────┘      │
//! │                           │                                 │
//! │               ┌───────────▼───────────┐                    │
//! │               │ Ownership Table       │                    │
//! │               └───────────────────────┘                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A client that disconnects loses every lock it held, so an exclusive lock
//! can never outlive its holder's session.

mod connection;

pub use connection::{ClientConnection, ConnectedClients, ConnectionState};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use simlock_shared::{ClientId, ClientMessage, EntityId, LockKind, ServerMessage};

use crate::config::OwnershipConfig;
use crate::error::OwnershipResult;
use crate::table::OwnershipTable;
use crate::MAX_CLIENTS;

/// Counters describing what the authority has done so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AuthorityStats {
    /// Lock requests granted.
    pub grants: u64,
    /// Lock requests denied.
    pub denials: u64,
    /// Releases that removed a record.
    pub releases: u64,
    /// Locks revoked because their entity was destroyed.
    pub revocations: u64,
    /// Records dropped by disconnects and transient sweeps.
    pub swept: u64,
    /// Messages whose claimed sender did not match the connection.
    pub rejected: u64,
}

/// Server-side lock arbiter.
#[derive(Debug)]
pub struct LockAuthority {
    table: OwnershipTable,
    clients: Mutex<ConnectedClients>,
    transient_grace: Duration,
    grants: AtomicU64,
    denials: AtomicU64,
    releases: AtomicU64,
    revocations: AtomicU64,
    swept: AtomicU64,
    rejected: AtomicU64,
}

impl LockAuthority {
    /// Creates an authority with room for [`MAX_CLIENTS`] clients.
    #[must_use]
    pub fn new(config: &OwnershipConfig) -> Self {
        Self::with_capacity(config, MAX_CLIENTS)
    }

    /// Creates an authority with room for `max_clients` clients.
    #[must_use]
    pub fn with_capacity(config: &OwnershipConfig, max_clients: usize) -> Self {
        Self {
            table: OwnershipTable::new(),
            clients: Mutex::new(ConnectedClients::new(max_clients)),
            transient_grace: config.transient_grace(),
            grants: AtomicU64::new(0),
            denials: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            revocations: AtomicU64::new(0),
            swept: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Registers a new client and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::OwnershipError::AuthorityFull`] if no id is free.
    pub fn register_client(&self) -> OwnershipResult<ClientId> {
        let id = self.clients.lock().register()?;
        tracing::info!("Client connected: {}", id);
        Ok(id)
    }

    /// Forgets `client` and releases every lock it held.
    ///
    /// Returns the entities that were freed.
    pub fn disconnect_client(&self, client: ClientId) -> Vec<EntityId> {
        // Held across the sweep so no grant to `client` can land after it.
        let mut clients = self.clients.lock();
        if !clients.disconnect(client) {
            return Vec::new();
        }
        let freed = self.table.release_all(client);
        drop(clients);
        self.swept.fetch_add(freed.len() as u64, Ordering::Relaxed);
        tracing::info!("Client disconnected: {} ({} locks released)", client, freed.len());
        freed
    }

    /// Returns true if `client` is connected.
    #[must_use]
    pub fn is_connected(&self, client: ClientId) -> bool {
        self.clients.lock().is_connected(client)
    }

    /// Number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.lock().connected()
    }

    /// Handles one message, taking its `client` field as the sender.
    ///
    /// For in-process callers that already know who is talking. Anything
    /// coming off a connection goes through [`handle_from`](Self::handle_from).
    pub fn handle(&self, message: ClientMessage, now: Instant) -> Option<ServerMessage> {
        self.handle_from(message.client(), message, now)
    }

    /// Handles one message received from `sender`'s connection.
    ///
    /// Lock requests always produce a response; releases never do. A message
    /// claiming to come from another client is denied or dropped.
    pub fn handle_from(&self, sender: ClientId, message: ClientMessage, now: Instant) -> Option<ServerMessage> {
        if message.client() != sender {
            tracing::warn!(
                "{} sent a message claiming to be {}, rejecting",
                sender,
                message.client()
            );
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return match message {
                ClientMessage::LockRequest {
                    request_id,
                    entity_id,
                    kind,
                    ..
                } => {
                    self.denials.fetch_add(1, Ordering::Relaxed);
                    Some(ServerMessage::LockResponse {
                        request_id,
                        entity_id,
                        kind,
                        granted: false,
                    })
                }
                ClientMessage::Release { .. } => None,
            };
        }

        match message {
            ClientMessage::LockRequest {
                request_id,
                entity_id,
                kind,
                client,
            } => {
                let granted = self.decide(entity_id, client, kind, now);
                Some(ServerMessage::LockResponse {
                    request_id,
                    entity_id,
                    kind,
                    granted,
                })
            }
            ClientMessage::Release { entity_id, client } => {
                if self.table.release(entity_id, client) {
                    self.releases.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("{} released {}", client, entity_id);
                }
                None
            }
        }
    }

    /// Drops the record of a destroyed entity.
    ///
    /// Returns the previous holder and the revocation to send it.
    pub fn destroy_entity(&self, entity_id: EntityId) -> Option<(ClientId, ServerMessage)> {
        let record = self.table.remove_entity(entity_id)?;
        self.revocations.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Entity {} destroyed, revoking {} lock of {}", entity_id, record.kind, record.holder);
        Some((record.holder, ServerMessage::LockRevoked { entity_id }))
    }

    /// Drops transient records older than the grace period.
    ///
    /// Returns the number of records removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let removed = self.table.sweep_transient(now, self.transient_grace);
        if removed > 0 {
            self.swept.fetch_add(removed as u64, Ordering::Relaxed);
            tracing::debug!("Swept {} stale transient records", removed);
        }
        removed
    }

    /// Returns true if `client` holds an exclusive lock on `entity_id`.
    #[must_use]
    pub fn has_exclusive_lock(&self, entity_id: EntityId, client: ClientId) -> bool {
        self.table.has_exclusive_lock(entity_id, client)
    }

    /// Returns the current holder of `entity_id`.
    #[must_use]
    pub fn holder(&self, entity_id: EntityId) -> Option<ClientId> {
        self.table.holder(entity_id)
    }

    /// Read access to the ownership table.
    #[inline]
    #[must_use]
    pub const fn table(&self) -> &OwnershipTable {
        &self.table
    }

    /// Returns the authority counters.
    #[must_use]
    pub fn stats(&self) -> AuthorityStats {
        AuthorityStats {
            grants: self.grants.load(Ordering::Relaxed),
            denials: self.denials.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            revocations: self.revocations.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    fn decide(&self, entity_id: EntityId, client: ClientId, kind: LockKind, now: Instant) -> bool {
        // Lock order is clients, then table, same as `disconnect_client`.
        let mut clients = self.clients.lock();
        if let Err(err) = clients.record_request(client) {
            drop(clients);
            tracing::warn!("Denying lock on {}: {}", entity_id, err);
            self.denials.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let granted = (!kind.is_exclusive() && self.table.downgrade(entity_id, client, kind, now))
            || self.table.try_acquire(entity_id, client, kind, now);
        drop(clients);

        if granted {
            self.grants.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Granted {} lock on {} to {}", kind, entity_id, client);
        } else {
            self.denials.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Denied {} lock on {} to {}", kind, entity_id, client);
        }
        granted
    }
}
