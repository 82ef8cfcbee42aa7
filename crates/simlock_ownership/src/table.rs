//! # Ownership Table
//!
//! The single source of truth for which client holds which lock on which entity.
//!
//! ## Design
//!
//! - One global `parking_lot::Mutex` around the map: every mutation is atomic
//!   with respect to concurrent requests for the same entity
//! - No operation ever touches more than one entity, so there is no lock ordering
//! - Release by a non-holder is a silent no-op
//!
//! ## Conflict Matrix
//!
//! ```text
//!                   existing record
//! request        none   TRANSIENT   EXCLUSIVE(self)   EXCLUSIVE(other)
//! EXCLUSIVE      grant  grant       grant             deny
//! TRANSIENT      grant  grant       grant (downgrade) deny
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use simlock_shared::{ClientId, EntityId, LockKind};

/// Current lock state of one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OwnershipRecord {
    /// Entity the record is about.
    pub entity_id: EntityId,
    /// Client holding the lock.
    pub holder: ClientId,
    /// Kind of lock held.
    pub kind: LockKind,
    /// When the current kind was acquired.
    pub acquired_at: Instant,
}

impl OwnershipRecord {
    /// Returns true if this record blocks `client` from acquiring a lock.
    #[inline]
    #[must_use]
    pub fn blocks(&self, client: ClientId) -> bool {
        self.kind.is_exclusive() && self.holder != client
    }
}

/// Process-wide mapping from entity to lock record.
#[derive(Debug, Default)]
pub struct OwnershipTable {
    records: Mutex<HashMap<EntityId, OwnershipRecord>>,
}

impl OwnershipTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries to give `client` a lock of `kind` on `entity_id`.
    ///
    /// Fails without touching the table if another client holds an
    /// exclusive lock. Otherwise inserts or overwrites the record.
    pub fn try_acquire(
        &self,
        entity_id: EntityId,
        client: ClientId,
        kind: LockKind,
        now: Instant,
    ) -> bool {
        let mut records = self.records.lock();

        if let Some(existing) = records.get(&entity_id) {
            if existing.blocks(client) {
                return false;
            }
            // Re-asking for the kind already held keeps the original timestamp.
            if existing.holder == client && existing.kind == kind {
                return true;
            }
        }

        records.insert(
            entity_id,
            OwnershipRecord {
                entity_id,
                holder: client,
                kind,
                acquired_at: now,
            },
        );
        true
    }

    /// Removes the record iff `client` is the current holder.
    ///
    /// Returns true if a record was removed.
    pub fn release(&self, entity_id: EntityId, client: ClientId) -> bool {
        let mut records = self.records.lock();

        match records.get(&entity_id) {
            Some(record) if record.holder == client => {
                records.remove(&entity_id);
                true
            }
            _ => false,
        }
    }

    /// Turns an exclusive record held by `client` into `new_kind`.
    ///
    /// Only `EXCLUSIVE -> TRANSIENT` is a downgrade; anything else returns
    /// false and leaves the table untouched.
    pub fn downgrade(
        &self,
        entity_id: EntityId,
        client: ClientId,
        new_kind: LockKind,
        now: Instant,
    ) -> bool {
        if new_kind.is_exclusive() {
            return false;
        }

        let mut records = self.records.lock();
        match records.get_mut(&entity_id) {
            Some(record) if record.holder == client && record.kind.is_exclusive() => {
                record.kind = new_kind;
                record.acquired_at = now;
                true
            }
            _ => false,
        }
    }

    /// Returns true if `client` holds an exclusive lock on `entity_id`.
    #[must_use]
    pub fn has_exclusive_lock(&self, entity_id: EntityId, client: ClientId) -> bool {
        self.records
            .lock()
            .get(&entity_id)
            .is_some_and(|r| r.holder == client && r.kind.is_exclusive())
    }

    /// Returns the current holder of `entity_id`, if any.
    #[must_use]
    pub fn holder(&self, entity_id: EntityId) -> Option<ClientId> {
        self.records.lock().get(&entity_id).map(|r| r.holder)
    }

    /// Returns a copy of the record for `entity_id`.
    #[must_use]
    pub fn record(&self, entity_id: EntityId) -> Option<OwnershipRecord> {
        self.records.lock().get(&entity_id).copied()
    }

    /// Drops the record of a destroyed entity, whoever holds it.
    pub fn remove_entity(&self, entity_id: EntityId) -> Option<OwnershipRecord> {
        self.records.lock().remove(&entity_id)
    }

    /// Drops every record held by `client`.
    ///
    /// Returns the entities that were freed, sorted.
    pub fn release_all(&self, client: ClientId) -> Vec<EntityId> {
        let mut records = self.records.lock();
        let mut freed: Vec<EntityId> = records
            .values()
            .filter(|r| r.holder == client)
            .map(|r| r.entity_id)
            .collect();
        for entity_id in &freed {
            records.remove(entity_id);
        }
        freed.sort_unstable();
        freed
    }

    /// Drops transient records older than `grace`.
    ///
    /// Returns the number of records removed.
    pub fn sweep_transient(&self, now: Instant, grace: Duration) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| {
            r.kind.is_exclusive() || now.saturating_duration_since(r.acquired_at) < grace
        });
        before - records.len()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if no entity is locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Number of exclusive records.
    #[must_use]
    pub fn exclusive_count(&self) -> usize {
        self.records
            .lock()
            .values()
            .filter(|r| r.kind.is_exclusive())
            .count()
    }
}
