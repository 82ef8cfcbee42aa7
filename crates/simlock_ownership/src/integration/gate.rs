//! Interception of lockable user actions.
//!
//! A call site asks the gate before running its action. Either the action
//! runs right away (single-player behaviour, or the lock is already ours) or
//! it is deferred: a lock request goes out and the action is replayed from
//! the grant callback.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use simlock_shared::{EntityId, LockKind};

use crate::client::SimulationOwnership;
use crate::config::OwnershipConfig;
use crate::integration::traits::InteractionHandler;
use crate::request::LockRequest;

/// What the call site should do after [`InteractionGate::intercept`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interception {
    /// Run the original action now.
    RunOriginal,
    /// Skip the action; it is replayed (or denied) from the lock callback.
    Deferred,
}

/// Per-call-site lock gate with a replay guard.
///
/// The guard only covers the thread running a replay and the entity being
/// replayed. Other threads and other entities still go through the lock.
#[derive(Debug)]
pub struct InteractionGate {
    replaying: Mutex<HashSet<(ThreadId, EntityId)>>,
    enforce: bool,
}

/// Removes its replay entry on drop, including on unwind.
struct ReplayGuard<'a> {
    replaying: &'a Mutex<HashSet<(ThreadId, EntityId)>>,
    key: (ThreadId, EntityId),
}

impl<'a> ReplayGuard<'a> {
    fn enter(replaying: &'a Mutex<HashSet<(ThreadId, EntityId)>>, entity_id: EntityId) -> Self {
        let key = (thread::current().id(), entity_id);
        replaying.lock().insert(key);
        Self { replaying, key }
    }
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.replaying.lock().remove(&self.key);
    }
}

impl InteractionGate {
    /// Creates a gate. With `enforce == false` every action runs unguarded.
    #[must_use]
    pub fn new(enforce: bool) -> Self {
        Self {
            replaying: Mutex::new(HashSet::new()),
            enforce,
        }
    }

    /// Creates a gate honouring `locks.enforce_interaction_locks`.
    #[must_use]
    pub fn from_config(config: &OwnershipConfig) -> Self {
        Self::new(config.locks.enforce_interaction_locks)
    }

    /// Returns true while the calling thread replays a granted action on `entity_id`.
    #[must_use]
    pub fn is_replaying(&self, entity_id: EntityId) -> bool {
        self.replaying.lock().contains(&(thread::current().id(), entity_id))
    }

    /// Decides whether a lockable action may run now.
    ///
    /// `entity_id` is the result of [`NetworkIdentity::try_get_id`]
    /// on the target; `None` means the target is not networked.
    ///
    /// [`NetworkIdentity::try_get_id`]: crate::integration::NetworkIdentity::try_get_id
    pub fn intercept<H: InteractionHandler>(
        self: &Arc<Self>,
        ownership: &SimulationOwnership,
        entity_id: Option<EntityId>,
        kind: LockKind,
        handler: H,
    ) -> Interception {
        if !self.enforce {
            return Interception::RunOriginal;
        }
        let Some(entity_id) = entity_id else {
            return Interception::RunOriginal;
        };
        if self.is_replaying(entity_id) || ownership.held_kind(entity_id) == Some(kind) {
            return Interception::RunOriginal;
        }

        let gate = Arc::clone(self);
        ownership.request_simulation_lock(LockRequest::new(
            entity_id,
            kind,
            move |id, granted, handler: H| {
                if granted {
                    let _replay = ReplayGuard::enter(&gate.replaying, id);
                    handler.proceed();
                } else {
                    tracing::debug!("Interaction on {} denied", id);
                    handler.denied(id);
                }
            },
            handler,
        ));
        Interception::Deferred
    }
}

impl Default for InteractionGate {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Natural end of an interaction: downgrades our exclusive lock to transient.
///
/// Returns true if a downgrade was requested.
pub fn end_interaction(ownership: &SimulationOwnership, entity_id: Option<EntityId>) -> bool {
    let Some(entity_id) = entity_id else {
        return false;
    };
    if !ownership.has_exclusive_lock(entity_id) {
        return false;
    }
    if let Err(err) = ownership.request_simulation_lock_detached(entity_id, LockKind::Transient) {
        tracing::warn!("Could not downgrade lock on {}: {}", entity_id, err);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, Receiver};
    use parking_lot::Mutex;
    use simlock_shared::{ClientId, ClientMessage, ServerMessage};

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Seen {
        Proceeded,
        Denied(EntityId),
    }

    /// Handler that re-enters the gate the way a hooked method would.
    struct Ladder {
        gate: Arc<InteractionGate>,
        ownership: Arc<SimulationOwnership>,
        entity_id: EntityId,
        seen: Arc<Mutex<Vec<Seen>>>,
    }

    impl InteractionHandler for Ladder {
        fn proceed(self) {
            let again = Ladder {
                gate: Arc::clone(&self.gate),
                ownership: Arc::clone(&self.ownership),
                entity_id: self.entity_id,
                seen: Arc::clone(&self.seen),
            };
            let inner = self
                .gate
                .intercept(&self.ownership, Some(self.entity_id), LockKind::Exclusive, again);
            assert_eq!(inner, Interception::RunOriginal);
            self.seen.lock().push(Seen::Proceeded);
        }

        fn denied(self, entity_id: EntityId) {
            self.seen.lock().push(Seen::Denied(entity_id));
        }
    }

    struct Fixture {
        gate: Arc<InteractionGate>,
        ownership: Arc<SimulationOwnership>,
        uplink: Receiver<ClientMessage>,
        seen: Arc<Mutex<Vec<Seen>>>,
    }

    impl Fixture {
        fn new(enforce: bool) -> Self {
            let (tx, uplink) = bounded(8);
            Self {
                gate: Arc::new(InteractionGate::new(enforce)),
                ownership: Arc::new(SimulationOwnership::new(ClientId(1), tx, &OwnershipConfig::default())),
                uplink,
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn ladder(&self, entity_id: EntityId) -> Ladder {
            Ladder {
                gate: Arc::clone(&self.gate),
                ownership: Arc::clone(&self.ownership),
                entity_id,
                seen: Arc::clone(&self.seen),
            }
        }

        fn click(&self, entity_id: Option<EntityId>) -> Interception {
            let target = entity_id.unwrap_or_else(|| EntityId::from_u128(0));
            self.gate
                .intercept(&self.ownership, entity_id, LockKind::Exclusive, self.ladder(target))
        }

        fn answer(&self, granted: bool) {
            let ClientMessage::LockRequest {
                request_id,
                entity_id,
                kind,
                ..
            } = self.uplink.try_recv().unwrap()
            else {
                panic!("expected a lock request");
            };
            self.ownership.handle_message(ServerMessage::LockResponse {
                request_id,
                entity_id,
                kind,
                granted,
            });
        }
    }

    #[test]
    fn test_grant_replays_action() {
        let fx = Fixture::new(true);
        let e = EntityId::from_u128(42);

        assert_eq!(fx.click(Some(e)), Interception::Deferred);
        assert!(fx.seen.lock().is_empty());

        fx.answer(true);
        assert_eq!(*fx.seen.lock(), vec![Seen::Proceeded]);
        assert!(!fx.gate.is_replaying(e));

        // Already ours: runs straight away.
        assert_eq!(fx.click(Some(e)), Interception::RunOriginal);
    }

    /// Handler that, while replaying, has another thread click a different entity.
    struct CrossThreadClick {
        gate: Arc<InteractionGate>,
        ownership: Arc<SimulationOwnership>,
        other: EntityId,
        observed: Arc<Mutex<Option<Interception>>>,
    }

    impl InteractionHandler for CrossThreadClick {
        fn proceed(self) {
            let outcome = std::thread::scope(|scope| {
                scope
                    .spawn(|| {
                        let handler = CrossThreadClick {
                            gate: Arc::clone(&self.gate),
                            ownership: Arc::clone(&self.ownership),
                            other: self.other,
                            observed: Arc::new(Mutex::new(None)),
                        };
                        self.gate
                            .intercept(&self.ownership, Some(self.other), LockKind::Exclusive, handler)
                    })
                    .join()
                    .unwrap()
            });
            *self.observed.lock() = Some(outcome);
        }

        fn denied(self, _entity_id: EntityId) {}
    }

    #[test]
    fn test_replay_does_not_unguard_other_threads() {
        let fx = Fixture::new(true);
        let replayed = EntityId::from_u128(46);
        let other = EntityId::from_u128(47);
        let observed = Arc::new(Mutex::new(None));

        let handler = CrossThreadClick {
            gate: Arc::clone(&fx.gate),
            ownership: Arc::clone(&fx.ownership),
            other,
            observed: Arc::clone(&observed),
        };
        assert_eq!(
            fx.gate
                .intercept(&fx.ownership, Some(replayed), LockKind::Exclusive, handler),
            Interception::Deferred
        );
        fx.answer(true);

        assert_eq!(*observed.lock(), Some(Interception::Deferred));
        match fx.uplink.try_recv().unwrap() {
            ClientMessage::LockRequest { entity_id, .. } => assert_eq!(entity_id, other),
            message => panic!("expected a lock request, got {message:?}"),
        }
        assert!(!fx.ownership.has_exclusive_lock(other));
        assert!(!fx.gate.is_replaying(replayed));
    }

    #[test]
    fn test_denial_gives_feedback() {
        let fx = Fixture::new(true);
        let e = EntityId::from_u128(43);

        assert_eq!(fx.click(Some(e)), Interception::Deferred);
        fx.answer(false);
        assert_eq!(*fx.seen.lock(), vec![Seen::Denied(e)]);
    }

    #[test]
    fn test_unguarded_paths_run_original() {
        let fx = Fixture::new(true);
        assert_eq!(fx.click(None), Interception::RunOriginal);

        let off = Fixture::new(false);
        assert_eq!(off.click(Some(EntityId::from_u128(44))), Interception::RunOriginal);
        assert!(off.uplink.try_recv().is_err());
    }

    #[test]
    fn test_end_interaction_downgrades_only_when_held() {
        let fx = Fixture::new(true);
        let e = EntityId::from_u128(45);

        assert!(!end_interaction(&fx.ownership, Some(e)));
        assert!(!end_interaction(&fx.ownership, None));

        fx.click(Some(e));
        fx.answer(true);
        assert!(end_interaction(&fx.ownership, Some(e)));
        assert!(!fx.ownership.has_exclusive_lock(e));
        assert_eq!(
            fx.uplink.try_recv().unwrap(),
            ClientMessage::LockRequest {
                request_id: None,
                entity_id: e,
                kind: LockKind::Transient,
                client: ClientId(1),
            }
        );
    }
}
