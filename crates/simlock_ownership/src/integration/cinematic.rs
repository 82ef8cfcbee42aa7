//! Cinematic interactions guarded by an exclusive lock.
//!
//! Starting a cinematic takes the entity's exclusive lock through the gate.
//! Ending it, naturally or from the failsafe, downgrades the lock.

use std::sync::Arc;

use parking_lot::Mutex;
use simlock_shared::{EntityId, DENIED_MESSAGE};

use crate::client::SimulationOwnership;
use crate::failsafe::WatchedInteraction;
use crate::integration::gate::end_interaction;
use crate::integration::traits::InteractionHandler;

/// A cinematic played by the local player on a networked entity.
#[derive(Debug)]
pub struct CinematicMode {
    ownership: Arc<SimulationOwnership>,
    entity_id: Option<EntityId>,
    label: String,
    active: bool,
    feedback: Option<&'static str>,
}

impl CinematicMode {
    /// Creates an inactive cinematic for `entity_id`.
    #[must_use]
    pub fn new(ownership: Arc<SimulationOwnership>, entity_id: Option<EntityId>, label: impl Into<String>) -> Self {
        Self {
            ownership,
            entity_id,
            label: label.into(),
            active: false,
            feedback: None,
        }
    }

    /// Target entity.
    #[must_use]
    pub const fn entity_id(&self) -> Option<EntityId> {
        self.entity_id
    }

    /// Starts playing.
    pub fn start(&mut self) {
        self.active = true;
        self.feedback = None;
    }

    /// Natural end: stops playing and downgrades the lock.
    pub fn end(&mut self) {
        self.active = false;
        end_interaction(&self.ownership, self.entity_id);
    }

    /// Records that another player holds the entity.
    pub fn deny(&mut self) {
        self.feedback = Some(DENIED_MESSAGE);
    }

    /// Last message shown to the player, if any.
    #[must_use]
    pub const fn feedback(&self) -> Option<&'static str> {
        self.feedback
    }
}

impl WatchedInteraction for CinematicMode {
    fn is_active(&self) -> bool {
        self.active
    }

    fn force_end(&mut self) {
        self.end();
    }

    fn describe(&self) -> String {
        match self.entity_id {
            Some(id) => format!("{} ({})", self.label, id),
            None => self.label.clone(),
        }
    }
}

/// Deferred "start cinematic" action for [`InteractionGate::intercept`].
///
/// The cinematic must not be locked by the caller while intercepting, since
/// a denial on a closed channel fires synchronously.
///
/// [`InteractionGate::intercept`]: crate::integration::InteractionGate::intercept
#[derive(Debug)]
pub struct CinematicStart(pub Arc<Mutex<CinematicMode>>);

impl InteractionHandler for CinematicStart {
    fn proceed(self) {
        self.0.lock().start();
    }

    fn denied(self, _entity_id: EntityId) {
        self.0.lock().deny();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OwnershipConfig;
    use crate::failsafe::{FailsafeMonitor, FailsafeOutcome};
    use crate::integration::{Interception, InteractionGate};
    use crossbeam_channel::bounded;
    use simlock_shared::{ClientId, ClientMessage, LockKind, ServerMessage};
    use std::time::{Duration, Instant};

    fn grant(ownership: &SimulationOwnership, entity_id: EntityId) {
        ownership.handle_message(ServerMessage::LockResponse {
            request_id: None,
            entity_id,
            kind: LockKind::Exclusive,
            granted: true,
        });
    }

    #[test]
    fn test_forced_end_downgrades_lock() {
        let (tx, rx) = bounded(8);
        let ownership = Arc::new(SimulationOwnership::new(ClientId(2), tx, &OwnershipConfig::default()));
        let e = EntityId::from_u128(12);
        grant(&ownership, e);

        let mut cinematic = CinematicMode::new(Arc::clone(&ownership), Some(e), "hatch");
        let mut monitor = FailsafeMonitor::new(Duration::from_secs(12));
        let t0 = Instant::now();

        cinematic.start();
        monitor.poll(&mut cinematic, t0);
        assert_eq!(monitor.poll(&mut cinematic, t0 + Duration::from_secs(12)), FailsafeOutcome::ForcedEnd);

        assert!(!cinematic.is_active());
        assert!(!ownership.has_exclusive_lock(e));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ClientMessage::LockRequest {
                request_id: None,
                kind: LockKind::Transient,
                ..
            }
        ));
    }

    #[test]
    fn test_start_through_gate() {
        let (tx, rx) = bounded(8);
        let ownership = Arc::new(SimulationOwnership::new(ClientId(2), tx, &OwnershipConfig::default()));
        let gate = Arc::new(InteractionGate::default());
        let e = EntityId::from_u128(13);
        let cinematic = Arc::new(Mutex::new(CinematicMode::new(Arc::clone(&ownership), Some(e), "ladder")));

        let outcome = gate.intercept(&ownership, Some(e), LockKind::Exclusive, CinematicStart(Arc::clone(&cinematic)));
        assert_eq!(outcome, Interception::Deferred);

        let ClientMessage::LockRequest { request_id, .. } = rx.try_recv().unwrap() else {
            panic!("expected a lock request");
        };
        ownership.handle_message(ServerMessage::LockResponse {
            request_id,
            entity_id: e,
            kind: LockKind::Exclusive,
            granted: false,
        });

        let cinematic = cinematic.lock();
        assert!(!cinematic.is_active());
        assert_eq!(cinematic.feedback(), Some(DENIED_MESSAGE));
    }

    #[test]
    fn test_describe_names_entity() {
        let (tx, _rx) = bounded(1);
        let ownership = Arc::new(SimulationOwnership::new(ClientId(2), tx, &OwnershipConfig::default()));
        let cinematic = CinematicMode::new(ownership, None, "lifepod");
        assert_eq!(cinematic.describe(), "lifepod");
    }
}
