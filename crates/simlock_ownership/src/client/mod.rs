//! # Simulation Ownership (client side)
//!
//! The client-facing entry point of the lock protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   SIMULATION OWNERSHIP                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │ Call sites   │  │ Pending      │  │ Network      │      │
//! │  │ (main loop)  │──│ Requests     │──│ receipt path │      │
//! │  └──────────────┘  └──────────────┘  └──────────────┘      │
//! │         │                 │                 │               │
//! │         └────────────────┼─────────────────┘               │
//! │                          │                                  │
//! │              ┌───────────▼───────────┐                     │
//! │              │ Local view of held    │                     │
//! │              │ locks (fast path)     │                     │
//! │              └───────────────────────┘                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Requests never block. A call site asks for a lock, returns "handled" to
//! the engine, and replays the original action from inside the callback.
//! The callback runs on whichever thread processes the response.
//!
//! One instance per session, shared by `Arc` with every call-site adapter.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use simlock_shared::{ClientId, ClientMessage, EntityId, LockKind, RequestId, ServerMessage};

use crate::config::OwnershipConfig;
use crate::error::OwnershipResult;
use crate::request::{LockRequest, PendingRequests, Submission};

/// Counters describing what the arbiter has done so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArbiterStats {
    /// Requests put on the wire.
    pub requests_sent: u64,
    /// Requests that joined an identical in-flight request.
    pub coalesced: u64,
    /// Requests resolved locally without a round trip.
    pub fast_path: u64,
    /// Responses that granted a lock.
    pub granted: u64,
    /// Responses (or local failures) that denied a lock.
    pub denied: u64,
    /// Requests that timed out.
    pub expired: u64,
}

#[derive(Default)]
struct Counters {
    requests_sent: AtomicU64,
    coalesced: AtomicU64,
    fast_path: AtomicU64,
    granted: AtomicU64,
    denied: AtomicU64,
    expired: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn outcome(&self, granted: bool) {
        if granted {
            Self::bump(&self.granted);
        } else {
            Self::bump(&self.denied);
        }
    }

    fn snapshot(&self) -> ArbiterStats {
        ArbiterStats {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            fast_path: self.fast_path.load(Ordering::Relaxed),
            granted: self.granted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

/// One entry of the local view.
#[derive(Clone, Copy)]
struct HeldLock {
    kind: LockKind,
    /// First expiry pass that saw the entry as transient.
    transient_since: Option<Instant>,
}

impl HeldLock {
    const fn new(kind: LockKind) -> Self {
        Self {
            kind,
            transient_since: None,
        }
    }
}

/// Client-side lock arbiter.
pub struct SimulationOwnership {
    /// Our identity as assigned by the authority.
    client_id: ClientId,
    /// Locks this client believes it holds.
    held: Mutex<HashMap<EntityId, HeldLock>>,
    /// Requests awaiting a response.
    pending: PendingRequests,
    /// Channel towards the authority.
    outbound: Sender<ClientMessage>,
    /// How long to wait for a response.
    request_timeout: Duration,
    /// How long the authority keeps transient records.
    transient_grace: Duration,
    counters: Counters,
}

impl SimulationOwnership {
    /// Creates the arbiter for one session.
    #[must_use]
    pub fn new(client_id: ClientId, outbound: Sender<ClientMessage>, config: &OwnershipConfig) -> Self {
        Self {
            client_id,
            held: Mutex::new(HashMap::new()),
            pending: PendingRequests::new(),
            outbound,
            request_timeout: config.request_timeout(),
            transient_grace: config.transient_grace(),
            counters: Counters::default(),
        }
    }

    /// Returns our client id.
    #[inline]
    #[must_use]
    pub const fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Asks for a lock; the request's callback fires exactly once.
    ///
    /// Resolves synchronously if the local view already holds the requested
    /// kind. Otherwise the callback fires when the response is processed.
    pub fn request_simulation_lock<C: Send + 'static>(&self, request: LockRequest<C>) {
        self.request_simulation_lock_at(request, Instant::now());
    }

    /// Same as [`request_simulation_lock`](Self::request_simulation_lock) with an explicit clock.
    pub fn request_simulation_lock_at<C: Send + 'static>(&self, request: LockRequest<C>, now: Instant) {
        let (entity_id, kind, callback) = request.into_callback();

        if self.held_kind(entity_id) == Some(kind) {
            Counters::bump(&self.counters.fast_path);
            tracing::debug!("Fast path: {} already holds {} lock on {}", self.client_id, kind, entity_id);
            callback(entity_id, true);
            return;
        }

        match self.pending.submit(entity_id, kind, callback, now) {
            Submission::Coalesced(request_id) => {
                Counters::bump(&self.counters.coalesced);
                tracing::debug!("Joined in-flight request {} for {}", request_id.0, entity_id);
            }
            Submission::New(request_id) => {
                let message = ClientMessage::LockRequest {
                    request_id: Some(request_id),
                    entity_id,
                    kind,
                    client: self.client_id,
                };
                match self.outbound.try_send(message) {
                    Ok(()) => Counters::bump(&self.counters.requests_sent),
                    Err(err) => {
                        tracing::warn!("Could not send lock request for {}: {}", entity_id, err);
                        self.fail(request_id);
                    }
                }
            }
        }
    }

    /// Fire-and-forget request, used when an interaction ends naturally.
    ///
    /// Asking for [`LockKind::Transient`] on a held exclusive lock drops the
    /// exclusive claim from the local view immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be queued.
    pub fn request_simulation_lock_detached(&self, entity_id: EntityId, kind: LockKind) -> OwnershipResult<()> {
        if !kind.is_exclusive() {
            let mut held = self.held.lock();
            if let Some(lock) = held.get_mut(&entity_id) {
                if lock.kind.is_exclusive() {
                    *lock = HeldLock::new(LockKind::Transient);
                }
            }
        }

        self.outbound.try_send(ClientMessage::LockRequest {
            request_id: None,
            entity_id,
            kind,
            client: self.client_id,
        })?;
        Ok(())
    }

    /// Gives a lock back on normal completion of an interaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the release could not be queued.
    pub fn release_simulation_lock(&self, entity_id: EntityId) -> OwnershipResult<()> {
        self.held.lock().remove(&entity_id);
        self.outbound.try_send(ClientMessage::Release {
            entity_id,
            client: self.client_id,
        })?;
        Ok(())
    }

    /// Awaitable form of [`request_simulation_lock`](Self::request_simulation_lock).
    ///
    /// Resolves to `false` if the session is torn down first.
    pub fn request_lock_async(&self, entity_id: EntityId, kind: LockKind) -> impl Future<Output = bool> + Send + 'static {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.request_simulation_lock(LockRequest::new(
            entity_id,
            kind,
            |_, granted, tx: tokio::sync::oneshot::Sender<bool>| {
                let _ = tx.send(granted);
            },
            tx,
        ));
        async move { rx.await.unwrap_or(false) }
    }

    /// Returns true if this client holds an exclusive lock on `entity_id`.
    #[must_use]
    pub fn has_exclusive_lock(&self, entity_id: EntityId) -> bool {
        self.held_kind(entity_id) == Some(LockKind::Exclusive)
    }

    /// Returns the lock kind this client holds on `entity_id`.
    #[must_use]
    pub fn held_kind(&self, entity_id: EntityId) -> Option<LockKind> {
        self.held.lock().get(&entity_id).map(|lock| lock.kind)
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Applies one message from the authority.
    pub fn handle_message(&self, message: ServerMessage) {
        match message {
            ServerMessage::LockResponse {
                request_id: Some(request_id),
                entity_id,
                kind,
                granted,
            } => self.handle_response(request_id, entity_id, kind, granted),
            ServerMessage::LockResponse {
                request_id: None,
                entity_id,
                kind,
                granted,
            } => self.apply_outcome(entity_id, kind, granted),
            ServerMessage::LockRevoked { entity_id } => {
                if self.held.lock().remove(&entity_id).is_some() {
                    tracing::info!("Lock on {} revoked for {}", entity_id, self.client_id);
                }
            }
        }
    }

    /// Drains every message currently queued on `inbound`.
    ///
    /// Returns the number of messages handled.
    pub fn process_incoming(&self, inbound: &Receiver<ServerMessage>) -> usize {
        let mut handled = 0;
        while let Ok(message) = inbound.try_recv() {
            self.handle_message(message);
            handled += 1;
        }
        handled
    }

    /// Resolves requests older than the request timeout as denied, and
    /// forgets transient locks the authority has swept by now.
    ///
    /// Returns the number of requests expired.
    pub fn expire_pending(&self, now: Instant) -> usize {
        self.prune_transient(now);
        let expired = self.pending.expire(now, self.request_timeout);
        let count = expired.len();
        for (request_id, resolution) in expired {
            tracing::warn!(
                "Lock request {} for {} timed out after {:?}",
                request_id.0,
                resolution.entity_id,
                self.request_timeout
            );
            Counters::bump(&self.counters.expired);
            Counters::bump(&self.counters.denied);
            resolution.fire(false);
        }
        count
    }

    /// Ends the session: every pending callback fires as denied and the
    /// local view is cleared.
    ///
    /// Returns the number of callbacks fired.
    pub fn shutdown(&self) -> usize {
        self.held.lock().clear();
        let mut fired = 0;
        for resolution in self.pending.drain() {
            fired += resolution.waiter_count();
            resolution.fire(false);
        }
        if fired > 0 {
            tracing::info!("{} shut down with {} pending lock callbacks", self.client_id, fired);
        }
        fired
    }

    /// Returns the arbiter counters.
    #[must_use]
    pub fn stats(&self) -> ArbiterStats {
        self.counters.snapshot()
    }

    fn handle_response(&self, request_id: RequestId, entity_id: EntityId, kind: LockKind, granted: bool) {
        if let Some(resolution) = self.pending.resolve(request_id) {
            self.apply_outcome(entity_id, kind, granted);
            self.counters.outcome(granted);
            resolution.fire(granted);
            return;
        }

        if self.pending.take_abandoned(request_id) {
            if granted {
                tracing::warn!("Late grant for expired request {} on {}, releasing", request_id.0, entity_id);
                if let Err(err) = self.outbound.try_send(ClientMessage::Release {
                    entity_id,
                    client: self.client_id,
                }) {
                    tracing::warn!("Could not release late grant on {}: {}", entity_id, err);
                }
            }
            return;
        }

        tracing::debug!("Ignoring response for unknown request {}", request_id.0);
    }

    fn apply_outcome(&self, entity_id: EntityId, kind: LockKind, granted: bool) {
        let mut held = self.held.lock();
        if granted {
            held.insert(entity_id, HeldLock::new(kind));
        } else if held.get(&entity_id).is_some_and(|lock| !lock.kind.is_exclusive()) {
            held.remove(&entity_id);
        }
    }

    /// Transient entries go once a full grace period has passed since an
    /// expiry pass first saw them.
    fn prune_transient(&self, now: Instant) {
        let grace = self.transient_grace;
        self.held.lock().retain(|_, lock| {
            if lock.kind.is_exclusive() {
                return true;
            }
            let since = *lock.transient_since.get_or_insert(now);
            now.saturating_duration_since(since) < grace
        });
    }

    fn fail(&self, request_id: RequestId) {
        if let Some(resolution) = self.pending.resolve(request_id) {
            Counters::bump(&self.counters.denied);
            resolution.fire(false);
        }
    }
}

impl std::fmt::Debug for SimulationOwnership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationOwnership")
            .field("client_id", &self.client_id)
            .field("held", &self.held.lock().len())
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    const ME: ClientId = ClientId(3);

    fn arbiter(capacity: usize) -> (SimulationOwnership, Receiver<ClientMessage>) {
        let (tx, rx) = bounded(capacity);
        (SimulationOwnership::new(ME, tx, &OwnershipConfig::default()), rx)
    }

    fn recording(log: &Arc<Mutex<Vec<bool>>>) -> impl FnOnce(EntityId, bool, ()) + Send + 'static {
        let log = Arc::clone(log);
        move |_, granted, ()| log.lock().push(granted)
    }

    fn sent_request_id(rx: &Receiver<ClientMessage>) -> RequestId {
        match rx.try_recv().unwrap() {
            ClientMessage::LockRequest {
                request_id: Some(id), ..
            } => id,
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_request_then_grant() {
        let (ownership, rx) = arbiter(8);
        let log = Arc::new(Mutex::new(Vec::new()));
        let e = EntityId::from_u128(1);

        ownership.request_simulation_lock(LockRequest::new(e, LockKind::Exclusive, recording(&log), ()));
        assert!(log.lock().is_empty());
        assert_eq!(ownership.pending_count(), 1);

        let id = sent_request_id(&rx);
        ownership.handle_message(ServerMessage::LockResponse {
            request_id: Some(id),
            entity_id: e,
            kind: LockKind::Exclusive,
            granted: true,
        });

        assert_eq!(*log.lock(), vec![true]);
        assert!(ownership.has_exclusive_lock(e));
        assert_eq!(ownership.pending_count(), 0);
    }

    #[test]
    fn test_denied_does_not_take_lock() {
        let (ownership, rx) = arbiter(8);
        let log = Arc::new(Mutex::new(Vec::new()));
        let e = EntityId::from_u128(2);

        ownership.request_simulation_lock(LockRequest::new(e, LockKind::Exclusive, recording(&log), ()));
        let id = sent_request_id(&rx);
        ownership.handle_message(ServerMessage::LockResponse {
            request_id: Some(id),
            entity_id: e,
            kind: LockKind::Exclusive,
            granted: false,
        });
        // Duplicate delivery must not fire again.
        ownership.handle_message(ServerMessage::LockResponse {
            request_id: Some(id),
            entity_id: e,
            kind: LockKind::Exclusive,
            granted: true,
        });

        assert_eq!(*log.lock(), vec![false]);
        assert!(!ownership.has_exclusive_lock(e));
        assert_eq!(ownership.stats().denied, 1);
    }

    #[test]
    fn test_fast_path_fires_synchronously() {
        let (ownership, rx) = arbiter(8);
        let log = Arc::new(Mutex::new(Vec::new()));
        let e = EntityId::from_u128(3);

        ownership.handle_message(ServerMessage::LockResponse {
            request_id: None,
            entity_id: e,
            kind: LockKind::Exclusive,
            granted: true,
        });
        ownership.request_simulation_lock(LockRequest::new(e, LockKind::Exclusive, recording(&log), ()));

        assert_eq!(*log.lock(), vec![true]);
        assert!(rx.try_recv().is_err());
        assert_eq!(ownership.stats().fast_path, 1);
    }

    #[test]
    fn test_duplicate_requests_share_one_message() {
        let (ownership, rx) = arbiter(8);
        let fired = Arc::new(AtomicUsize::new(0));
        let e = EntityId::from_u128(4);

        for _ in 0..3 {
            let fired = Arc::clone(&fired);
            ownership.request_simulation_lock(LockRequest::new(
                e,
                LockKind::Exclusive,
                move |_, _, ()| {
                    fired.fetch_add(1, Ordering::SeqCst);
                },
                (),
            ));
        }

        let id = sent_request_id(&rx);
        assert!(rx.try_recv().is_err());
        ownership.handle_message(ServerMessage::LockResponse {
            request_id: Some(id),
            entity_id: e,
            kind: LockKind::Exclusive,
            granted: true,
        });

        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert_eq!(ownership.stats().coalesced, 2);
    }

    #[test]
    fn test_closed_channel_denies() {
        let (ownership, rx) = arbiter(8);
        drop(rx);
        let log = Arc::new(Mutex::new(Vec::new()));
        let e = EntityId::from_u128(5);

        ownership.request_simulation_lock(LockRequest::new(e, LockKind::Exclusive, recording(&log), ()));

        assert_eq!(*log.lock(), vec![false]);
        assert_eq!(ownership.pending_count(), 0);
        assert_eq!(
            ownership.request_simulation_lock_detached(e, LockKind::Transient),
            Err(crate::OwnershipError::ChannelClosed)
        );
    }

    #[test]
    fn test_detached_transient_drops_exclusive_immediately() {
        let (ownership, rx) = arbiter(8);
        let e = EntityId::from_u128(6);

        ownership.handle_message(ServerMessage::LockResponse {
            request_id: None,
            entity_id: e,
            kind: LockKind::Exclusive,
            granted: true,
        });
        ownership.request_simulation_lock_detached(e, LockKind::Transient).unwrap();

        assert!(!ownership.has_exclusive_lock(e));
        assert_eq!(ownership.held_kind(e), Some(LockKind::Transient));
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientMessage::LockRequest {
                request_id: None,
                entity_id: e,
                kind: LockKind::Transient,
                client: ME,
            }
        );
    }

    #[test]
    fn test_expired_request_releases_late_grant() {
        let (ownership, rx) = arbiter(8);
        let log = Arc::new(Mutex::new(Vec::new()));
        let e = EntityId::from_u128(7);
        let t0 = Instant::now();

        ownership.request_simulation_lock_at(LockRequest::new(e, LockKind::Exclusive, recording(&log), ()), t0);
        let id = sent_request_id(&rx);

        assert_eq!(ownership.expire_pending(t0 + Duration::from_secs(1)), 0);
        assert_eq!(ownership.expire_pending(t0 + Duration::from_secs(6)), 1);
        assert_eq!(*log.lock(), vec![false]);

        ownership.handle_message(ServerMessage::LockResponse {
            request_id: Some(id),
            entity_id: e,
            kind: LockKind::Exclusive,
            granted: true,
        });

        assert_eq!(*log.lock(), vec![false]);
        assert!(!ownership.has_exclusive_lock(e));
        assert_eq!(rx.try_recv().unwrap(), ClientMessage::Release { entity_id: e, client: ME });
    }

    #[test]
    fn test_revocation_clears_local_view() {
        let (ownership, _rx) = arbiter(8);
        let e = EntityId::from_u128(8);

        ownership.handle_message(ServerMessage::LockResponse {
            request_id: None,
            entity_id: e,
            kind: LockKind::Exclusive,
            granted: true,
        });
        ownership.handle_message(ServerMessage::LockRevoked { entity_id: e });

        assert_eq!(ownership.held_kind(e), None);
    }

    #[test]
    fn test_shutdown_denies_pending() {
        let (ownership, _rx) = arbiter(8);
        let log = Arc::new(Mutex::new(Vec::new()));

        ownership.request_simulation_lock(LockRequest::new(
            EntityId::from_u128(9),
            LockKind::Exclusive,
            recording(&log),
            (),
        ));
        ownership.request_simulation_lock(LockRequest::new(
            EntityId::from_u128(10),
            LockKind::Exclusive,
            recording(&log),
            (),
        ));

        assert_eq!(ownership.shutdown(), 2);
        assert_eq!(*log.lock(), vec![false, false]);
        assert_eq!(ownership.pending_count(), 0);
    }

    #[test]
    fn test_transient_view_pruned_after_grace() {
        let (ownership, _rx) = arbiter(8);
        let kept = EntityId::from_u128(12);
        let faded = EntityId::from_u128(13);
        let t0 = Instant::now();

        for (entity_id, kind) in [(kept, LockKind::Exclusive), (faded, LockKind::Transient)] {
            ownership.handle_message(ServerMessage::LockResponse {
                request_id: None,
                entity_id,
                kind,
                granted: true,
            });
        }

        ownership.expire_pending(t0);
        ownership.expire_pending(t0 + Duration::from_millis(1_999));
        assert_eq!(ownership.held_kind(faded), Some(LockKind::Transient));

        ownership.expire_pending(t0 + Duration::from_secs(2));
        assert_eq!(ownership.held_kind(faded), None);
        assert!(ownership.has_exclusive_lock(kept));
    }

    #[test]
    fn test_callback_may_reenter() {
        let (tx, rx) = bounded(8);
        let ownership = Arc::new(SimulationOwnership::new(ME, tx, &OwnershipConfig::default()));
        let e = EntityId::from_u128(11);
        let observed = Arc::new(Mutex::new(None));

        let inner = Arc::clone(&ownership);
        let sink = Arc::clone(&observed);
        ownership.request_simulation_lock(LockRequest::new(
            e,
            LockKind::Exclusive,
            move |id, _, ()| {
                *sink.lock() = Some(inner.has_exclusive_lock(id));
            },
            (),
        ));

        let id = sent_request_id(&rx);
        ownership.handle_message(ServerMessage::LockResponse {
            request_id: Some(id),
            entity_id: e,
            kind: LockKind::Exclusive,
            granted: true,
        });

        assert_eq!(*observed.lock(), Some(true));
    }
}
