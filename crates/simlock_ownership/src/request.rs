//! # Lock Request Correlation
//!
//! Pairs every asynchronous lock request with exactly one response.
//!
//! ## Design
//!
//! ```text
//! submit(entity, kind, cb) ──► RequestId ──► wire
//!                                │
//!       ┌────────────────────────▼────────────────────┐
//!       │ PendingRequests                              │
//!       │   RequestId -> { entity, kind, waiters[] }   │
//!       │   (entity, kind) -> RequestId  (coalescing)  │
//!       └────────────────────────┬────────────────────┘
//!                                │
//! response(RequestId) ──► resolve ──► fire(granted) on every waiter, once
//! ```
//!
//! Entries are removed from the table BEFORE their callbacks run, so a
//! callback can never fire twice and can safely submit new requests.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use simlock_shared::{EntityId, LockKind, RequestId};

/// How many request timeouts an expired id is remembered for.
///
/// A response later than this is treated as unknown.
pub const ABANDONED_RETENTION: u32 = 12;

/// Type-erased completion callback: `(entity, granted)`.
pub type LockCallback = Box<dyn FnOnce(EntityId, bool) + Send + 'static>;

/// A pending ask for a lock, carrying caller context back to the callback.
///
/// The context is opaque to the arbiter; typically it names the game object
/// and the player that triggered the request.
pub struct LockRequest<C> {
    entity_id: EntityId,
    kind: LockKind,
    callback: Box<dyn FnOnce(EntityId, bool, C) + Send + 'static>,
    context: C,
}

impl<C: Send + 'static> LockRequest<C> {
    /// Creates a request whose `callback` receives `context` back.
    pub fn new<F>(entity_id: EntityId, kind: LockKind, callback: F, context: C) -> Self
    where
        F: FnOnce(EntityId, bool, C) + Send + 'static,
    {
        Self {
            entity_id,
            kind,
            callback: Box::new(callback),
            context,
        }
    }

    /// Target entity.
    #[must_use]
    pub const fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Requested lock kind.
    #[must_use]
    pub const fn kind(&self) -> LockKind {
        self.kind
    }

    /// Binds the context into the callback.
    #[must_use]
    pub fn into_callback(self) -> (EntityId, LockKind, LockCallback) {
        let Self {
            entity_id,
            kind,
            callback,
            context,
        } = self;
        (entity_id, kind, Box::new(move |id, granted| callback(id, granted, context)))
    }
}

impl<C> fmt::Debug for LockRequest<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRequest")
            .field("entity_id", &self.entity_id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`PendingRequests::submit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submission {
    /// A new entry was created; the request must go on the wire.
    New(RequestId),
    /// Joined an identical in-flight request; nothing to send.
    Coalesced(RequestId),
}

impl Submission {
    /// Correlation id of the entry the callback was attached to.
    #[must_use]
    pub const fn request_id(self) -> RequestId {
        match self {
            Self::New(id) | Self::Coalesced(id) => id,
        }
    }
}

/// Callbacks taken out of the table, ready to fire.
pub struct PendingResolution {
    /// Target entity.
    pub entity_id: EntityId,
    /// Requested lock kind.
    pub kind: LockKind,
    waiters: Vec<LockCallback>,
}

impl PendingResolution {
    /// Number of callbacks that will fire.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    /// Fires every callback once with the outcome.
    pub fn fire(self, granted: bool) {
        let entity_id = self.entity_id;
        for waiter in self.waiters {
            waiter(entity_id, granted);
        }
    }
}

impl fmt::Debug for PendingResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResolution")
            .field("entity_id", &self.entity_id)
            .field("kind", &self.kind)
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

struct PendingEntry {
    entity_id: EntityId,
    kind: LockKind,
    submitted_at: Instant,
    waiters: Vec<LockCallback>,
}

#[derive(Default)]
struct PendingInner {
    next_id: u64,
    entries: HashMap<RequestId, PendingEntry>,
    in_flight: HashMap<(EntityId, LockKind), RequestId>,
    /// Expired ids whose response may still arrive, with the expiry time.
    abandoned: HashMap<RequestId, Instant>,
}

impl PendingInner {
    fn take(&mut self, request_id: RequestId) -> Option<PendingResolution> {
        let entry = self.entries.remove(&request_id)?;
        self.in_flight.remove(&(entry.entity_id, entry.kind));
        Some(PendingResolution {
            entity_id: entry.entity_id,
            kind: entry.kind,
            waiters: entry.waiters,
        })
    }
}

/// Table of requests awaiting a response, keyed by correlation id.
#[derive(Default)]
pub struct PendingRequests {
    inner: Mutex<PendingInner>,
}

impl PendingRequests {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for `(entity_id, kind)`.
    ///
    /// Joins an identical in-flight request if there is one.
    pub fn submit(
        &self,
        entity_id: EntityId,
        kind: LockKind,
        callback: LockCallback,
        now: Instant,
    ) -> Submission {
        let mut inner = self.inner.lock();

        let existing = inner.in_flight.get(&(entity_id, kind)).copied();
        if let Some(request_id) = existing {
            if let Some(entry) = inner.entries.get_mut(&request_id) {
                entry.waiters.push(callback);
                return Submission::Coalesced(request_id);
            }
        }

        let request_id = RequestId(inner.next_id);
        inner.next_id = request_id.next().0;
        inner.entries.insert(
            request_id,
            PendingEntry {
                entity_id,
                kind,
                submitted_at: now,
                waiters: vec![callback],
            },
        );
        inner.in_flight.insert((entity_id, kind), request_id);
        Submission::New(request_id)
    }

    /// Removes the entry for `request_id` so its callbacks can fire.
    pub fn resolve(&self, request_id: RequestId) -> Option<PendingResolution> {
        self.inner.lock().take(request_id)
    }

    /// Returns true (once) if `request_id` was expired before its response arrived.
    pub fn take_abandoned(&self, request_id: RequestId) -> bool {
        self.inner.lock().abandoned.remove(&request_id).is_some()
    }

    /// Removes every entry older than `timeout`.
    ///
    /// The ids are remembered for [`ABANDONED_RETENTION`] timeouts so a late
    /// response can be recognised; older ones are forgotten here.
    pub fn expire(&self, now: Instant, timeout: Duration) -> Vec<(RequestId, PendingResolution)> {
        let mut inner = self.inner.lock();
        let retention = timeout.saturating_mul(ABANDONED_RETENTION);
        inner
            .abandoned
            .retain(|_, expired_at| now.saturating_duration_since(*expired_at) < retention);

        let overdue: Vec<RequestId> = inner
            .entries
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.submitted_at) >= timeout)
            .map(|(id, _)| *id)
            .collect();

        let mut expired = Vec::with_capacity(overdue.len());
        for request_id in overdue {
            if let Some(resolution) = inner.take(request_id) {
                inner.abandoned.insert(request_id, now);
                expired.push((request_id, resolution));
            }
        }
        expired.sort_unstable_by_key(|(id, _)| *id);
        expired
    }

    /// Removes every entry and forgets abandoned ids.
    pub fn drain(&self) -> Vec<PendingResolution> {
        let mut inner = self.inner.lock();
        inner.in_flight.clear();
        inner.abandoned.clear();
        inner
            .entries
            .drain()
            .map(|(_, e)| PendingResolution {
                entity_id: e.entity_id,
                kind: e.kind,
                waiters: e.waiters,
            })
            .collect()
    }

    /// Returns true if a request for `(entity_id, kind)` is in flight.
    #[must_use]
    pub fn is_in_flight(&self, entity_id: EntityId, kind: LockKind) -> bool {
        self.inner.lock().in_flight.contains_key(&(entity_id, kind))
    }

    /// Number of entries awaiting a response.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Number of expired ids still remembered.
    #[must_use]
    pub fn abandoned_len(&self) -> usize {
        self.inner.lock().abandoned.len()
    }

    /// Returns true if nothing is awaiting a response.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

impl fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PendingRequests")
            .field("entries", &inner.entries.len())
            .field("abandoned", &inner.abandoned.len())
            .finish()
    }
}
