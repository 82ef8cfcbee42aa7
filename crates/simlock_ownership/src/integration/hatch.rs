//! Local auto-expiring hold, used on dive hatches while a cinematic plays.
//!
//! Purely client-side; the authority never sees it.

use std::time::{Duration, Instant};

use crate::config::OwnershipConfig;

/// A hold that releases itself after a fixed time.
#[derive(Clone, Copy, Debug)]
pub struct TimedLocalLock {
    default_duration: Duration,
    unlock_at: Option<Instant>,
}

impl TimedLocalLock {
    /// Creates an unlocked hold with the given default duration.
    #[must_use]
    pub const fn new(default_duration: Duration) -> Self {
        Self {
            default_duration,
            unlock_at: None,
        }
    }

    /// Creates an unlocked hold using `hatch.lock_ms`.
    #[must_use]
    pub const fn from_config(config: &OwnershipConfig) -> Self {
        Self::new(config.hatch_lock_duration())
    }

    /// Locks for the default duration.
    pub fn lock(&mut self, now: Instant) {
        self.lock_for(now, self.default_duration);
    }

    /// Locks for `duration`, replacing any running hold.
    pub fn lock_for(&mut self, now: Instant, duration: Duration) {
        self.unlock_at = Some(now + duration);
    }

    /// Unlocks at once.
    pub fn unlock(&mut self) {
        self.unlock_at = None;
    }

    /// Per-tick update. Returns true if the hold expired on this tick.
    pub fn update(&mut self, now: Instant) -> bool {
        match self.unlock_at {
            Some(at) if now >= at => {
                self.unlock_at = None;
                true
            }
            _ => false,
        }
    }

    /// Returns true while held.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.unlock_at.is_some()
    }
}

impl Default for TimedLocalLock {
    fn default() -> Self {
        Self::from_config(&OwnershipConfig::default())
    }
}
