//! # Failsafe Monitor
//!
//! Force-ends an interaction that has been running for too long, so a
//! client stuck in a cinematic cannot hold an exclusive lock forever.
//!
//! ```text
//!  IDLE ──(interaction active)──► ACTIVE(started_at)
//!   ▲                                │
//!   ├──(interaction ends)────────────┤
//!   └──(now - started_at >= max)─────┘  force_end + one warning
//! ```
//!
//! Polled once per tick. Never blocks.

use std::time::{Duration, Instant};

use crate::config::OwnershipConfig;

/// Something the failsafe can watch and terminate.
pub trait WatchedInteraction {
    /// Returns true while the interaction is running.
    fn is_active(&self) -> bool;

    /// Ends the interaction through its normal end path.
    fn force_end(&mut self);

    /// Human-readable name for log messages.
    fn describe(&self) -> String;
}

/// Monitor state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailsafeState {
    /// Nothing is being watched.
    #[default]
    Idle,
    /// An interaction has been running since `started_at`.
    Active {
        /// First poll that saw the interaction active.
        started_at: Instant,
    },
}

/// Result of one [`FailsafeMonitor::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailsafeOutcome {
    /// The interaction is not running.
    Idle,
    /// The interaction is running within its time limit.
    Watching,
    /// The interaction overran and was force-ended.
    ForcedEnd,
}

/// Per-interaction stuck-state watchdog.
#[derive(Debug)]
pub struct FailsafeMonitor {
    state: FailsafeState,
    max_duration: Duration,
    warned: bool,
    warnings_emitted: u64,
    forced_ends: u64,
}

impl FailsafeMonitor {
    /// Creates an idle monitor.
    #[must_use]
    pub const fn new(max_duration: Duration) -> Self {
        Self {
            state: FailsafeState::Idle,
            max_duration,
            warned: false,
            warnings_emitted: 0,
            forced_ends: 0,
        }
    }

    /// Creates an idle monitor using `failsafe.max_cinematic_ms`.
    #[must_use]
    pub const fn from_config(config: &OwnershipConfig) -> Self {
        Self::new(config.max_cinematic_duration())
    }

    /// Checks `interaction` once.
    pub fn poll<W: WatchedInteraction + ?Sized>(&mut self, interaction: &mut W, now: Instant) -> FailsafeOutcome {
        if !interaction.is_active() {
            self.state = FailsafeState::Idle;
            self.warned = false;
            return FailsafeOutcome::Idle;
        }

        let started_at = match self.state {
            FailsafeState::Idle => {
                self.state = FailsafeState::Active { started_at: now };
                return FailsafeOutcome::Watching;
            }
            FailsafeState::Active { started_at } => started_at,
        };

        if now.saturating_duration_since(started_at) < self.max_duration {
            return FailsafeOutcome::Watching;
        }

        // One warning per stuck episode, even if the end path does not stick.
        if !self.warned {
            tracing::warn!(
                "Force ending stuck interaction {} after {:?}",
                interaction.describe(),
                self.max_duration
            );
            self.warned = true;
            self.warnings_emitted += 1;
        }

        interaction.force_end();
        self.forced_ends += 1;
        self.state = FailsafeState::Idle;
        FailsafeOutcome::ForcedEnd
    }

    /// Forgets any running interaction, as when the host component is disabled.
    pub fn reset(&mut self) {
        self.state = FailsafeState::Idle;
        self.warned = false;
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> FailsafeState {
        self.state
    }

    /// Configured time limit.
    #[must_use]
    pub const fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Number of warnings logged so far.
    #[must_use]
    pub const fn warnings_emitted(&self) -> u64 {
        self.warnings_emitted
    }

    /// Number of forced ends so far.
    #[must_use]
    pub const fn forced_ends(&self) -> u64 {
        self.forced_ends
    }
}
