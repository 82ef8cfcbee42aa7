//! Contending bot: requests a random entity, holds it for a while, lets go.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use rand::Rng;
use simlock_shared::{ClientMessage, EntityId, LockKind};

use crate::client::SimulationOwnership;
use crate::error::{OwnershipError, OwnershipResult};
use crate::integration::end_interaction;
use crate::request::LockRequest;

/// Lock outcome reported by a bot's callback: `(bot, entity, granted)`.
pub type BotOutcome = (usize, EntityId, bool);

/// Tick ranges a bot draws its timings from (inclusive).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BotTiming {
    /// How long an interaction lasts.
    pub hold_ticks: (u64, u64),
    /// How long a bot waits before asking again.
    pub cooldown_ticks: (u64, u64),
}

impl BotTiming {
    /// Checks that both ranges are non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::InvalidConfig`] if a range ends before it starts.
    pub fn validate(&self) -> OwnershipResult<()> {
        for (name, (lo, hi)) in [("hold_ticks", self.hold_ticks), ("cooldown_ticks", self.cooldown_ticks)] {
            if lo > hi {
                return Err(OwnershipError::InvalidConfig(format!(
                    "{name} range {lo}..={hi} is empty"
                )));
            }
        }
        Ok(())
    }

    fn hold<R: Rng>(&self, rng: &mut R) -> u64 {
        rng.gen_range(self.hold_ticks.0..=self.hold_ticks.1)
    }

    fn cooldown<R: Rng>(&self, rng: &mut R) -> u64 {
        rng.gen_range(self.cooldown_ticks.0..=self.cooldown_ticks.1)
    }
}

/// What a bot is doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotState {
    /// Waiting until `until` before asking again.
    Idle {
        /// Tick at which the bot acts again.
        until: u64,
    },
    /// A request is in flight.
    Waiting,
    /// Holding an exclusive lock.
    Holding {
        /// Held entity.
        entity_id: EntityId,
        /// Tick at which the interaction ends.
        until: u64,
    },
}

/// One simulated player.
#[derive(Debug)]
pub struct ContentionBot {
    index: usize,
    ownership: Arc<SimulationOwnership>,
    outbound: Receiver<ClientMessage>,
    state: BotState,
    grants: u64,
    denials: u64,
}

impl ContentionBot {
    /// Creates an idle bot. `outbound` is the receiving end of its arbiter's channel.
    #[must_use]
    pub fn new(index: usize, ownership: Arc<SimulationOwnership>, outbound: Receiver<ClientMessage>) -> Self {
        Self {
            index,
            ownership,
            outbound,
            state: BotState::Idle { until: 0 },
            grants: 0,
            denials: 0,
        }
    }

    /// The bot's arbiter.
    #[must_use]
    pub const fn ownership(&self) -> &Arc<SimulationOwnership> {
        &self.ownership
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> BotState {
        self.state
    }

    /// Grants received so far.
    #[must_use]
    pub const fn grants(&self) -> u64 {
        self.grants
    }

    /// Denials received so far.
    #[must_use]
    pub const fn denials(&self) -> u64 {
        self.denials
    }

    /// Advances the bot by one tick. `now` is the simulated time of `tick`.
    ///
    /// Returns true if a lock request was made.
    pub fn act<R: Rng>(
        &mut self,
        tick: u64,
        now: Instant,
        entities: &[EntityId],
        timing: &BotTiming,
        outcomes: &Sender<BotOutcome>,
        rng: &mut R,
    ) -> bool {
        match self.state {
            BotState::Idle { until } if tick >= until && !entities.is_empty() => {
                let entity_id = entities[rng.gen_range(0..entities.len())];
                let sink = outcomes.clone();
                self.state = BotState::Waiting;
                self.ownership.request_simulation_lock_at(
                    LockRequest::new(
                        entity_id,
                        LockKind::Exclusive,
                        move |id, granted, bot: usize| {
                            let _ = sink.send((bot, id, granted));
                        },
                        self.index,
                    ),
                    now,
                );
                true
            }
            BotState::Holding { entity_id, until } if tick >= until => {
                end_interaction(&self.ownership, Some(entity_id));
                self.state = BotState::Idle {
                    until: tick + timing.cooldown(rng),
                };
                false
            }
            _ => false,
        }
    }

    /// Applies the outcome of the bot's last request.
    pub fn on_outcome<R: Rng>(
        &mut self,
        tick: u64,
        entity_id: EntityId,
        granted: bool,
        timing: &BotTiming,
        rng: &mut R,
    ) {
        if granted {
            self.grants += 1;
            self.state = BotState::Holding {
                entity_id,
                until: tick + timing.hold(rng),
            };
        } else {
            self.denials += 1;
            self.state = BotState::Idle {
                until: tick + timing.cooldown(rng),
            };
        }
    }

    /// Takes every message the bot's arbiter has queued.
    pub fn drain_outbound(&self) -> Vec<ClientMessage> {
        self.outbound.try_iter().collect()
    }
}
