//! # Contention Simulation
//!
//! Bots fighting over a handful of entities through a delayed wire.
//!
//! ## Features
//!
//! - Latency and jitter on both directions, order kept per direction
//! - Seeded randomness, so a run is reproducible
//! - Checks that no two bots ever believe they hold the same entity exclusively

mod bot;

pub use bot::{BotOutcome, BotState, BotTiming, ContentionBot};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simlock_shared::{ClientId, ClientMessage, EntityId, ServerMessage};

use crate::client::SimulationOwnership;
use crate::config::OwnershipConfig;
use crate::error::OwnershipResult;
use crate::server::LockAuthority;

/// Network conditions for simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkConditions {
    /// Base one-way latency in milliseconds.
    pub base_latency_ms: u32,
    /// Jitter (variance) in milliseconds.
    pub jitter_ms: u32,
}

impl NetworkConditions {
    /// Perfect network conditions (LAN).
    pub const PERFECT: Self = Self {
        base_latency_ms: 1,
        jitter_ms: 0,
    };

    /// Average network conditions (cable).
    pub const AVERAGE: Self = Self {
        base_latency_ms: 50,
        jitter_ms: 20,
    };

    /// Poor network conditions (mobile/wifi).
    pub const POOR: Self = Self {
        base_latency_ms: 150,
        jitter_ms: 80,
    };

    /// Draws a one-way latency.
    #[must_use]
    pub fn sample_latency<R: Rng>(&self, rng: &mut R) -> Duration {
        let base = i64::from(self.base_latency_ms);
        let jitter = i64::from(self.jitter_ms);
        let offset = if jitter > 0 { rng.gen_range(-jitter..=jitter) } else { 0 };
        Duration::from_millis(u64::try_from(base + offset).unwrap_or(0))
    }
}

impl Default for NetworkConditions {
    fn default() -> Self {
        Self::AVERAGE
    }
}

/// Configuration for a contention run.
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    /// Number of bots.
    pub bot_count: usize,
    /// Number of contended entities.
    pub entity_count: usize,
    /// Ticks to run.
    pub ticks: u64,
    /// Simulated time per tick in milliseconds.
    pub tick_ms: u64,
    /// Wire conditions.
    pub network: NetworkConditions,
    /// Bot timings.
    pub timing: BotTiming,
    /// RNG seed.
    pub seed: u64,
    /// Protocol settings.
    pub ownership: OwnershipConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            bot_count: 16,
            entity_count: 4,
            ticks: 3_000,
            tick_ms: 16,
            network: NetworkConditions::AVERAGE,
            timing: BotTiming {
                hold_ticks: (30, 90),
                cooldown_ticks: (5, 30),
            },
            seed: 42,
            ownership: OwnershipConfig::default(),
        }
    }
}

/// Results of a contention run.
#[derive(Clone, Debug, Default)]
pub struct SimulationStats {
    /// Ticks simulated.
    pub ticks: u64,
    /// Lock requests made by bots.
    pub requests: u64,
    /// Grants received by bots.
    pub grants: u64,
    /// Denials received by bots.
    pub denials: u64,
    /// Messages carried by the wire in both directions.
    pub messages: u64,
    /// Largest number of bots seen holding the same entity exclusively.
    pub max_simultaneous_exclusive: usize,
    /// Grants per bot.
    pub per_bot_grants: Vec<u64>,
}

impl SimulationStats {
    /// Returns true if every bot got a lock at least once.
    #[must_use]
    pub fn all_bots_granted(&self) -> bool {
        self.per_bot_grants.iter().all(|&g| g > 0)
    }
}

enum Envelope {
    Up(ClientId, ClientMessage),
    Down(ClientId, ServerMessage),
}

/// One-direction FIFO wire with latency.
struct DelayLine {
    queue: VecDeque<(u64, Envelope)>,
    last_due: u64,
}

impl DelayLine {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            last_due: 0,
        }
    }

    fn push(&mut self, due: u64, envelope: Envelope) {
        // Later messages never overtake earlier ones.
        self.last_due = self.last_due.max(due);
        self.queue.push_back((self.last_due, envelope));
    }

    fn pop_due(&mut self, tick: u64) -> Option<Envelope> {
        match self.queue.front() {
            Some((due, _)) if *due <= tick => self.queue.pop_front().map(|(_, e)| e),
            _ => None,
        }
    }
}

/// A contention run: one authority, many bots.
pub struct ContentionSimulation {
    config: SimulationConfig,
    authority: LockAuthority,
    bots: Vec<ContentionBot>,
    entities: Vec<EntityId>,
    outcomes_tx: Sender<BotOutcome>,
    outcomes_rx: Receiver<BotOutcome>,
    uplink: DelayLine,
    downlink: DelayLine,
    rng: StdRng,
    start: Instant,
    tick: u64,
    stats: SimulationStats,
}

impl ContentionSimulation {
    /// Sets up the authority, the bots and the entities.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the authority has no room
    /// for every bot.
    pub fn new(config: SimulationConfig) -> OwnershipResult<Self> {
        config.ownership.validate()?;
        config.timing.validate()?;
        let authority = LockAuthority::with_capacity(&config.ownership, config.bot_count);
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut bots = Vec::with_capacity(config.bot_count);
        for index in 0..config.bot_count {
            let client_id = authority.register_client()?;
            let (tx, rx) = bounded(config.ownership.transport.channel_capacity);
            let ownership = Arc::new(SimulationOwnership::new(client_id, tx, &config.ownership));
            bots.push(ContentionBot::new(index, ownership, rx));
        }

        let entities = (0..config.entity_count)
            .map(|_| EntityId::from_u128(rng.gen()))
            .collect();
        let (outcomes_tx, outcomes_rx) = unbounded();

        tracing::info!(
            "Contention simulation: {} bots, {} entities, {} ticks",
            config.bot_count,
            config.entity_count,
            config.ticks
        );

        Ok(Self {
            stats: SimulationStats {
                per_bot_grants: vec![0; config.bot_count],
                ..SimulationStats::default()
            },
            config,
            authority,
            bots,
            entities,
            outcomes_tx,
            outcomes_rx,
            uplink: DelayLine::new(),
            downlink: DelayLine::new(),
            rng,
            start: Instant::now(),
            tick: 0,
        })
    }

    /// Runs every configured tick and returns the results.
    pub fn run(mut self) -> SimulationStats {
        while self.tick < self.config.ticks {
            self.step();
        }
        for (slot, bot) in self.stats.per_bot_grants.iter_mut().zip(&self.bots) {
            *slot = bot.grants();
        }
        self.stats.ticks = self.tick;
        self.stats
    }

    /// Simulates one tick.
    pub fn step(&mut self) {
        let tick = self.tick;
        let now = self.start + Duration::from_millis(tick * self.config.tick_ms);

        // 1. Authority handles what reached it.
        while let Some(Envelope::Up(sender, message)) = self.uplink.pop_due(tick) {
            self.stats.messages += 1;
            if let Some(response) = self.authority.handle_from(sender, message, now) {
                let due = tick + self.latency_ticks();
                self.downlink.push(due, Envelope::Down(sender, response));
            }
        }
        self.authority.sweep(now);

        // 2. Clients handle what reached them; callbacks report outcomes.
        while let Some(Envelope::Down(client, message)) = self.downlink.pop_due(tick) {
            self.stats.messages += 1;
            if let Some(bot) = self.bots.get(usize::from(client.0)) {
                bot.ownership().handle_message(message);
            }
        }
        for bot in &self.bots {
            bot.ownership().expire_pending(now);
        }
        while let Ok((index, entity_id, granted)) = self.outcomes_rx.try_recv() {
            if granted {
                self.stats.grants += 1;
            } else {
                self.stats.denials += 1;
            }
            if let Some(bot) = self.bots.get_mut(index) {
                bot.on_outcome(tick, entity_id, granted, &self.config.timing, &mut self.rng);
            }
        }

        // 3. Bots act and their messages go on the wire.
        for i in 0..self.bots.len() {
            let requested = self.bots[i].act(
                tick,
                now,
                &self.entities,
                &self.config.timing,
                &self.outcomes_tx,
                &mut self.rng,
            );
            if requested {
                self.stats.requests += 1;
            }
            let sender = self.bots[i].ownership().client_id();
            for message in self.bots[i].drain_outbound() {
                let due = tick + self.latency_ticks();
                self.uplink.push(due, Envelope::Up(sender, message));
            }
        }

        // 4. Safety check on the clients' own view.
        for &entity_id in &self.entities {
            let holders = self
                .bots
                .iter()
                .filter(|b| b.ownership().has_exclusive_lock(entity_id))
                .count();
            self.stats.max_simultaneous_exclusive = self.stats.max_simultaneous_exclusive.max(holders);
        }

        self.tick += 1;
    }

    /// The authority.
    #[must_use]
    pub const fn authority(&self) -> &LockAuthority {
        &self.authority
    }

    /// The bots.
    #[must_use]
    pub fn bots(&self) -> &[ContentionBot] {
        &self.bots
    }

    /// Results so far.
    #[must_use]
    pub const fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    fn latency_ticks(&mut self) -> u64 {
        let latency = self.config.network.sample_latency(&mut self.rng);
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        ms.div_ceil(self.config.tick_ms.max(1))
    }
}

impl std::fmt::Debug for ContentionSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentionSimulation")
            .field("tick", &self.tick)
            .field("bots", &self.bots.len())
            .field("entities", &self.entities.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SimulationConfig {
        SimulationConfig {
            bot_count: 6,
            entity_count: 3,
            ticks: 2_000,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_latency_within_jitter() {
        let mut rng = StdRng::seed_from_u64(7);
        let network = NetworkConditions::AVERAGE;
        for _ in 0..100 {
            let ms = network.sample_latency(&mut rng).as_millis();
            assert!((30..=70).contains(&ms));
        }
        assert_eq!(NetworkConditions::PERFECT.sample_latency(&mut rng), Duration::from_millis(1));
    }

    #[test]
    fn test_delay_line_keeps_order() {
        let mut line = DelayLine::new();
        line.push(5, Envelope::Up(ClientId(0), ClientMessage::Release {
            entity_id: EntityId::from_u128(1),
            client: ClientId(0),
        }));
        line.push(2, Envelope::Up(ClientId(0), ClientMessage::Release {
            entity_id: EntityId::from_u128(2),
            client: ClientId(0),
        }));

        assert!(line.pop_due(4).is_none());
        let Some(Envelope::Up(_, first)) = line.pop_due(5) else {
            panic!("expected the first message");
        };
        assert_eq!(first.entity_id(), EntityId::from_u128(1));
        assert!(line.pop_due(5).is_some());
    }

    #[test]
    fn test_never_two_exclusive_holders() {
        let stats = ContentionSimulation::new(small()).unwrap().run();

        assert_eq!(stats.ticks, 2_000);
        assert!(stats.grants > 0);
        assert!(stats.denials > 0);
        assert_eq!(stats.max_simultaneous_exclusive, 1);
        assert!(stats.all_bots_granted(), "grants per bot: {:?}", stats.per_bot_grants);
    }

    #[test]
    fn test_requests_live_on_simulated_clock() {
        let mut simulation = ContentionSimulation::new(small()).unwrap();
        for _ in 0..2_000 {
            simulation.step();
        }

        // Round trips take a handful of ticks; nothing should come close to
        // the request timeout, however far simulated time has run ahead.
        for bot in simulation.bots() {
            let stats = bot.ownership().stats();
            assert_eq!(stats.expired, 0, "{stats:?}");
            assert!(stats.granted > 0);
        }
        // Bots end by downgrading, so a release can only be a late grant handed back.
        assert_eq!(simulation.authority().stats().releases, 0);
    }

    #[test]
    fn test_same_seed_same_run() {
        let a = ContentionSimulation::new(small()).unwrap().run();
        let b = ContentionSimulation::new(small()).unwrap().run();
        assert_eq!(a.per_bot_grants, b.per_bot_grants);
        assert_eq!(a.requests, b.requests);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimulationConfig {
            ownership: OwnershipConfig {
                transport: crate::config::TransportConfig { channel_capacity: 0 },
                ..OwnershipConfig::default()
            },
            ..small()
        };
        assert!(ContentionSimulation::new(config).is_err());

        let backwards = SimulationConfig {
            timing: BotTiming {
                hold_ticks: (30, 10),
                cooldown_ticks: (5, 30),
            },
            ..small()
        };
        assert!(matches!(
            ContentionSimulation::new(backwards),
            Err(crate::OwnershipError::InvalidConfig(_))
        ));
    }
}
