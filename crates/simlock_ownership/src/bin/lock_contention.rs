//! # Lock Contention Run
//!
//! Many bots fighting over a few doors through a laggy wire. Fails if two
//! bots ever believe they hold the same door at once.
//!
//! ## Usage
//!
//! ```bash
//! lock_contention --bots 16 --entities 4 --ticks 3000 --latency 50 --jitter 20 --seed 42
//! lock_contention --config simlock.toml
//! ```

use std::time::Instant;

use simlock_ownership::simulation::{ContentionSimulation, NetworkConditions, SimulationConfig};
use simlock_ownership::OwnershipConfig;

fn main() {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         SIMLOCK - LOCK CONTENTION RUN                            ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    // Parse command line arguments (simple parsing, no external deps)
    let args: Vec<String> = std::env::args().collect();
    let mut config = SimulationConfig::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--bots" | "-b" => {
                config.bot_count = value.and_then(|v| v.parse().ok()).unwrap_or(config.bot_count);
                i += 1;
            }
            "--entities" | "-e" => {
                config.entity_count = value.and_then(|v| v.parse().ok()).unwrap_or(config.entity_count);
                i += 1;
            }
            "--ticks" | "-t" => {
                config.ticks = value.and_then(|v| v.parse().ok()).unwrap_or(config.ticks);
                i += 1;
            }
            "--latency" | "-l" => {
                config.network.base_latency_ms =
                    value.and_then(|v| v.parse().ok()).unwrap_or(config.network.base_latency_ms);
                i += 1;
            }
            "--jitter" | "-j" => {
                config.network.jitter_ms = value.and_then(|v| v.parse().ok()).unwrap_or(config.network.jitter_ms);
                i += 1;
            }
            "--poor" => config.network = NetworkConditions::POOR,
            "--seed" | "-s" => {
                config.seed = value.and_then(|v| v.parse().ok()).unwrap_or(config.seed);
                i += 1;
            }
            "--config" | "-c" => {
                if let Some(path) = value {
                    match OwnershipConfig::load(path) {
                        Ok(loaded) => config.ownership = loaded,
                        Err(err) => {
                            eprintln!("error: {err}");
                            std::process::exit(2);
                        }
                    }
                }
                i += 1;
            }
            "--help" | "-h" => {
                println!("Usage: lock_contention [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -b, --bots <NUM>         Number of bots (default: 16)");
                println!("  -e, --entities <NUM>     Number of contended entities (default: 4)");
                println!("  -t, --ticks <NUM>        Ticks to simulate, 16 ms each (default: 3000)");
                println!("  -l, --latency <MS>       One-way base latency (default: 50)");
                println!("  -j, --jitter <MS>        Latency jitter (default: 20)");
                println!("      --poor               Poor network preset");
                println!("  -s, --seed <NUM>         RNG seed (default: 42)");
                println!("  -c, --config <PATH>      Ownership config file (TOML)");
                println!("  -h, --help               Show this help");
                return;
            }
            _ => {}
        }
        i += 1;
    }

    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Bots:               {}", config.bot_count);
    println!("│ Entities:           {}", config.entity_count);
    println!("│ Ticks:              {} ({} ms each)", config.ticks, config.tick_ms);
    println!("│ Base Latency:       {} ms", config.network.base_latency_ms);
    println!("│ Jitter:             {} ms", config.network.jitter_ms);
    println!("│ Request Timeout:    {} ms", config.ownership.locks.request_timeout_ms);
    println!("│ Seed:               {}", config.seed);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let simulation = match ContentionSimulation::new(config) {
        Ok(simulation) => simulation,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };

    let start = Instant::now();
    let stats = simulation.run();
    let elapsed = start.elapsed();

    println!("┌─ RESULTS ───────────────────────────────────────────────────────┐");
    println!("│ Real Time:          {:.3} seconds", elapsed.as_secs_f64());
    println!("│ Requests:           {}", stats.requests);
    println!("│ Grants:             {}", stats.grants);
    println!("│ Denials:            {}", stats.denials);
    println!("│ Wire Messages:      {}", stats.messages);
    println!("│ Max Exclusive:      {} per entity", stats.max_simultaneous_exclusive);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    println!("┌─ GRANTS PER BOT ────────────────────────────────────────────────┐");
    for (bot, grants) in stats.per_bot_grants.iter().enumerate() {
        println!("│ Bot {bot:>3}:            {grants}");
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let exclusive_ok = stats.max_simultaneous_exclusive <= 1;
    let fairness_ok = stats.all_bots_granted();

    println!("╔══════════════════════════════════════════════════════════════════╗");
    if exclusive_ok && fairness_ok {
        println!("║  ✓ NO DOUBLE OWNERSHIP, EVERY BOT GOT A TURN                     ║");
    } else {
        if !exclusive_ok {
            println!("║  ✗ TWO BOTS HELD THE SAME ENTITY EXCLUSIVELY                     ║");
        }
        if !fairness_ok {
            println!("║  ✗ SOME BOTS WERE NEVER GRANTED A LOCK                           ║");
        }
    }
    println!("╚══════════════════════════════════════════════════════════════════╝");

    if !exclusive_ok {
        std::process::exit(1);
    }
}
