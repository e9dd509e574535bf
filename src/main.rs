//! Headless race runner
//!
//! Minimal demo adapter around the simulation core: seed in, result record
//! out as JSON on stdout. Rendering, recording and notification layers hang
//! off the same accessors this loop uses.

use log::{info, warn};

use marble_derby::consts::SIM_DT;
use marble_derby::{RaceConfig, RaceSimulation};

/// Progress log cadence in steps (8 seconds of sim time at 60 Hz).
const PROGRESS_INTERVAL: u64 = 480;
/// Hard stop for a race that never finds the goal (sim seconds).
const MAX_RACE_SECONDS: f32 = 600.0;

fn main() {
    env_logger::init();

    let seed = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });

    let config = RaceConfig {
        rng_seed: seed,
        ..RaceConfig::default()
    };
    info!(
        "starting race: seed {seed}, {}x{} arena, {} marbles, complexity {:.2}",
        config.arena_width, config.arena_height, config.num_marbles, config.terrain_complexity
    );

    let mut race = match RaceSimulation::new(config) {
        Ok(race) => race,
        Err(err) => {
            eprintln!("race setup failed: {err}");
            std::process::exit(1);
        }
    };

    let mut steps: u64 = 0;
    while !race.is_finished() {
        race.update(SIM_DT);
        steps += 1;

        if steps.is_multiple_of(PROGRESS_INTERVAL) {
            info!("simulation time {:.1}s", race.sim_time());
        }
        if race.sim_time() > MAX_RACE_SECONDS {
            warn!("no winner after {MAX_RACE_SECONDS}s, stopping");
            break;
        }
    }

    match race.result() {
        Some(result) => {
            info!(
                "marble {} wins after {:.2}s",
                result.winner_index, result.sim_length_seconds
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&result).expect("result record serializes")
            );
        }
        None => {
            eprintln!("race ended without a winner");
            std::process::exit(2);
        }
    }
}
