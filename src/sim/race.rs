//! Race orchestration: terrain selection, marble spawning, the fixed-step
//! update loop and win detection
//!
//! The manager owns one terrain obstacle, one spawn/goal zone pair and the
//! marble list for the lifetime of a race. Construction either yields a
//! playable race or a typed error; once running, `update` cannot fail and
//! the only remaining transition is into `Finished`.

use glam::Vec2;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use thiserror::Error;

use super::collision::{
    apply_anti_stall, resolve_boundary, resolve_marble_collisions, resolve_terrain_collision,
};
use super::marble::{Marble, marble_colors};
use super::terrain::{TerrainGenerator, TerrainObstacle};
use super::zones::{Zone, ZoneValidator};
use crate::config::{ConfigError, RaceConfig};
use crate::consts::{COUNTDOWN_SECONDS, MARBLE_RADIUS, MARBLE_SPEED, TERRAIN_ATTEMPTS};
use crate::heading_to_vec;
use crate::rng::RaceRng;

/// Attempts per marble to find a spawn position clear of its siblings
/// before falling back to the deterministic ring layout.
const SPAWN_PLACEMENT_ATTEMPTS: usize = 50;
/// Minimum center distance between spawned marbles, in marble radii.
const SPAWN_SEPARATION_FACTOR: f32 = 2.5;

/// The fixed candidate batch ran dry without a playable terrain. Fatal for
/// this construction attempt; retry with a different seed or complexity.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no terrain candidate out of {attempts} produced valid spawn/goal zones")]
    Exhausted { attempts: usize },
}

/// Anything that can stop a race from being constructed.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Race lifecycle. Transitions only ever move rightward:
/// `Countdown -> Running -> Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RacePhase {
    Countdown,
    Running,
    Finished,
}

/// Queryable record of a finished race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceResult {
    /// Wall-clock construction time (unix millis); never feeds the sim
    pub timestamp_ms: u64,
    pub seed: u64,
    pub winner_index: usize,
    pub sim_length_seconds: f32,
}

/// The simulation manager.
pub struct RaceSimulation {
    config: RaceConfig,
    rng: RaceRng,
    terrain: TerrainObstacle,
    spawn_zone: Zone,
    goal_zone: Zone,
    marbles: Vec<Marble>,
    sim_time: f32,
    step_count: u64,
    phase: RacePhase,
    winner: Option<usize>,
    timestamp_ms: u64,
}

impl RaceSimulation {
    /// Validate the configuration, pick a playable terrain out of a fixed
    /// candidate batch, and set up the starting grid.
    ///
    /// Every candidate gets its own sub-seed, all drawn from the master
    /// stream up front, so how many candidates validation rejects has no
    /// effect on any later random draw.
    pub fn new(config: RaceConfig) -> Result<Self, SetupError> {
        config.validate()?;
        let mut rng = RaceRng::new(config.rng_seed);

        let generator = TerrainGenerator::new(
            config.arena_width,
            config.arena_height,
            config.terrain_complexity,
        );
        let mut candidate_rngs: Vec<RaceRng> =
            (0..TERRAIN_ATTEMPTS).map(|_| rng.split()).collect();

        let validator =
            ZoneValidator::new(config.arena_width, config.arena_height, MARBLE_RADIUS);

        let mut selected = None;
        for (index, candidate_rng) in candidate_rngs.iter_mut().enumerate() {
            let terrain = generator.generate(candidate_rng);
            match validator.find_zones(&terrain) {
                Some((spawn, goal)) => {
                    info!(
                        "terrain candidate {}/{TERRAIN_ATTEMPTS} accepted",
                        index + 1
                    );
                    selected = Some((terrain, spawn, goal));
                    break;
                }
                None => debug!(
                    "terrain candidate {}/{TERRAIN_ATTEMPTS} rejected: no valid zones",
                    index + 1
                ),
            }
        }

        let Some((terrain, spawn_zone, goal_zone)) = selected else {
            return Err(GenerationError::Exhausted {
                attempts: TERRAIN_ATTEMPTS,
            }
            .into());
        };

        let marbles = spawn_marbles(&spawn_zone, config.num_marbles, &mut rng);
        let timestamp_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Ok(Self {
            config,
            rng,
            terrain,
            spawn_zone,
            goal_zone,
            marbles,
            sim_time: -COUNTDOWN_SECONDS,
            step_count: 0,
            phase: RacePhase::Countdown,
            winner: None,
            timestamp_ms,
        })
    }

    /// Assemble a race from pre-built parts, skipping generation and the
    /// countdown. For synthetic scenarios and deterministic replay harnesses.
    pub fn from_parts(
        config: RaceConfig,
        terrain: TerrainObstacle,
        spawn_zone: Zone,
        goal_zone: Zone,
        marbles: Vec<Marble>,
    ) -> Self {
        let rng = RaceRng::new(config.rng_seed);
        Self {
            config,
            rng,
            terrain,
            spawn_zone,
            goal_zone,
            marbles,
            sim_time: 0.0,
            step_count: 0,
            phase: RacePhase::Running,
            winner: None,
            timestamp_ms: 0,
        }
    }

    /// Advance one fixed timestep.
    ///
    /// Countdown ticks only the clock. Running advances every marble,
    /// resolves terrain then boundary then marble-marble collisions, runs
    /// the anti-stall sweep, and win-checks marbles in stable index order.
    /// Finished is terminal: further calls are no-ops.
    pub fn update(&mut self, dt: f32) {
        if self.phase == RacePhase::Finished {
            return;
        }

        self.sim_time += dt;
        if self.sim_time < 0.0 {
            return;
        }
        if self.phase == RacePhase::Countdown {
            self.phase = RacePhase::Running;
            info!("countdown over, race running");
        }
        self.step_count += 1;

        for marble in &mut self.marbles {
            marble.advance(dt);
        }
        for marble in &mut self.marbles {
            resolve_terrain_collision(marble, &self.terrain);
            resolve_boundary(marble, self.config.arena_width, self.config.arena_height);
        }
        resolve_marble_collisions(&mut self.marbles);
        apply_anti_stall(&mut self.marbles, &mut self.rng, self.step_count);

        for (index, marble) in self.marbles.iter().enumerate() {
            if self.goal_zone.contains(marble.pos) {
                self.phase = RacePhase::Finished;
                self.winner = Some(index);
                info!("marble {index} wins after {:.2}s", self.sim_time);
                break;
            }
        }
    }

    // --- per-step output for the embedding layer ---

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn sim_time(&self) -> f32 {
        self.sim_time
    }

    pub fn is_finished(&self) -> bool {
        self.phase == RacePhase::Finished
    }

    pub fn winner(&self) -> Option<usize> {
        self.winner
    }

    pub fn marbles(&self) -> &[Marble] {
        &self.marbles
    }

    pub fn terrain(&self) -> &TerrainObstacle {
        &self.terrain
    }

    pub fn zones(&self) -> (&Zone, &Zone) {
        (&self.spawn_zone, &self.goal_zone)
    }

    /// The result record, available once the race has finished.
    pub fn result(&self) -> Option<RaceResult> {
        let winner_index = self.winner?;
        Some(RaceResult {
            timestamp_ms: self.timestamp_ms,
            seed: self.config.rng_seed,
            winner_index,
            sim_length_seconds: self.sim_time,
        })
    }
}

/// Place marbles inside the spawn zone with minimum mutual separation via
/// rejection sampling; marbles that cannot find room fall back to a
/// deterministic ring around the zone center. Initial headings are evenly
/// fanned by index.
fn spawn_marbles(zone: &Zone, count: usize, rng: &mut RaceRng) -> Vec<Marble> {
    let colors = marble_colors(count);
    let mut positions: Vec<Vec2> = Vec::with_capacity(count);

    for index in 0..count {
        let mut placed = None;
        for _ in 0..SPAWN_PLACEMENT_ATTEMPTS {
            let candidate = zone.random_point_within(rng);
            let clear = positions
                .iter()
                .all(|p| p.distance(candidate) >= MARBLE_RADIUS * SPAWN_SEPARATION_FACTOR);
            if clear {
                placed = Some(candidate);
                break;
            }
        }
        let pos = placed.unwrap_or_else(|| {
            let angle = TAU * index as f32 / count as f32;
            zone.center + heading_to_vec(angle) * (MARBLE_RADIUS * 2.0)
        });
        positions.push(pos);
    }

    positions
        .into_iter()
        .enumerate()
        .map(|(index, pos)| {
            let heading = TAU * index as f32 / count as f32;
            Marble::new(pos, heading, MARBLE_RADIUS, MARBLE_SPEED, colors[index])
        })
        .collect()
}
