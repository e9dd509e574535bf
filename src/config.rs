//! Race configuration
//!
//! An explicit configuration struct passed into the simulation constructor.
//! Validation happens once, up front; a rejected configuration never starts
//! generation work.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{MAX_MARBLES, MIN_ARENA_SIDE};

/// Construction-time configuration errors. Non-recoverable for the attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("arena {0}x{1} is below the {MIN_ARENA_SIDE} pixel minimum side")]
    ArenaTooSmall(f32, f32),
    #[error("marble count {0} outside 1..={MAX_MARBLES}")]
    BadMarbleCount(usize),
    #[error("terrain complexity {0} outside [0, 1]")]
    BadComplexity(f32),
}

/// Everything the simulation core needs to set up one race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceConfig {
    /// Arena width in world pixels
    pub arena_width: f32,
    /// Arena height in world pixels
    pub arena_height: f32,
    /// Number of racing marbles
    pub num_marbles: usize,
    /// Terrain complexity in [0, 1]; 0 carves nothing but the open arena
    pub terrain_complexity: f32,
    /// Master RNG seed; one integer reproduces the entire run
    pub rng_seed: u64,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            arena_width: 1280.0,
            arena_height: 960.0,
            num_marbles: 8,
            terrain_complexity: 0.88,
            rng_seed: 0,
        }
    }
}

impl RaceConfig {
    /// Fail-fast validation, run before any terrain work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arena_width < MIN_ARENA_SIDE || self.arena_height < MIN_ARENA_SIDE {
            return Err(ConfigError::ArenaTooSmall(
                self.arena_width,
                self.arena_height,
            ));
        }
        if self.num_marbles == 0 || self.num_marbles > MAX_MARBLES {
            return Err(ConfigError::BadMarbleCount(self.num_marbles));
        }
        if !(0.0..=1.0).contains(&self.terrain_complexity) || !self.terrain_complexity.is_finite() {
            return Err(ConfigError::BadComplexity(self.terrain_complexity));
        }
        Ok(())
    }

    /// Arena diagonal length, the yardstick for zone separation.
    pub fn diagonal(&self) -> f32 {
        (self.arena_width * self.arena_width + self.arena_height * self.arena_height).sqrt()
    }
}
