//! Marble Derby - a deterministic 2D marble race simulator
//!
//! Core modules:
//! - `sim`: Deterministic simulation (terrain generation, physics, race state)
//! - `config`: Construction-time race configuration and validation
//! - `rng`: Explicit seeded RNG state threaded through every random decision

pub mod config;
pub mod rng;
pub mod sim;

pub use config::{ConfigError, RaceConfig};
pub use rng::RaceRng;
pub use sim::race::{GenerationError, RaceResult, RaceSimulation, SetupError};

use glam::Vec2;

/// Simulation constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;
    /// Pre-race countdown duration in seconds (sim time starts at the negative)
    pub const COUNTDOWN_SECONDS: f32 = 3.0;

    /// Marble defaults
    pub const MARBLE_RADIUS: f32 = 15.0;
    /// Constant marble speed in pixels per second
    pub const MARBLE_SPEED: f32 = 175.0;

    /// World pixels per terrain grid cell
    pub const GRID_SCALE: f32 = 9.0;
    /// Height field density above this value is solid terrain
    pub const SOLID_THRESHOLD: f32 = 0.3;
    /// Solid border band around the arena, in world pixels
    pub const BORDER_WIDTH_PX: f32 = 36.0;

    /// Spawn zone radius as a multiple of marble radius
    pub const SPAWN_ZONE_FACTOR: f32 = 2.5;
    /// Goal zone radius as a multiple of marble radius
    pub const GOAL_ZONE_FACTOR: f32 = 1.5;
    /// Minimum spawn-goal separation as a fraction of the arena diagonal
    pub const MIN_SPAWN_GOAL_DIST_FRAC: f32 = 0.25;
    /// Wave-propagation grid step as a multiple of marble radius
    pub const WAVE_STEP_FACTOR: f32 = 0.4;

    /// Size of the pre-seeded terrain candidate batch
    pub const TERRAIN_ATTEMPTS: usize = 32;

    /// Steps between anti-stall heading checks
    pub const STALL_CHECK_INTERVAL: u64 = 30;
    /// Consecutive axis-aligned checks before a perturbation is injected
    pub const STALL_TRIGGER: u32 = 8;
    /// Heading-to-axis tolerance for stall detection, in radians (~2 degrees)
    pub const STALL_ANGLE_TOL: f32 = 0.035;

    /// Step size for iterative terrain push-out, in world pixels
    pub const PUSH_OUT_STEP: f32 = 0.5;
    /// Iteration cap for terrain push-out
    pub const MAX_PUSH_OUT_STEPS: u32 = 60;

    /// Arena side length floor accepted at construction
    pub const MIN_ARENA_SIDE: f32 = 200.0;
    /// Marble count ceiling accepted at construction
    pub const MAX_MARBLES: usize = 32;
}

/// Normalize angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Unit direction vector for a heading angle
#[inline]
pub fn heading_to_vec(angle: f32) -> Vec2 {
    Vec2::new(angle.cos(), angle.sin())
}
