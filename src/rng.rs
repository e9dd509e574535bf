//! Explicit seeded RNG state
//!
//! Every stochastic decision in terrain generation and physics draws from a
//! `RaceRng` threaded through the call that needs it. There is no module-level
//! RNG and no wall-clock fallback inside the simulation: one `u64` seed fully
//! determines a run.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

/// Serializable RNG identity: the seed plus how many sub-streams were split off.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RngState {
    pub seed: u64,
    pub splits: u32,
}

/// Seeded RNG stream for one race.
///
/// Wraps a PCG-32 generator with the convenience draws the simulation needs.
/// `split()` derives an isolated child stream, used to give each terrain
/// candidate its own draw sequence so validation order cannot perturb
/// downstream randomness.
#[derive(Debug, Clone)]
pub struct RaceRng {
    seed: u64,
    splits: u32,
    rng: Pcg32,
}

impl RaceRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            splits: 0,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    /// The seed this stream was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn state(&self) -> RngState {
        RngState {
            seed: self.seed,
            splits: self.splits,
        }
    }

    /// Derive an isolated child stream.
    ///
    /// Consumes exactly one draw from this stream regardless of how much the
    /// child consumes, so a fixed number of splits keeps the parent position
    /// deterministic.
    pub fn split(&mut self) -> RaceRng {
        self.splits += 1;
        let child_seed = self.rng.random::<u64>();
        RaceRng::new(child_seed)
    }

    /// Uniform float in `[lo, hi)`.
    pub fn range_f32(&mut self, lo: f32, hi: f32) -> f32 {
        if lo >= hi {
            return lo;
        }
        self.rng.random_range(lo..hi)
    }

    /// Uniform integer in `[lo, hi]` (inclusive).
    pub fn range_i32(&mut self, lo: i32, hi: i32) -> i32 {
        if lo >= hi {
            return lo;
        }
        self.rng.random_range(lo..=hi)
    }

    /// Uniform index in `[0, len)`. `len` must be nonzero.
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.random_range(0..len)
    }

    /// Uniform float in `[0, 1)`.
    pub fn unit_f32(&mut self) -> f32 {
        self.rng.random::<f32>()
    }

    /// Uniform angle in `[0, 2π)`.
    pub fn angle(&mut self) -> f32 {
        self.range_f32(0.0, std::f32::consts::TAU)
    }

    /// Bernoulli draw with probability `p` of true.
    pub fn chance(&mut self, p: f32) -> bool {
        self.rng.random::<f32>() < p
    }
}
