//! Spawn and goal zones, and the terrain playability validator
//!
//! Given a generated obstacle, the validator searches for a spawn/goal pair
//! that is clear of terrain, far apart, and provably connected through open
//! space. Failure is reported to the caller, never papered over with
//! degenerate zones.

use glam::Vec2;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f32::consts::TAU;

use super::terrain::{Obstacle, TerrainObstacle};
use crate::consts::{
    GOAL_ZONE_FACTOR, MIN_SPAWN_GOAL_DIST_FRAC, SPAWN_ZONE_FACTOR, WAVE_STEP_FACTOR,
};
use crate::heading_to_vec;
use crate::rng::RaceRng;

/// Spawn candidates kept after the distance-from-center sort.
const MAX_SPAWN_CANDIDATES: usize = 64;
/// Total wave-propagation searches allowed before reporting failure.
const MAX_REACHABILITY_TESTS: usize = 256;
/// Perimeter sample count for zone clearance checks.
const PERIMETER_SAMPLES: usize = 16;
/// Probe count for the surrounding-accessibility check.
const ACCESS_SAMPLES: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneKind {
    Spawn,
    Goal,
}

/// A circular zone on the terrain. Read-only once validation succeeds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Zone {
    pub center: Vec2,
    pub radius: f32,
    pub kind: ZoneKind,
}

impl Zone {
    pub fn new(center: Vec2, radius: f32, kind: ZoneKind) -> Self {
        Self {
            center,
            radius,
            kind,
        }
    }

    /// Point-in-zone test (used for the win check).
    pub fn contains(&self, point: Vec2) -> bool {
        self.center.distance(point) <= self.radius
    }

    /// Deterministic random point inside the zone, slightly inset from the rim.
    pub fn random_point_within(&self, rng: &mut RaceRng) -> Vec2 {
        let angle = rng.range_f32(0.0, TAU);
        let r = rng.range_f32(0.0, self.radius * 0.9);
        self.center + heading_to_vec(angle) * r
    }
}

/// Searches a terrain for a valid, reachable spawn/goal pair.
pub struct ZoneValidator {
    arena_width: f32,
    arena_height: f32,
    marble_radius: f32,
}

impl ZoneValidator {
    pub fn new(arena_width: f32, arena_height: f32, marble_radius: f32) -> Self {
        Self {
            arena_width,
            arena_height,
            marble_radius,
        }
    }

    /// Find the best spawn/goal pair: spawn as far from the arena center as
    /// possible, goal as far from that spawn as possible, both clear of
    /// terrain, separated by a minimum fraction of the arena diagonal, and
    /// connected through open space.
    ///
    /// Returns `None` when no pair passes; the caller must regenerate.
    pub fn find_zones(&self, terrain: &TerrainObstacle) -> Option<(Zone, Zone)> {
        let spawn_radius = self.marble_radius * SPAWN_ZONE_FACTOR;
        let goal_radius = self.marble_radius * GOAL_ZONE_FACTOR;

        let mut spawns = self.candidate_centers(terrain, spawn_radius);
        let goals = self.candidate_centers(terrain, goal_radius);
        debug!(
            "zone search: {} spawn candidates, {} goal candidates",
            spawns.len(),
            goals.len()
        );
        if spawns.is_empty() || goals.is_empty() {
            return None;
        }

        let arena_center = Vec2::new(self.arena_width * 0.5, self.arena_height * 0.5);
        spawns.sort_by(|a, b| {
            b.distance_squared(arena_center)
                .total_cmp(&a.distance_squared(arena_center))
        });
        spawns.truncate(MAX_SPAWN_CANDIDATES);

        let diagonal =
            (self.arena_width * self.arena_width + self.arena_height * self.arena_height).sqrt();
        let min_separation = diagonal * MIN_SPAWN_GOAL_DIST_FRAC;

        let mut budget = MAX_REACHABILITY_TESTS;
        for &spawn in &spawns {
            let mut ranked_goals = goals.clone();
            ranked_goals.sort_by(|a, b| {
                b.distance_squared(spawn).total_cmp(&a.distance_squared(spawn))
            });

            for &goal in &ranked_goals {
                // Sorted furthest-first: once one goal is too close, the
                // rest are too.
                if spawn.distance(goal) < min_separation {
                    break;
                }
                if budget == 0 {
                    debug!("zone search: reachability budget exhausted");
                    return None;
                }
                budget -= 1;

                if self.reachable(terrain, spawn, goal) {
                    debug!(
                        "zone search: spawn ({:.0}, {:.0}) goal ({:.0}, {:.0}) separation {:.0}",
                        spawn.x,
                        spawn.y,
                        goal.x,
                        goal.y,
                        spawn.distance(goal)
                    );
                    return Some((
                        Zone::new(spawn, spawn_radius, ZoneKind::Spawn),
                        Zone::new(goal, goal_radius, ZoneKind::Goal),
                    ));
                }
            }
        }

        None
    }

    /// Enumerate every zone center that clears terrain and has an accessible
    /// neighborhood, on a grid finer than the zone radius.
    fn candidate_centers(&self, terrain: &TerrainObstacle, zone_radius: f32) -> Vec<Vec2> {
        let step = zone_radius * 0.3;
        let min = zone_radius;
        let max_x = self.arena_width - zone_radius;
        let max_y = self.arena_height - zone_radius;
        if max_x <= min || max_y <= min {
            return Vec::new();
        }

        let nx = ((max_x - min) / step) as usize;
        let ny = ((max_y - min) / step) as usize;
        let mut candidates = Vec::new();
        for iy in 0..=ny {
            for ix in 0..=nx {
                let center = Vec2::new(min + ix as f32 * step, min + iy as f32 * step);
                if self.position_valid(terrain, center, zone_radius) {
                    candidates.push(center);
                }
            }
        }
        candidates
    }

    /// A position is valid iff the zone disc, sampled at its center, rim and
    /// interior rings, never touches terrain at marble radius, and at least
    /// half of the surrounding neighborhood is open (rejects dead pockets).
    fn position_valid(&self, terrain: &TerrainObstacle, center: Vec2, zone_radius: f32) -> bool {
        if terrain.check_collision(center, self.marble_radius) {
            return false;
        }

        for i in 0..PERIMETER_SAMPLES {
            let angle = TAU * i as f32 / PERIMETER_SAMPLES as f32;
            let point = center + heading_to_vec(angle) * (zone_radius * 0.95);
            if terrain.check_collision(point, self.marble_radius) {
                return false;
            }
        }

        for ring in [0.2, 0.4, 0.6, 0.8] {
            for i in 0..8 {
                let angle = TAU * i as f32 / 8.0;
                let point = center + heading_to_vec(angle) * (zone_radius * ring);
                if terrain.check_collision(point, self.marble_radius) {
                    return false;
                }
            }
        }

        let mut accessible = 0;
        for i in 0..ACCESS_SAMPLES {
            let angle = TAU * i as f32 / ACCESS_SAMPLES as f32;
            let point = center + heading_to_vec(angle) * (zone_radius * 1.5);
            if !terrain.check_collision(point, self.marble_radius) {
                accessible += 1;
            }
        }
        accessible * 2 >= ACCESS_SAMPLES
    }

    /// Breadth-first wave propagation over a fine grid (step smaller than the
    /// marble radius), 8-directional, with terrain collision at marble radius
    /// as the blocking predicate. Bounded by a step-count cap, not a timer.
    fn reachable(&self, terrain: &TerrainObstacle, from: Vec2, to: Vec2) -> bool {
        let step = self.marble_radius * WAVE_STEP_FACTOR;
        let grid_w = (self.arena_width / step).ceil() as i32 + 1;
        let grid_h = (self.arena_height / step).ceil() as i32 + 1;

        let start = ((from.x / step) as i32, (from.y / step) as i32);
        let goal = ((to.x / step) as i32, (to.y / step) as i32);
        let max_distance = (grid_w + grid_h) as u32 * 2;

        let in_grid = |x: i32, y: i32| x >= 0 && x < grid_w && y >= 0 && y < grid_h;
        if !in_grid(start.0, start.1) {
            return false;
        }

        let mut visited = vec![false; (grid_w * grid_h) as usize];
        let mut queue = VecDeque::new();
        visited[(start.1 * grid_w + start.0) as usize] = true;
        queue.push_back((start.0, start.1, 0u32));

        const DIRECTIONS: [(i32, i32); 8] = [
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ];

        while let Some((x, y, dist)) = queue.pop_front() {
            if (x - goal.0).abs() + (y - goal.1).abs() <= 2 {
                return true;
            }
            if dist > max_distance {
                continue;
            }

            for (dx, dy) in DIRECTIONS {
                let (nx, ny) = (x + dx, y + dy);
                if !in_grid(nx, ny) {
                    continue;
                }
                let idx = (ny * grid_w + nx) as usize;
                if visited[idx] {
                    continue;
                }

                let world = Vec2::new(nx as f32 * step, ny as f32 * step);
                if world.x < self.marble_radius
                    || world.x > self.arena_width - self.marble_radius
                    || world.y < self.marble_radius
                    || world.y > self.arena_height - self.marble_radius
                {
                    continue;
                }
                if terrain.check_collision(world, self.marble_radius) {
                    continue;
                }

                visited[idx] = true;
                queue.push_back((nx, ny, dist + 1));
            }
        }

        false
    }
}
