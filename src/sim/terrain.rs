//! Procedural cave terrain generation and the obstacle query interface
//!
//! The generator carves a connected organic cave system out of a solid
//! height field in one pass: a noise pre-carve, a space-filling spine walk,
//! flow channels, chambers with branches and interior islands, smoothing,
//! and a flood-fill connectivity repair. For a fixed RNG stream and
//! complexity the output field is bit-identical across runs.

use glam::Vec2;
use log::debug;
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

use super::field::HeightField;
use super::noise::octave_noise;
use crate::consts::{BORDER_WIDTH_PX, GRID_SCALE, SOLID_THRESHOLD};
use crate::rng::RaceRng;
use crate::{heading_to_vec, normalize_angle};

/// Open regions at or below this cell count are filled instead of connected.
const TINY_POCKET_CUTOFF: usize = 8;
/// Cells sampled per region when searching for the nearest connection pair.
const REGION_SAMPLE_TARGET: usize = 20;

/// Collision queries against static terrain.
///
/// One concrete implementation exists; the trait is the seam the physics
/// core is written against.
pub trait Obstacle {
    /// Does a disc at `pos` with `radius` overlap solid terrain?
    fn check_collision(&self, pos: Vec2, radius: f32) -> bool;
    /// Unit surface normal at `pos`, pointing out of the terrain.
    fn collision_normal(&self, pos: Vec2) -> Vec2;
    /// Closest point on the solid/open boundary near `pos`.
    fn closest_surface_point(&self, pos: Vec2) -> Vec2;
}

/// A finished height field plus the interpretation needed to query it.
///
/// Immutable once constructed; replaced wholesale on regeneration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainObstacle {
    field: HeightField,
    threshold: f32,
    scale: f32,
}

impl TerrainObstacle {
    pub fn new(field: HeightField, threshold: f32, scale: f32) -> Self {
        Self {
            field,
            threshold,
            scale,
        }
    }

    pub fn field(&self) -> &HeightField {
        &self.field
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// World pixels per grid cell.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    #[inline]
    fn to_grid(&self, pos: Vec2) -> (i32, i32) {
        (
            (pos.x / self.scale).floor() as i32,
            (pos.y / self.scale).floor() as i32,
        )
    }

    #[inline]
    fn cell_center(&self, x: i32, y: i32) -> Vec2 {
        Vec2::new(
            (x as f32 + 0.5) * self.scale,
            (y as f32 + 0.5) * self.scale,
        )
    }

    /// Is the single cell containing `pos` solid? Out-of-grid counts as solid.
    pub fn point_solid(&self, pos: Vec2) -> bool {
        let (gx, gy) = self.to_grid(pos);
        self.field.is_solid(gx, gy, self.threshold)
    }
}

impl Obstacle for TerrainObstacle {
    fn check_collision(&self, pos: Vec2, radius: f32) -> bool {
        let (gx, gy) = self.to_grid(pos);
        // The cell under the center, which also covers fully out-of-grid
        // queries (reads outside the grid are solid).
        if self.field.is_solid(gx, gy, self.threshold) {
            return true;
        }

        let reach = (radius / self.scale).ceil() as i32;
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let center = self.cell_center(gx + dx, gy + dy);
                if center.distance(pos) <= radius
                    && self.field.is_solid(gx + dx, gy + dy, self.threshold)
                {
                    return true;
                }
            }
        }
        false
    }

    fn collision_normal(&self, pos: Vec2) -> Vec2 {
        let (gx, gy) = self.to_grid(pos);

        // Central differences on the density field; the gradient points into
        // terrain, the normal away from it.
        let grad_x = (self.field.get(gx + 1, gy) - self.field.get(gx - 1, gy)) * 0.5;
        let grad_y = (self.field.get(gx, gy + 1) - self.field.get(gx, gy - 1)) * 0.5;
        let normal = Vec2::new(-grad_x, -grad_y);

        if normal.length_squared() > 1e-8 {
            return normal.normalize();
        }

        // Degenerate gradient (flat density): probe the four cardinal
        // directions for the nearest open cell and escape toward it.
        for dist in 1..=4 {
            for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                if !self.field.is_solid(gx + dx * dist, gy + dy * dist, self.threshold) {
                    return Vec2::new(dx as f32, dy as f32);
                }
            }
        }
        Vec2::X
    }

    fn closest_surface_point(&self, pos: Vec2) -> Vec2 {
        let (gx, gy) = self.to_grid(pos);
        let mut best = pos;
        let mut best_dist = f32::MAX;

        // A surface cell is a solid cell with an open 4-neighbor.
        let search = 4;
        for dy in -search..=search {
            for dx in -search..=search {
                let (x, y) = (gx + dx, gy + dy);
                if !self.field.is_solid(x, y, self.threshold) {
                    continue;
                }
                let exposed = [(1, 0), (-1, 0), (0, 1), (0, -1)]
                    .iter()
                    .any(|&(nx, ny)| !self.field.is_solid(x + nx, y + ny, self.threshold));
                if !exposed {
                    continue;
                }
                let center = self.cell_center(x, y);
                let dist = center.distance(pos);
                if dist < best_dist {
                    best_dist = dist;
                    best = center;
                }
            }
        }
        best
    }
}

/// Orchestrates noise + carving into a finished, connected obstacle.
pub struct TerrainGenerator {
    grid_w: usize,
    grid_h: usize,
    complexity: f32,
}

impl TerrainGenerator {
    pub fn new(arena_width: f32, arena_height: f32, complexity: f32) -> Self {
        Self {
            grid_w: (arena_width / GRID_SCALE).floor().max(8.0) as usize,
            grid_h: (arena_height / GRID_SCALE).floor().max(8.0) as usize,
            complexity: complexity.clamp(0.0, 1.0),
        }
    }

    fn border_cells(&self) -> usize {
        ((BORDER_WIDTH_PX / GRID_SCALE).round() as usize).max(2)
    }

    /// Run the full single-pass pipeline. No internal retries: an
    /// unplayable result is the validator's problem, and the caller
    /// regenerates with a fresh stream slice.
    pub fn generate(&self, rng: &mut RaceRng) -> TerrainObstacle {
        if self.complexity <= 0.0 {
            let mut field = HeightField::open(self.grid_w, self.grid_h);
            field.solidify_border(self.border_cells());
            return TerrainObstacle::new(field, SOLID_THRESHOLD, GRID_SCALE);
        }

        let mut field = HeightField::solid(self.grid_w, self.grid_h);

        self.noise_pre_carve(&mut field);
        let spine = self.carve_spine(&mut field, rng);
        self.carve_flow_channels(&mut field, rng);
        let chambers = self.carve_chambers(&mut field, rng, &spine);
        self.carve_branches(&mut field, rng, &spine);
        self.place_islands(&mut field, rng, &chambers);

        field.smooth(2, 0.6);
        if self.complexity > 0.5 {
            field.erode(1);
            field.dilate(1);
        }
        field.remove_solid_flecks(SOLID_THRESHOLD);
        field.widen_narrow_passages(SOLID_THRESHOLD);

        // Seal the arena before repairing connectivity, so repair works
        // against the walls the race will actually run inside.
        field.solidify_border(self.border_cells());
        self.repair_connectivity(&mut field);
        field.clamp_values();

        TerrainObstacle::new(field, SOLID_THRESHOLD, GRID_SCALE)
    }

    /// Open cells where combined large + medium octave noise dips strongly
    /// negative. The cut threshold rises with complexity, so higher
    /// complexity pre-carves more natural chambers.
    fn noise_pre_carve(&self, field: &mut HeightField) {
        let cut = -0.55 + 0.25 * self.complexity;
        for y in 0..self.grid_h as i32 {
            for x in 0..self.grid_w as i32 {
                let large = octave_noise(x as f32, y as f32, 2, 0.7, 0.015);
                let medium = octave_noise(x as f32, y as f32, 3, 0.5, 0.03);
                if large * 0.7 + medium * 0.3 < cut {
                    field.set(x, y, 0.0);
                }
            }
        }
    }

    /// Carve the main winding path: a biased random walk that prefers the
    /// direction with the most unvisited solid space ahead, which pulls the
    /// corridor through fresh rock instead of doubling back.
    fn carve_spine(&self, field: &mut HeightField, rng: &mut RaceRng) -> Vec<Vec2> {
        let w = self.grid_w as f32;
        let h = self.grid_h as f32;
        let margin = (w.min(h) / 8.0).clamp(4.0, 10.0);

        let (mut pos, mut angle) = match rng.range_i32(0, 3) {
            0 => (Vec2::new(rng.range_f32(margin, w - margin), margin), FRAC_PI_2),
            1 => (
                Vec2::new(rng.range_f32(margin, w - margin), h - margin),
                -FRAC_PI_2,
            ),
            2 => (Vec2::new(margin, rng.range_f32(margin, h - margin)), 0.0),
            _ => (Vec2::new(w - margin, rng.range_f32(margin, h - margin)), PI),
        };

        let mut visited = vec![false; self.grid_w * self.grid_h];
        let corridor_r = 2.5 + self.complexity * 1.5;
        let lookahead = 6.0;
        let probe_r = 4i32;
        let steps = (self.grid_w + self.grid_h) * 2;
        let mut spine = Vec::with_capacity(steps);

        for _ in 0..steps {
            field.carve_circle(pos.x, pos.y, corridor_r);
            self.mark_visited(&mut visited, pos, corridor_r + 2.0);
            spine.push(pos);

            let mut best_angle = None;
            let mut best_score = f32::MIN;
            for k in 0..8 {
                let cand = k as f32 * FRAC_PI_4;
                let probe = pos + heading_to_vec(cand) * lookahead;
                if probe.x < margin || probe.x > w - margin || probe.y < margin
                    || probe.y > h - margin
                {
                    continue;
                }

                let mut score = 0.0;
                for dy in -probe_r..=probe_r {
                    for dx in -probe_r..=probe_r {
                        let (cx, cy) = (probe.x as i32 + dx, probe.y as i32 + dy);
                        if !field.in_bounds(cx, cy) {
                            continue;
                        }
                        let idx = cy as usize * self.grid_w + cx as usize;
                        if !visited[idx] && field.is_solid(cx, cy, SOLID_THRESHOLD) {
                            score += 1.0;
                        }
                    }
                }
                // Inertia keeps the corridor winding instead of zigzagging.
                score += (PI - normalize_angle(cand - angle).abs()) * 2.0;
                score += rng.range_f32(0.0, 2.0);

                if score > best_score {
                    best_score = score;
                    best_angle = Some(cand);
                }
            }

            let Some(next_angle) = best_angle else {
                break; // cornered against the margin band
            };
            angle = next_angle;
            pos += heading_to_vec(angle) * 1.5;
            pos.x = pos.x.clamp(margin, w - margin);
            pos.y = pos.y.clamp(margin, h - margin);
        }

        spine
    }

    fn mark_visited(&self, visited: &mut [bool], center: Vec2, radius: f32) {
        let r = radius.ceil() as i32;
        for dy in -r..=r {
            for dx in -r..=r {
                let (x, y) = (center.x as i32 + dx, center.y as i32 + dy);
                if x >= 0
                    && (x as usize) < self.grid_w
                    && y >= 0
                    && (y as usize) < self.grid_h
                    && Vec2::new(dx as f32, dy as f32).length() <= radius
                {
                    visited[y as usize * self.grid_w + x as usize] = true;
                }
            }
        }
    }

    /// Carve curved flow channels between two distinct border sides.
    fn carve_flow_channels(&self, field: &mut HeightField, rng: &mut RaceRng) {
        let count = (1.0 + self.complexity * 3.0) as usize;
        for _ in 0..count {
            let start_side = rng.range_i32(0, 3);
            let mut end_side = rng.range_i32(0, 3);
            while end_side == start_side {
                end_side = rng.range_i32(0, 3);
            }

            let start = self.border_point(start_side, rng);
            let end = self.border_point(end_side, rng);
            let width = rng.range_f32(4.0, 4.0 + 4.0 * self.complexity);

            let chord = end - start;
            let bend = chord.x.abs().min(chord.y.abs()) * 0.2;
            let ctrl_offset = Vec2::new(
                rng.range_f32(-bend, bend),
                rng.range_f32(-bend, bend),
            );
            field.carve_curved_path(start, end, width, ctrl_offset);
        }
    }

    fn border_point(&self, side: i32, rng: &mut RaceRng) -> Vec2 {
        let w = self.grid_w as f32;
        let h = self.grid_h as f32;
        let margin = 5.0;
        match side {
            0 => Vec2::new(rng.range_f32(margin, w - margin), 0.0),
            1 => Vec2::new(rng.range_f32(margin, w - margin), h - 1.0),
            2 => Vec2::new(0.0, rng.range_f32(margin, h - margin)),
            _ => Vec2::new(w - 1.0, rng.range_f32(margin, h - margin)),
        }
    }

    /// Open circular chambers at a random subset of spine points.
    fn carve_chambers(
        &self,
        field: &mut HeightField,
        rng: &mut RaceRng,
        spine: &[Vec2],
    ) -> Vec<(Vec2, f32)> {
        let mut chambers = Vec::new();
        if spine.is_empty() {
            return chambers;
        }

        let count = (2.0 + self.complexity * 5.0) as usize;
        for _ in 0..count {
            let center = spine[rng.index(spine.len())];
            let radius = rng.range_f32(3.0, 3.0 + 5.0 * self.complexity);
            // Mostly circular chambers for flow; the occasional elongated one
            if rng.chance(0.9) {
                field.carve_circle(center.x, center.y, radius);
                chambers.push((center, radius));
            } else {
                field.carve_elongated(center.x, center.y, radius * 2.0, rng.range_f32(0.0, TAU));
            }
        }
        chambers
    }

    /// Short, gently curving side corridors off the spine. May dead-end.
    fn carve_branches(&self, field: &mut HeightField, rng: &mut RaceRng, spine: &[Vec2]) {
        if spine.is_empty() {
            return;
        }

        let w = self.grid_w as f32;
        let h = self.grid_h as f32;
        let count = (2.0 + self.complexity * 6.0) as usize;

        for _ in 0..count {
            let mut pos = spine[rng.index(spine.len())];
            let mut angle = rng.range_f32(0.0, TAU);
            let steps = rng.range_i32(8, 20);

            for _ in 0..steps {
                field.carve_circle(pos.x, pos.y, 1.8);
                angle += rng.range_f32(-0.3, 0.3);
                pos += heading_to_vec(angle) * 1.2;
                if pos.x < 3.0 || pos.x > w - 3.0 || pos.y < 3.0 || pos.y > h - 3.0 {
                    break;
                }
            }
        }
    }

    /// Drop a few solid islands inside large chambers. The openness check
    /// keeps them out of narrow corridors, where they would plug the path.
    fn place_islands(
        &self,
        field: &mut HeightField,
        rng: &mut RaceRng,
        chambers: &[(Vec2, f32)],
    ) {
        let target = (self.complexity * 4.0) as usize;
        let large: Vec<_> = chambers.iter().filter(|(_, r)| *r >= 5.0).collect();
        if target == 0 || large.is_empty() {
            return;
        }

        let mut placed = 0;
        for _ in 0..target * 4 {
            if placed >= target {
                break;
            }
            let (center, chamber_r) = large[rng.index(large.len())];
            let island_r = rng.range_f32(1.5, (chamber_r * 0.4).max(1.6));
            let offset = heading_to_vec(rng.range_f32(0.0, TAU))
                * rng.range_f32(0.0, chamber_r * 0.4);
            let pos = *center + offset;

            if field.openness_ratio(pos.x, pos.y, island_r + 2.0, SOLID_THRESHOLD) > 0.85 {
                field.raise_island(pos.x, pos.y, island_r);
                placed += 1;
            }
        }
    }

    /// Flood-fill all open regions; keep the largest as main air, tunnel
    /// every worthwhile pocket into it, fill the rest solid.
    fn repair_connectivity(&self, field: &mut HeightField) {
        let regions = field.open_regions(SOLID_THRESHOLD);
        if regions.len() <= 1 {
            return;
        }

        let main_idx = regions
            .iter()
            .enumerate()
            .max_by_key(|(_, r)| r.len())
            .map(|(i, _)| i)
            .unwrap_or(0);

        let mut tunnels = 0;
        let mut filled = 0;
        for (i, region) in regions.iter().enumerate() {
            if i == main_idx {
                continue;
            }
            if region.len() <= TINY_POCKET_CUTOFF {
                field.fill_region(region, 1.0);
                filled += 1;
            } else {
                let (from, to) = nearest_pair(region, &regions[main_idx]);
                field.carve_line(from, to, 1.5);
                tunnels += 1;
            }
        }
        debug!(
            "connectivity repair: {} regions, {tunnels} tunnels carved, {filled} pockets filled",
            regions.len()
        );
    }
}

/// Greedy nearest pair between two regions, over a sampled subset of each
/// for performance.
fn nearest_pair(region: &[(i32, i32)], main: &[(i32, i32)]) -> ((i32, i32), (i32, i32)) {
    let stride_a = (region.len() / REGION_SAMPLE_TARGET).max(1);
    let stride_b = (main.len() / REGION_SAMPLE_TARGET).max(1);

    let mut best = (region[0], main[0]);
    let mut best_dist = i64::MAX;
    for &(ax, ay) in region.iter().step_by(stride_a) {
        for &(bx, by) in main.iter().step_by(stride_b) {
            let (dx, dy) = ((ax - bx) as i64, (ay - by) as i64);
            let dist = dx * dx + dy * dy;
            if dist < best_dist {
                best_dist = dist;
                best = ((ax, ay), (bx, by));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate(seed: u64, complexity: f32) -> TerrainObstacle {
        let mut rng = RaceRng::new(seed);
        TerrainGenerator::new(640.0, 480.0, complexity).generate(&mut rng)
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = generate(1234, 0.8);
        let b = generate(1234, 0.8);
        assert_eq!(a.field(), b.field());
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = generate(1, 0.8);
        let b = generate(2, 0.8);
        assert_ne!(a.field(), b.field());
    }

    #[test]
    fn test_open_space_is_singly_connected() {
        for seed in [3, 17, 99] {
            let terrain = generate(seed, 0.85);
            let regions = terrain.field().open_regions(terrain.threshold());
            assert_eq!(
                regions.len(),
                1,
                "seed {seed} left {} disjoint regions",
                regions.len()
            );
        }
    }

    #[test]
    fn test_border_is_enclosed() {
        let terrain = generate(7, 0.9);
        let field = terrain.field();
        let t = terrain.threshold();
        for x in 0..field.width() as i32 {
            assert!(field.is_solid(x, 0, t));
            assert!(field.is_solid(x, field.height() as i32 - 1, t));
        }
        for y in 0..field.height() as i32 {
            assert!(field.is_solid(0, y, t));
            assert!(field.is_solid(field.width() as i32 - 1, y, t));
        }
    }

    #[test]
    fn test_zero_complexity_is_border_only() {
        let terrain = generate(5, 0.0);
        let field = terrain.field();
        let t = terrain.threshold();
        // One big open region filling everything inside the border band
        let regions = field.open_regions(t);
        assert_eq!(regions.len(), 1);
        let open_cells = regions[0].len();
        let total = field.width() * field.height();
        assert!(open_cells > total / 2);
    }

    #[test]
    fn test_complexity_scales_carving() {
        // Higher complexity must carve at least as rich a cave system; use
        // open-cell counts as a monotonicity proxy over a few seeds.
        let mut lows = 0usize;
        let mut highs = 0usize;
        for seed in [11, 12, 13] {
            lows += generate(seed, 0.2)
                .field()
                .open_regions(SOLID_THRESHOLD)
                .iter()
                .map(|r| r.len())
                .sum::<usize>();
            highs += generate(seed, 1.0)
                .field()
                .open_regions(SOLID_THRESHOLD)
                .iter()
                .map(|r| r.len())
                .sum::<usize>();
        }
        assert!(highs > lows);
    }

    #[test]
    fn test_out_of_grid_queries_are_solid() {
        let terrain = generate(8, 0.5);
        assert!(terrain.check_collision(Vec2::new(-50.0, -50.0), 5.0));
        assert!(terrain.check_collision(Vec2::new(1e6, 1e6), 5.0));
        assert!(terrain.point_solid(Vec2::new(-1.0, 10.0)));
    }

    #[test]
    fn test_collision_normal_is_unit() {
        let terrain = generate(9, 0.8);
        let field = terrain.field();
        for y in (0..field.height() as i32).step_by(7) {
            for x in (0..field.width() as i32).step_by(7) {
                let pos = Vec2::new(x as f32 * GRID_SCALE, y as f32 * GRID_SCALE);
                let n = terrain.collision_normal(pos);
                assert!((n.length() - 1.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_normal_points_out_of_flat_wall() {
        // Hand-built field: solid left half, open right half.
        let mut field = HeightField::solid(20, 20);
        for y in 0..20 {
            for x in 10..20 {
                field.set(x, y, 0.0);
            }
        }
        let terrain = TerrainObstacle::new(field, SOLID_THRESHOLD, GRID_SCALE);
        // Just inside the wall at the boundary, the normal points +x (into
        // the open half).
        let n = terrain.collision_normal(Vec2::new(9.5 * GRID_SCALE, 10.0 * GRID_SCALE));
        assert!(n.x > 0.9);
        assert!(n.y.abs() < 0.3);
    }

    #[test]
    fn test_closest_surface_point_lands_on_boundary() {
        let mut field = HeightField::solid(20, 20);
        for y in 0..20 {
            for x in 10..20 {
                field.set(x, y, 0.0);
            }
        }
        let terrain = TerrainObstacle::new(field, SOLID_THRESHOLD, GRID_SCALE);
        let probe = Vec2::new(11.0 * GRID_SCALE, 10.0 * GRID_SCALE);
        let surface = terrain.closest_surface_point(probe);
        // The nearest exposed solid cell is in the x = 9 column.
        assert!((surface.x / GRID_SCALE - 9.5).abs() < 0.6);
    }

    #[test]
    fn test_check_collision_against_known_wall() {
        let mut field = HeightField::open(20, 20);
        field.solidify_border(2);
        let terrain = TerrainObstacle::new(field, SOLID_THRESHOLD, GRID_SCALE);

        let mid = Vec2::new(10.0 * GRID_SCALE, 10.0 * GRID_SCALE);
        assert!(!terrain.check_collision(mid, 15.0));

        // Near the left wall the disc reaches into the border band.
        let near_wall = Vec2::new(2.5 * GRID_SCALE, 10.0 * GRID_SCALE);
        assert!(terrain.check_collision(near_wall, 15.0));
    }
}
