//! Collision detection and response
//!
//! Three resolution passes, run in a fixed order each step: marble-terrain,
//! arena boundary, then marble-marble. Everything here preserves the
//! constant-speed model: a resolution may rotate a velocity and correct a
//! position but always renormalizes speed before returning.
//!
//! Degenerate inputs (coincident marbles, flat gradients) resolve through
//! deterministic fallbacks; nothing in this module draws randomness except
//! the anti-stall perturbation, which pulls from the race's own stream.

use glam::Vec2;
use std::f32::consts::{FRAC_PI_2, PI};

use super::marble::Marble;
use super::terrain::Obstacle;
use crate::consts::{
    MAX_PUSH_OUT_STEPS, PUSH_OUT_STEP, STALL_ANGLE_TOL, STALL_CHECK_INTERVAL, STALL_TRIGGER,
};
use crate::rng::RaceRng;
use crate::{heading_to_vec, normalize_angle};

/// Separation heading for fully coincident marbles, stepped by pair index so
/// repeated degeneracies fan out instead of stacking along one axis.
const GOLDEN_ANGLE: f32 = 2.399_963;

/// Pairwise marble collision sweep in stable index order.
pub fn resolve_marble_collisions(marbles: &mut [Marble]) {
    for i in 0..marbles.len() {
        for j in i + 1..marbles.len() {
            let (head, tail) = marbles.split_at_mut(j);
            resolve_pair(&mut head[i], &mut tail[0], i + j);
        }
    }
}

/// Equal-mass elastic collision: separate along the center axis by half the
/// penetration each, exchange the normal velocity component when the pair is
/// approaching, then pin both speeds back to their fixed targets.
fn resolve_pair(a: &mut Marble, b: &mut Marble, pair_index: usize) {
    let delta = b.pos - a.pos;
    let dist = delta.length();
    let min_dist = a.radius + b.radius;
    if dist > min_dist {
        return;
    }

    let normal = if dist > 1e-6 {
        delta / dist
    } else {
        heading_to_vec(pair_index as f32 * GOLDEN_ANGLE)
    };

    let overlap = min_dist - dist;
    if overlap > 0.0 {
        a.pos -= normal * (overlap * 0.5);
        b.pos += normal * (overlap * 0.5);
    }

    let along = (b.vel - a.vel).dot(normal);
    if along > 0.0 {
        return; // already separating
    }

    a.vel += normal * along;
    b.vel -= normal * along;
    a.renormalize();
    b.renormalize();
}

/// Marble-terrain response: reflect across the gradient normal when moving
/// into the surface, then walk the marble out in small fixed steps until the
/// disc is clear. Never a single-jump teleport, so thin walls cannot be
/// tunneled through by a large correction.
pub fn resolve_terrain_collision<O: Obstacle>(marble: &mut Marble, terrain: &O) {
    if !terrain.check_collision(marble.pos, marble.radius) {
        return;
    }

    let normal = terrain.collision_normal(marble.pos);
    let along = marble.vel.dot(normal);
    if along < 0.0 {
        marble.vel -= normal * (2.0 * along);
        marble.renormalize();
    }

    let mut steps = 0;
    while terrain.check_collision(marble.pos, marble.radius) && steps < MAX_PUSH_OUT_STEPS {
        marble.pos += normal * PUSH_OUT_STEP;
        steps += 1;
    }
}

/// Arena edges are an implicit solid: clamp to the inside and flip the
/// inward velocity component.
pub fn resolve_boundary(marble: &mut Marble, arena_width: f32, arena_height: f32) {
    let r = marble.radius;

    if marble.pos.x < r {
        marble.pos.x = r;
        if marble.vel.x < 0.0 {
            marble.vel.x = -marble.vel.x;
        }
    } else if marble.pos.x > arena_width - r {
        marble.pos.x = arena_width - r;
        if marble.vel.x > 0.0 {
            marble.vel.x = -marble.vel.x;
        }
    }

    if marble.pos.y < r {
        marble.pos.y = r;
        if marble.vel.y < 0.0 {
            marble.vel.y = -marble.vel.y;
        }
    } else if marble.pos.y > arena_height - r {
        marble.pos.y = arena_height - r;
        if marble.vel.y > 0.0 {
            marble.vel.y = -marble.vel.y;
        }
    }
}

/// Periodic anti-stall sweep.
///
/// A marble bouncing between parallel walls settles into a heading within a
/// couple of degrees of an axis and stays there. Every check interval the
/// streak counter advances for axis-aligned marbles; once it trips, the
/// heading gets a small random kick (speed preserved) and the streak resets.
pub fn apply_anti_stall(marbles: &mut [Marble], rng: &mut RaceRng, step: u64) {
    if step == 0 || !step.is_multiple_of(STALL_CHECK_INTERVAL) {
        return;
    }

    for marble in marbles.iter_mut() {
        if is_axis_aligned(marble.heading()) {
            marble.stall_streak += 1;
        } else {
            marble.stall_streak = 0;
            continue;
        }

        if marble.stall_streak >= STALL_TRIGGER {
            let magnitude = rng.range_f32(0.15, 0.45);
            let sign = if rng.chance(0.5) { 1.0 } else { -1.0 };
            let heading = marble.heading() + magnitude * sign;
            marble.vel = heading_to_vec(heading) * marble.speed;
            marble.stall_streak = 0;
        }
    }
}

fn is_axis_aligned(heading: f32) -> bool {
    let h = normalize_angle(heading);
    [0.0, FRAC_PI_2, -FRAC_PI_2, PI, -PI]
        .iter()
        .any(|axis| (h - axis).abs() < STALL_ANGLE_TOL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{GRID_SCALE, MARBLE_RADIUS, MARBLE_SPEED, SOLID_THRESHOLD};
    use crate::sim::field::HeightField;
    use crate::sim::terrain::TerrainObstacle;
    use proptest::prelude::*;

    fn marble_at(x: f32, y: f32, heading: f32) -> Marble {
        Marble::new(
            Vec2::new(x, y),
            heading,
            MARBLE_RADIUS,
            MARBLE_SPEED,
            [0, 0, 0],
        )
    }

    fn walled_arena() -> TerrainObstacle {
        let mut field = HeightField::open(60, 60);
        field.solidify_border(4);
        TerrainObstacle::new(field, SOLID_THRESHOLD, GRID_SCALE)
    }

    #[test]
    fn test_head_on_collision_swaps_x_components() {
        // Two equal marbles approaching head-on along x swap their
        // x-velocities exactly; y stays zero.
        let mut marbles = vec![marble_at(100.0, 100.0, 0.0), marble_at(128.0, 100.0, PI)];
        resolve_marble_collisions(&mut marbles);

        assert!((marbles[0].vel.x - (-MARBLE_SPEED)).abs() < 1e-3);
        assert!((marbles[1].vel.x - MARBLE_SPEED).abs() < 1e-3);
        assert!(marbles[0].vel.y.abs() < 1e-3);
        assert!(marbles[1].vel.y.abs() < 1e-3);
    }

    #[test]
    fn test_overlapping_pair_is_separated() {
        let mut marbles = vec![marble_at(100.0, 100.0, 0.0), marble_at(110.0, 100.0, PI)];
        resolve_marble_collisions(&mut marbles);
        let dist = marbles[0].pos.distance(marbles[1].pos);
        assert!(dist >= 2.0 * MARBLE_RADIUS - 1e-3);
    }

    #[test]
    fn test_separating_pair_keeps_velocities() {
        // Overlapping but moving apart: positions correct, velocities don't.
        let mut marbles = vec![marble_at(100.0, 100.0, PI), marble_at(120.0, 100.0, 0.0)];
        let (v0, v1) = (marbles[0].vel, marbles[1].vel);
        resolve_marble_collisions(&mut marbles);
        assert_eq!(marbles[0].vel, v0);
        assert_eq!(marbles[1].vel, v1);
    }

    #[test]
    fn test_coincident_marbles_resolve_deterministically() {
        let make = || vec![marble_at(100.0, 100.0, 0.0), marble_at(100.0, 100.0, PI)];

        let mut a = make();
        let mut b = make();
        resolve_marble_collisions(&mut a);
        resolve_marble_collisions(&mut b);

        assert_eq!(a[0].pos, b[0].pos);
        assert_eq!(a[1].pos, b[1].pos);
        // Separated to contact distance, both still at full speed
        assert!(a[0].pos.distance(a[1].pos) >= 2.0 * MARBLE_RADIUS - 1e-3);
        for m in &a {
            assert!((m.vel.length() - MARBLE_SPEED).abs() < 1e-2);
            assert!(m.vel.is_finite());
        }
    }

    #[test]
    fn test_boundary_reflection_left_edge() {
        // Marble moving left at the left boundary: x-velocity flips sign,
        // position clamps to radius, y-velocity unchanged.
        let mut m = marble_at(5.0, 300.0, PI);
        let vy = m.vel.y;
        resolve_boundary(&mut m, 640.0, 480.0);
        assert_eq!(m.pos.x, MARBLE_RADIUS);
        assert!(m.vel.x > 0.0);
        assert_eq!(m.vel.y, vy);
    }

    #[test]
    fn test_boundary_clamps_all_edges() {
        let arena = (640.0, 480.0);
        for (pos, heading) in [
            (Vec2::new(-10.0, 240.0), PI),
            (Vec2::new(700.0, 240.0), 0.0),
            (Vec2::new(320.0, -10.0), -FRAC_PI_2),
            (Vec2::new(320.0, 500.0), FRAC_PI_2),
        ] {
            let mut m = marble_at(pos.x, pos.y, heading);
            resolve_boundary(&mut m, arena.0, arena.1);
            assert!(m.pos.x >= MARBLE_RADIUS && m.pos.x <= arena.0 - MARBLE_RADIUS);
            assert!(m.pos.y >= MARBLE_RADIUS && m.pos.y <= arena.1 - MARBLE_RADIUS);
            assert!((m.vel.length() - MARBLE_SPEED).abs() < 1e-2);
        }
    }

    #[test]
    fn test_terrain_collision_reflects_and_pushes_out() {
        let terrain = walled_arena();
        // Inside the left wall band (walls are 4 cells = 36 px), moving left
        let mut m = marble_at(40.0, 270.0, PI);
        resolve_terrain_collision(&mut m, &terrain);

        assert!(m.vel.x > 0.0, "velocity must reflect off the wall");
        assert!(
            !terrain.check_collision(m.pos, m.radius),
            "marble must end the resolution clear of terrain"
        );
        assert!((m.vel.length() - MARBLE_SPEED).abs() < 1e-2);
    }

    #[test]
    fn test_terrain_collision_noop_in_open_space() {
        let terrain = walled_arena();
        let mut m = marble_at(270.0, 270.0, 1.0);
        let (pos, vel) = (m.pos, m.vel);
        resolve_terrain_collision(&mut m, &terrain);
        assert_eq!(m.pos, pos);
        assert_eq!(m.vel, vel);
    }

    #[test]
    fn test_push_out_iteration_is_capped() {
        // Fully solid arena: no open cell to escape to. The loop must stop
        // at the cap instead of spinning forever.
        let field = HeightField::solid(40, 40);
        let terrain = TerrainObstacle::new(field, SOLID_THRESHOLD, GRID_SCALE);
        let mut m = marble_at(180.0, 180.0, 0.3);
        resolve_terrain_collision(&mut m, &terrain);
        let moved = m.pos.distance(Vec2::new(180.0, 180.0));
        assert!(moved <= PUSH_OUT_STEP * MAX_PUSH_OUT_STEPS as f32 + 1e-3);
    }

    #[test]
    fn test_anti_stall_kicks_horizontal_cycle() {
        let mut marbles = vec![marble_at(100.0, 100.0, 0.0)];
        let mut rng = RaceRng::new(5);

        let mut kicked_at = None;
        for check in 1..=STALL_TRIGGER + 1 {
            let step = check as u64 * STALL_CHECK_INTERVAL;
            apply_anti_stall(&mut marbles, &mut rng, step);
            if !is_axis_aligned(marbles[0].heading()) {
                kicked_at = Some(check);
                break;
            }
        }

        assert_eq!(kicked_at, Some(STALL_TRIGGER));
        assert!((marbles[0].vel.length() - MARBLE_SPEED).abs() < 1e-2);
    }

    #[test]
    fn test_anti_stall_ignores_diagonal_movers() {
        let mut marbles = vec![marble_at(100.0, 100.0, 0.8)];
        let mut rng = RaceRng::new(5);
        for check in 1..=STALL_TRIGGER * 2 {
            apply_anti_stall(&mut marbles, &mut rng, check as u64 * STALL_CHECK_INTERVAL);
        }
        assert!((marbles[0].heading() - 0.8).abs() < 1e-5);
        assert_eq!(marbles[0].stall_streak, 0);
    }

    #[test]
    fn test_anti_stall_only_runs_on_interval() {
        let mut marbles = vec![marble_at(100.0, 100.0, 0.0)];
        marbles[0].stall_streak = STALL_TRIGGER;
        let mut rng = RaceRng::new(5);
        apply_anti_stall(&mut marbles, &mut rng, STALL_CHECK_INTERVAL + 1);
        assert_eq!(marbles[0].heading(), 0.0);
    }

    proptest! {
        #[test]
        fn prop_collisions_preserve_speed(
            x0 in 50.0f32..600.0, y0 in 50.0f32..400.0,
            x1 in 50.0f32..600.0, y1 in 50.0f32..400.0,
            h0 in -PI..PI, h1 in -PI..PI,
        ) {
            let mut marbles = vec![marble_at(x0, y0, h0), marble_at(x1, y1, h1)];
            for _ in 0..4 {
                resolve_marble_collisions(&mut marbles);
                for m in &mut marbles {
                    resolve_boundary(m, 640.0, 480.0);
                }
            }
            for m in &marbles {
                prop_assert!((m.vel.length() - MARBLE_SPEED).abs() < 1e-2);
                prop_assert!(m.pos.is_finite());
            }
        }
    }
}
