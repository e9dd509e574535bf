//! Marble state and constant-speed kinematics
//!
//! A marble has no mass and no gravity: its scalar speed is an invariant,
//! and collisions only ever rotate the velocity. Every resolution path ends
//! by renormalizing the velocity back to the fixed speed so numeric drift
//! can never accumulate.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::heading_to_vec;

/// One racing marble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Marble {
    pub pos: Vec2,
    pub vel: Vec2,
    pub radius: f32,
    /// Fixed speed magnitude the velocity is renormalized to
    pub speed: f32,
    /// RGB color for the rendering adapter
    pub color: [u8; 3],
    /// Consecutive anti-stall checks this marble spent axis-aligned
    #[serde(default)]
    pub stall_streak: u32,
}

impl Marble {
    pub fn new(pos: Vec2, heading: f32, radius: f32, speed: f32, color: [u8; 3]) -> Self {
        Self {
            pos,
            vel: heading_to_vec(heading) * speed,
            radius,
            speed,
            color,
            stall_streak: 0,
        }
    }

    /// Fixed-timestep position integration. Collision handling is separate.
    pub fn advance(&mut self, dt: f32) {
        self.pos += self.vel * dt;
    }

    /// Rescale velocity to the fixed speed, dividing by the *current*
    /// magnitude. A fully degenerate velocity restarts along +x rather than
    /// staying stuck at zero.
    pub fn renormalize(&mut self) {
        let current = self.vel.length();
        if current > 1e-6 {
            self.vel *= self.speed / current;
        } else {
            self.vel = Vec2::new(self.speed, 0.0);
        }
    }

    /// Current heading angle in radians.
    pub fn heading(&self) -> f32 {
        self.vel.y.atan2(self.vel.x)
    }
}

/// Evenly spaced marble colors: one hue step per marble, fixed saturation
/// and value, so any count of racers stays visually distinct.
pub fn marble_colors(count: usize) -> Vec<[u8; 3]> {
    (0..count)
        .map(|i| hsv_to_rgb(i as f32 / count.max(1) as f32, 0.8, 0.9))
        .collect()
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let h = (h.fract() + 1.0).fract() * 6.0;
    let i = h.floor();
    let f = h - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match i as u32 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    [
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_marble_moves_at_speed() {
        let m = Marble::new(Vec2::ZERO, 0.7, 15.0, 175.0, [255, 0, 0]);
        assert!((m.vel.length() - 175.0).abs() < 1e-3);
        assert!((m.heading() - 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_advance_integrates_position() {
        let mut m = Marble::new(Vec2::new(10.0, 20.0), 0.0, 15.0, 100.0, [0, 0, 0]);
        m.advance(0.5);
        assert!((m.pos.x - 60.0).abs() < 1e-4);
        assert!((m.pos.y - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_renormalize_recovers_from_zero_velocity() {
        let mut m = Marble::new(Vec2::ZERO, 0.0, 15.0, 175.0, [0, 0, 0]);
        m.vel = Vec2::ZERO;
        m.renormalize();
        assert!((m.vel.length() - 175.0).abs() < 1e-3);
    }

    #[test]
    fn test_marble_colors_are_distinct() {
        let colors = marble_colors(8);
        assert_eq!(colors.len(), 8);
        for i in 0..colors.len() {
            for j in i + 1..colors.len() {
                assert_ne!(colors[i], colors[j]);
            }
        }
    }

    proptest! {
        #[test]
        fn prop_renormalize_restores_speed(vx in -500.0f32..500.0, vy in -500.0f32..500.0) {
            let mut m = Marble::new(Vec2::ZERO, 0.0, 15.0, 175.0, [0, 0, 0]);
            m.vel = Vec2::new(vx, vy);
            m.renormalize();
            prop_assert!((m.vel.length() - 175.0).abs() < 1e-2);
        }
    }
}
