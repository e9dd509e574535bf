//! Coherent 2D value noise
//!
//! Raw material for organic terrain shapes. Lattice corners are hashed to
//! pseudo-random values and blended with smoothstep-weighted bilinear
//! interpolation. Pure functions of their inputs: no state, no RNG stream,
//! bit-stable across runs.

/// Hash a lattice corner to a value in [-1, 1].
#[inline]
fn lattice_value(xi: i32, yi: i32) -> f32 {
    let mut h = ((xi.wrapping_mul(374_761_393)) ^ (yi.wrapping_mul(668_265_263))) & 0x7FFF_FFFF;
    h = h.wrapping_mul(1_103_515_245).wrapping_add(12345) & 0x7FFF_FFFF;
    (h as f32 / 0x7FFF_FFFF as f32) * 2.0 - 1.0
}

#[inline]
fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// Value noise at `(x, y)` with the given frequency scale, in [-1, 1].
pub fn value_noise(x: f32, y: f32, scale: f32) -> f32 {
    let xs = x * scale;
    let ys = y * scale;

    let x0 = xs.floor() as i32;
    let y0 = ys.floor() as i32;
    let fx = xs - x0 as f32;
    let fy = ys - y0 as f32;

    let n00 = lattice_value(x0, y0);
    let n10 = lattice_value(x0 + 1, y0);
    let n01 = lattice_value(x0, y0 + 1);
    let n11 = lattice_value(x0 + 1, y0 + 1);

    let sx = smoothstep(fx);
    let sy = smoothstep(fy);

    let nx0 = n00 + sx * (n10 - n00);
    let nx1 = n01 + sx * (n11 - n01);
    nx0 + sy * (nx1 - nx0)
}

/// Multi-octave value noise, normalized back to [-1, 1].
///
/// Each octave doubles frequency and scales amplitude by `persistence`.
pub fn octave_noise(x: f32, y: f32, octaves: u32, persistence: f32, scale: f32) -> f32 {
    let mut value = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = scale;
    let mut total_amplitude = 0.0;

    for _ in 0..octaves.max(1) {
        value += value_noise(x, y, frequency) * amplitude;
        total_amplitude += amplitude;
        amplitude *= persistence;
        frequency *= 2.0;
    }

    value / total_amplitude
}
