//! Height field storage and carving primitives
//!
//! A row-major grid of density values. Cells above the solid threshold are
//! terrain, cells at or below it are open space. All mutation happens here,
//! during generation; once wrapped into an obstacle the field is never
//! touched again.
//!
//! Every carving primitive silently clips out-of-grid coordinates. Reads
//! outside the grid return fully solid, the conservative default.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Density written into fully carved-open cells
const OPEN: f32 = 0.0;
/// Density written into fully solid cells
const SOLID: f32 = 1.0;
/// Soft falloff density for the one-cell anti-aliasing ring around carves
const FALLOFF: f32 = 0.3;

/// 2D grid of density values in (conceptually) [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightField {
    width: usize,
    height: usize,
    cells: Vec<f32>,
}

impl HeightField {
    /// All-solid field, the starting point for carving.
    pub fn solid(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![SOLID; width * height],
        }
    }

    /// All-open field, used for the border-only arena at complexity zero.
    pub fn open(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![OPEN; width * height],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && (x as usize) < self.width && y >= 0 && (y as usize) < self.height
    }

    /// Density at a cell; out-of-grid reads as fully solid.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> f32 {
        if self.in_bounds(x, y) {
            self.cells[y as usize * self.width + x as usize]
        } else {
            SOLID
        }
    }

    /// Write a cell; out-of-grid writes are ignored.
    #[inline]
    pub fn set(&mut self, x: i32, y: i32, value: f32) {
        if self.in_bounds(x, y) {
            self.cells[y as usize * self.width + x as usize] = value;
        }
    }

    /// A cell is solid terrain iff its density exceeds the threshold.
    #[inline]
    pub fn is_solid(&self, x: i32, y: i32, threshold: f32) -> bool {
        self.get(x, y) > threshold
    }

    /// Clamp all densities back into [0, 1] after unbounded carving math.
    pub fn clamp_values(&mut self) {
        for v in &mut self.cells {
            *v = v.clamp(OPEN, SOLID);
        }
    }

    // --- carving primitives ---

    /// Open a disc, with a one-cell soft falloff ring to reduce aliasing.
    pub fn carve_circle(&mut self, cx: f32, cy: f32, radius: f32) {
        let r = radius.max(0.0);
        let x0 = (cx - r).floor() as i32 - 2;
        let x1 = (cx + r).ceil() as i32 + 2;
        let y0 = (cy - r).floor() as i32 - 2;
        let y1 = (cy + r).ceil() as i32 + 2;

        for y in y0..=y1 {
            for x in x0..=x1 {
                if !self.in_bounds(x, y) {
                    continue;
                }
                let dist = Vec2::new(x as f32 - cx, y as f32 - cy).length();
                if dist <= r {
                    self.set(x, y, OPEN);
                } else if dist <= r + 1.0 {
                    let v = self.get(x, y);
                    self.set(x, y, v.min(FALLOFF));
                }
            }
        }
    }

    /// Carve a thin segment of the given length from `(cx, cy)` along `angle`.
    pub fn carve_elongated(&mut self, cx: f32, cy: f32, size: f32, angle: f32) {
        let dir = Vec2::new(angle.cos(), angle.sin());
        let steps = (size.ceil() as i32).max(1);
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let p = Vec2::new(cx, cy) + dir * (t * size);
            self.carve_circle(p.x, p.y, 2.0);
        }
    }

    /// Carve a quadratic Bézier path between two grid points.
    ///
    /// The control point is the chord midpoint displaced by `ctrl_offset`;
    /// sampling density is proportional to the chord length so thin channels
    /// stay gap-free.
    pub fn carve_curved_path(&mut self, start: Vec2, end: Vec2, width: f32, ctrl_offset: Vec2) {
        let control = (start + end) * 0.5 + ctrl_offset;
        let chord = (end - start).length();
        let samples = ((chord * 1.5) as usize).max(20);

        for i in 0..=samples {
            let t = i as f32 / samples as f32;
            let u = 1.0 - t;
            let p = start * (u * u) + control * (2.0 * u * t) + end * (t * t);
            self.carve_circle(p.x, p.y, width * 0.5);
        }
    }

    /// Carve a straight tunnel between two cells (connectivity repair).
    pub fn carve_line(&mut self, start: (i32, i32), end: (i32, i32), width: f32) {
        let a = Vec2::new(start.0 as f32, start.1 as f32);
        let b = Vec2::new(end.0 as f32, end.1 as f32);
        let steps = ((b - a).length().ceil() as i32).max(1);
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let p = a.lerp(b, t);
            self.carve_circle(p.x, p.y, width);
        }
    }

    /// Force a border band of the given cell width to fully solid.
    pub fn solidify_border(&mut self, width_cells: usize) {
        let w = width_cells.min(self.width).min(self.height);
        for band in 0..w {
            for x in 0..self.width as i32 {
                self.set(x, band as i32, SOLID);
                self.set(x, self.height as i32 - 1 - band as i32, SOLID);
            }
            for y in 0..self.height as i32 {
                self.set(band as i32, y, SOLID);
                self.set(self.width as i32 - 1 - band as i32, y, SOLID);
            }
        }
    }

    /// Raise a solid island disc, taking the max with existing density and
    /// fading toward the rim so islands read as organic bumps, not stamps.
    pub fn raise_island(&mut self, cx: f32, cy: f32, radius: f32) {
        let r = radius.max(0.5);
        let x0 = (cx - r).floor() as i32 - 1;
        let x1 = (cx + r).ceil() as i32 + 1;
        let y0 = (cy - r).floor() as i32 - 1;
        let y1 = (cy + r).ceil() as i32 + 1;

        for y in y0..=y1 {
            for x in x0..=x1 {
                if !self.in_bounds(x, y) {
                    continue;
                }
                let dist = Vec2::new(x as f32 - cx, y as f32 - cy).length();
                if dist <= r {
                    let height = 0.6 + 0.4 * (1.0 - dist / r);
                    let v = self.get(x, y);
                    self.set(x, y, v.max(height));
                }
            }
        }
    }

    // --- smoothing and morphology ---

    /// Center-weighted 3x3 blur. Border cells are left untouched so the
    /// enclosing wall never softens below the solid threshold.
    pub fn smooth(&mut self, iterations: usize, strength: f32) {
        let strength = strength.clamp(0.0, 1.0);
        for _ in 0..iterations {
            let snapshot = self.cells.clone();
            for y in 1..self.height as i32 - 1 {
                for x in 1..self.width as i32 - 1 {
                    let mut total = 0.0;
                    let mut weight_sum = 0.0;
                    for dy in -1i32..=1 {
                        for dx in -1i32..=1 {
                            let weight = match dx.abs() + dy.abs() {
                                0 => 4.0,
                                1 => 2.0,
                                _ => 1.0,
                            };
                            let idx = (y + dy) as usize * self.width + (x + dx) as usize;
                            total += snapshot[idx] * weight;
                            weight_sum += weight;
                        }
                    }
                    let smoothed = total / weight_sum;
                    let original = snapshot[y as usize * self.width + x as usize];
                    self.set(x, y, original * (1.0 - strength) + smoothed * strength);
                }
            }
        }
    }

    /// Morphological erosion: each interior cell takes the 3x3 minimum.
    pub fn erode(&mut self, iterations: usize) {
        self.morph(iterations, f32::min);
    }

    /// Morphological dilation: each interior cell takes the 3x3 maximum.
    pub fn dilate(&mut self, iterations: usize) {
        self.morph(iterations, f32::max);
    }

    fn morph(&mut self, iterations: usize, select: fn(f32, f32) -> f32) {
        for _ in 0..iterations {
            let snapshot = self.cells.clone();
            for y in 1..self.height as i32 - 1 {
                for x in 1..self.width as i32 - 1 {
                    let mut acc = snapshot[y as usize * self.width + x as usize];
                    for dy in -1..=1 {
                        for dx in -1..=1 {
                            let idx = (y + dy) as usize * self.width + (x + dx) as usize;
                            acc = select(acc, snapshot[idx]);
                        }
                    }
                    self.set(x, y, acc);
                }
            }
        }
    }

    /// Clear solid cells with at most two solid cells in their 3x3
    /// neighborhood (counting themselves): isolated aliasing flecks.
    pub fn remove_solid_flecks(&mut self, threshold: f32) {
        let snapshot = self.clone();
        for y in 1..self.height as i32 - 1 {
            for x in 1..self.width as i32 - 1 {
                if !snapshot.is_solid(x, y, threshold) {
                    continue;
                }
                let mut solid_neighbors = 0;
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        if snapshot.is_solid(x + dx, y + dy, threshold) {
                            solid_neighbors += 1;
                        }
                    }
                }
                if solid_neighbors <= 2 {
                    self.set(x, y, OPEN);
                }
            }
        }
    }

    /// Lower terrain around open cells pinched between walls on two or more
    /// sides, widening passages a marble would otherwise scrape through.
    pub fn widen_narrow_passages(&mut self, threshold: f32) {
        let snapshot = self.clone();
        for y in 2..self.height as i32 - 2 {
            for x in 2..self.width as i32 - 2 {
                if snapshot.is_solid(x, y, threshold) {
                    continue;
                }
                if snapshot.is_narrow_passage(x, y, threshold) {
                    self.widen_at(x, y, threshold);
                }
            }
        }
    }

    fn is_narrow_passage(&self, x: i32, y: i32, threshold: f32) -> bool {
        let mut walls = 0;
        for (dx, dy) in [(0, 1), (0, -1), (1, 0), (-1, 0)] {
            for dist in 1..3 {
                if self.is_solid(x + dx * dist, y + dy * dist, threshold) {
                    walls += 1;
                    break;
                }
            }
        }
        walls >= 2
    }

    fn widen_at(&mut self, x: i32, y: i32, threshold: f32) {
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if !self.in_bounds(nx, ny) || !self.is_solid(nx, ny, threshold) {
                    continue;
                }
                let dist = ((dx * dx + dy * dy) as f32).sqrt();
                if dist <= 1.5 {
                    let reduction = 0.3 * (1.5 - dist) / 1.5;
                    self.set(nx, ny, (self.get(nx, ny) - reduction).max(0.1));
                }
            }
        }
    }

    // --- connectivity analysis ---

    /// All disjoint open regions (4-connected flood fill), in scan order.
    pub fn open_regions(&self, threshold: f32) -> Vec<Vec<(i32, i32)>> {
        let mut visited = vec![false; self.width * self.height];
        let mut regions = Vec::new();

        for start_y in 0..self.height as i32 {
            for start_x in 0..self.width as i32 {
                let start_idx = start_y as usize * self.width + start_x as usize;
                if visited[start_idx] || self.is_solid(start_x, start_y, threshold) {
                    continue;
                }

                let mut region = Vec::new();
                let mut stack = vec![(start_x, start_y)];
                while let Some((x, y)) = stack.pop() {
                    if !self.in_bounds(x, y) {
                        continue;
                    }
                    let idx = y as usize * self.width + x as usize;
                    if visited[idx] || self.is_solid(x, y, threshold) {
                        continue;
                    }
                    visited[idx] = true;
                    region.push((x, y));
                    stack.push((x - 1, y));
                    stack.push((x + 1, y));
                    stack.push((x, y - 1));
                    stack.push((x, y + 1));
                }
                regions.push(region);
            }
        }

        regions
    }

    /// Overwrite every cell of a region with one density.
    pub fn fill_region(&mut self, region: &[(i32, i32)], value: f32) {
        for &(x, y) in region {
            self.set(x, y, value);
        }
    }

    /// Fraction of cells within `radius` of the center that are open space.
    pub fn openness_ratio(&self, cx: f32, cy: f32, radius: f32, threshold: f32) -> f32 {
        let r = radius.max(1.0);
        let mut open = 0u32;
        let mut total = 0u32;
        for y in (cy - r).floor() as i32..=(cy + r).ceil() as i32 {
            for x in (cx - r).floor() as i32..=(cx + r).ceil() as i32 {
                if Vec2::new(x as f32 - cx, y as f32 - cy).length() > r {
                    continue;
                }
                total += 1;
                if !self.is_solid(x, y, threshold) {
                    open += 1;
                }
            }
        }
        if total == 0 {
            0.0
        } else {
            open as f32 / total as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: f32 = 0.3;

    #[test]
    fn test_out_of_grid_reads_solid_writes_ignored() {
        let mut field = HeightField::open(8, 8);
        assert_eq!(field.get(-1, 0), SOLID);
        assert_eq!(field.get(0, 100), SOLID);
        field.set(-5, -5, 0.5); // must not panic
        assert!(field.is_solid(-5, -5, T));
    }

    #[test]
    fn test_carve_circle_opens_disc_with_falloff() {
        let mut field = HeightField::solid(20, 20);
        field.carve_circle(10.0, 10.0, 3.0);
        assert_eq!(field.get(10, 10), OPEN);
        assert_eq!(field.get(12, 10), OPEN);
        // One-cell falloff ring just outside the radius
        assert!(field.get(14, 10) <= FALLOFF);
        // Far cells untouched
        assert_eq!(field.get(1, 1), SOLID);
    }

    #[test]
    fn test_carve_circle_clips_at_edges() {
        let mut field = HeightField::solid(10, 10);
        field.carve_circle(0.0, 0.0, 4.0);
        assert_eq!(field.get(0, 0), OPEN);
        assert_eq!(field.get(9, 9), SOLID);
    }

    #[test]
    fn test_carve_curved_path_opens_both_endpoints() {
        let mut field = HeightField::solid(64, 64);
        let start = Vec2::new(4.0, 4.0);
        let end = Vec2::new(60.0, 58.0);
        field.carve_curved_path(start, end, 4.0, Vec2::new(8.0, -6.0));
        assert!(!field.is_solid(4, 4, T));
        assert!(!field.is_solid(60, 58, T));
        // The carved channel is one connected region within the solid mass.
        let regions = field.open_regions(T);
        assert_eq!(regions.len(), 1);
    }

    #[test]
    fn test_solidify_border_encloses_field() {
        let mut field = HeightField::open(16, 12);
        field.solidify_border(2);
        for x in 0..16 {
            assert!(field.is_solid(x, 0, T));
            assert!(field.is_solid(x, 1, T));
            assert!(field.is_solid(x, 11, T));
        }
        for y in 0..12 {
            assert!(field.is_solid(0, y, T));
            assert!(field.is_solid(15, y, T));
        }
        assert!(!field.is_solid(8, 6, T));
    }

    #[test]
    fn test_open_regions_finds_disjoint_pockets() {
        let mut field = HeightField::solid(20, 20);
        field.carve_circle(5.0, 5.0, 2.0);
        field.carve_circle(15.0, 15.0, 2.0);
        let regions = field.open_regions(T);
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|r| !r.is_empty()));
    }

    #[test]
    fn test_carve_line_joins_pockets() {
        let mut field = HeightField::solid(20, 20);
        field.carve_circle(5.0, 5.0, 2.0);
        field.carve_circle(15.0, 15.0, 2.0);
        field.carve_line((5, 5), (15, 15), 1.5);
        assert_eq!(field.open_regions(T).len(), 1);
    }

    #[test]
    fn test_fill_region_closes_pocket() {
        let mut field = HeightField::solid(20, 20);
        field.carve_circle(5.0, 5.0, 2.0);
        let regions = field.open_regions(T);
        field.fill_region(&regions[0], SOLID);
        assert!(field.open_regions(T).is_empty());
    }

    #[test]
    fn test_erode_then_dilate_strips_fleck() {
        let mut field = HeightField::open(16, 16);
        // A single solid cell disappears under erosion and never comes back.
        field.set(8, 8, SOLID);
        field.erode(1);
        field.dilate(1);
        assert!(!field.is_solid(8, 8, T));
    }

    #[test]
    fn test_remove_solid_flecks() {
        let mut field = HeightField::open(16, 16);
        field.set(8, 8, SOLID);
        field.remove_solid_flecks(T);
        assert!(!field.is_solid(8, 8, T));
    }

    #[test]
    fn test_widen_narrow_passages_only_lowers_terrain() {
        let mut field = HeightField::solid(24, 24);
        // A one-cell-wide corridor
        for x in 2..22 {
            field.set(x, 12, OPEN);
        }
        let before = field.clone();
        field.widen_narrow_passages(T);
        for y in 0..24 {
            for x in 0..24 {
                assert!(field.get(x, y) <= before.get(x, y) + 1e-6);
            }
        }
        // The corridor walls got carved down somewhere.
        assert!(field != before);
    }

    #[test]
    fn test_openness_ratio() {
        let field = HeightField::open(20, 20);
        assert!(field.openness_ratio(10.0, 10.0, 4.0, T) > 0.99);
        let solid = HeightField::solid(20, 20);
        assert!(solid.openness_ratio(10.0, 10.0, 4.0, T) < 0.01);
    }

    #[test]
    fn test_smooth_rounds_edges_keeps_border() {
        let mut field = HeightField::solid(20, 20);
        field.carve_circle(10.0, 10.0, 4.0);
        field.smooth(2, 0.8);
        // Interior of the carve is still open, deep solid still solid
        assert!(field.get(10, 10) < T);
        assert_eq!(field.get(0, 0), SOLID);
        // Values stay finite and in a sane band
        for y in 0..20 {
            for x in 0..20 {
                let v = field.get(x, y);
                assert!(v.is_finite() && (0.0..=1.0).contains(&v));
            }
        }
    }
}
