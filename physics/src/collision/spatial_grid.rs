//! Uniform grid broadphase over fixed world bounds

use super::Aabb;
use glam::Vec2;

/// Uniform grid. Static bodies live in persistent cell lists, moving bodies
/// are cleared and re-inserted every step.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    origin: Vec2,
    cols: usize,
    rows: usize,
    static_cells: Vec<Vec<(usize, Aabb)>>,
    dynamic_cells: Vec<Vec<(usize, Aabb)>>,
    /// Cells holding at least one moving body this step
    occupied: Vec<usize>,
}

/// Cells per axis are capped so a tiny cell size cannot exhaust memory
const MAX_CELLS_PER_AXIS: usize = 4096;

impl SpatialGrid {
    /// Create a grid covering `[min, max]` with square cells
    pub fn new(cell_size: f32, min: Vec2, max: Vec2) -> Self {
        let extent = (max - min).max(Vec2::splat(cell_size));
        let cols = ((extent.x / cell_size).ceil() as usize).clamp(1, MAX_CELLS_PER_AXIS);
        let rows = ((extent.y / cell_size).ceil() as usize).clamp(1, MAX_CELLS_PER_AXIS);
        Self {
            cell_size,
            origin: min,
            cols,
            rows,
            static_cells: vec![Vec::new(); cols * rows],
            dynamic_cells: vec![Vec::new(); cols * rows],
            occupied: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Convert world position to cell coordinates, clamped to the grid edge
    fn world_to_cell(&self, pos: Vec2) -> (usize, usize) {
        let local = (pos - self.origin) / self.cell_size;
        let clamp = |v: f32, n: usize| -> usize {
            if v.is_nan() || v < 0.0 {
                0
            } else {
                (v.floor() as usize).min(n - 1)
            }
        };
        (clamp(local.x, self.cols), clamp(local.y, self.rows))
    }

    fn cell_range(&self, aabb: &Aabb) -> impl Iterator<Item = usize> + '_ {
        let (x0, y0) = self.world_to_cell(aabb.min);
        let (x1, y1) = self.world_to_cell(aabb.max);
        let cols = self.cols;
        (y0..=y1).flat_map(move |y| (x0..=x1).map(move |x| y * cols + x))
    }

    /// Insert a body that never moves
    pub fn insert_static(&mut self, body: usize, aabb: Aabb) {
        let cells: Vec<usize> = self.cell_range(&aabb).collect();
        for cell in cells {
            self.static_cells[cell].push((body, aabb));
        }
    }

    /// Remove a static body from every cell it was registered in
    pub fn remove_static(&mut self, body: usize) {
        for cell in &mut self.static_cells {
            cell.retain(|&(b, _)| b != body);
        }
    }

    /// Drop all moving bodies before re-insertion
    pub fn clear_dynamic(&mut self) {
        for &cell in &self.occupied {
            self.dynamic_cells[cell].clear();
        }
        self.occupied.clear();
    }

    pub fn insert_dynamic(&mut self, body: usize, aabb: Aabb) {
        let cells: Vec<usize> = self.cell_range(&aabb).collect();
        for cell in cells {
            if self.dynamic_cells[cell].is_empty() {
                self.occupied.push(cell);
            }
            self.dynamic_cells[cell].push((body, aabb));
        }
    }

    /// Overlapping pairs harvested per occupied cell. Static-static pairs are
    /// never produced; duplicates across cells are left for the caller to
    /// sort and dedup.
    pub fn collect_pairs(&self, out: &mut Vec<(usize, usize)>) {
        for &cell in &self.occupied {
            let moving = &self.dynamic_cells[cell];
            for (i, (a, aabb_a)) in moving.iter().enumerate() {
                for (b, aabb_b) in &moving[i + 1..] {
                    if a != b && aabb_a.overlaps(aabb_b) {
                        out.push(((*a).min(*b), (*a).max(*b)));
                    }
                }
                for (b, aabb_b) in &self.static_cells[cell] {
                    if a != b && aabb_a.overlaps(aabb_b) {
                        out.push(((*a).min(*b), (*a).max(*b)));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f32, y: f32, half: f32) -> Aabb {
        Aabb::from_center_half_extents(Vec2::new(x, y), Vec2::splat(half))
    }

    #[test]
    fn test_spatial_grid_pairs() {
        let mut grid = SpatialGrid::new(10.0, Vec2::splat(-100.0), Vec2::splat(100.0));
        assert_eq!(grid.dimensions(), (20, 20));

        grid.insert_static(0, square(0.0, -50.0, 60.0));
        grid.insert_static(1, square(5.0, -50.0, 60.0));
        grid.insert_dynamic(2, square(0.0, 15.0, 6.0));
        grid.insert_dynamic(3, square(8.0, 15.0, 6.0));
        grid.insert_dynamic(4, square(80.0, 80.0, 1.0));

        let mut pairs = Vec::new();
        grid.collect_pairs(&mut pairs);
        pairs.sort_unstable();
        pairs.dedup();
        // Statics reach y = 10, bodies 2 and 3 start at y = 9
        assert_eq!(pairs, vec![(0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn test_out_of_range_bodies_clamp_to_edge_cells() {
        let mut grid = SpatialGrid::new(10.0, Vec2::ZERO, Vec2::splat(50.0));
        grid.insert_dynamic(0, square(1000.0, 1000.0, 1.0));
        grid.insert_dynamic(1, square(1000.5, 1000.0, 1.0));
        let mut pairs = Vec::new();
        grid.collect_pairs(&mut pairs);
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn test_clear_dynamic_keeps_statics() {
        let mut grid = SpatialGrid::new(10.0, Vec2::ZERO, Vec2::splat(50.0));
        grid.insert_static(0, square(25.0, 25.0, 3.0));
        grid.insert_dynamic(1, square(25.0, 25.0, 3.0));
        grid.clear_dynamic();
        grid.insert_dynamic(2, square(26.0, 25.0, 3.0));

        let mut pairs = Vec::new();
        grid.collect_pairs(&mut pairs);
        assert_eq!(pairs, vec![(0, 2)]);
    }
}
