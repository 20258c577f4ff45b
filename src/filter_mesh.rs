// src/filter_mesh.rs

//! Coarse occupancy grid marking regions likely to contain the curve.

use serde::Serialize;

use crate::bounds::Bounds;
use crate::seed::Seed;

/// A `dim x dim` boolean grid over `bounds`, `dim = 2^filter_mesh_res`.
///
/// A box is marked if it or an orthogonal neighbor contains a seed. The
/// 5-cell plus-shape over-marking guarantees the fine marching pass, which
/// only trusts marked boxes, cannot miss curve segments crossing a box
/// boundary near a seed. The mesh is rebuilt in full every resolution pass
/// (cleared, seeds re-inserted); insertion is monotonic and therefore
/// idempotent per seed set.
#[derive(Debug, Clone, Serialize)]
pub struct FilterMesh {
    dim: usize,
    boxes: Vec<bool>,
    bounds: Bounds,
}

impl FilterMesh {
    /// Creates a cleared mesh of `2^res` boxes per side over `bounds`.
    pub fn new(res: u32, bounds: Bounds) -> Self {
        let dim = 1usize << res;
        FilterMesh {
            dim,
            boxes: vec![false; dim * dim],
            bounds,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn clear(&mut self) {
        self.boxes.fill(false);
    }

    /// Whether the box at `(bx, by)` is marked. Out-of-range coordinates are
    /// unmarked by definition.
    pub fn is_marked(&self, bx: usize, by: usize) -> bool {
        if bx >= self.dim || by >= self.dim {
            return false;
        }
        self.boxes[by * self.dim + bx]
    }

    /// Marks the box containing `seed` and its four orthogonal neighbors.
    ///
    /// A seed whose box index falls exactly one cell outside the grid still
    /// marks its in-bounds neighbors, so curves grazing the viewport edge
    /// keep their boundary boxes. Seeds farther out are ignored.
    pub fn insert(&mut self, seed: &Seed) {
        let dim = self.dim as i64;
        let bx = ((seed.x - self.bounds.xmin) / self.bounds.w() * dim as f64).floor() as i64;
        let by = ((seed.y - self.bounds.ymin) / self.bounds.h() * dim as f64).floor() as i64;

        if bx < -1 || bx > dim || by < -1 || by > dim {
            return;
        }

        for (dx, dy) in [(0, 0), (1, 0), (-1, 0), (0, 1), (0, -1)] {
            let cx = bx + dx;
            let cy = by + dy;
            if cx >= 0 && cx < dim && cy >= 0 && cy < dim {
                self.boxes[(cy * dim + cx) as usize] = true;
            }
        }
    }

    /// Inserts every seed of a generation pass, skipping abandoned samples.
    pub fn insert_all(&mut self, seeds: &[Seed]) {
        for seed in seeds {
            if seed.active {
                self.insert(seed);
            }
        }
        log::trace!(
            "FilterMesh: {} of {} boxes marked after inserting {} seeds",
            self.boxes.iter().filter(|b| **b).count(),
            self.boxes.len(),
            seeds.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_mesh(res: u32) -> FilterMesh {
        FilterMesh::new(res, Bounds::new(0.0, 0.0, 1.0, 1.0))
    }

    fn marked_count(mesh: &FilterMesh) -> usize {
        let mut n = 0;
        for by in 0..mesh.dim() {
            for bx in 0..mesh.dim() {
                if mesh.is_marked(bx, by) {
                    n += 1;
                }
            }
        }
        n
    }

    #[test]
    fn interior_seed_marks_plus_shape() {
        let mut mesh = unit_mesh(3); // 8x8
        // Center of box (4, 4).
        mesh.insert(&Seed::new(0.5625, 0.5625));
        assert_eq!(marked_count(&mesh), 5);
        assert!(mesh.is_marked(4, 4));
        assert!(mesh.is_marked(3, 4));
        assert!(mesh.is_marked(5, 4));
        assert!(mesh.is_marked(4, 3));
        assert!(mesh.is_marked(4, 5));
        assert!(!mesh.is_marked(3, 3));
    }

    #[test]
    fn corner_seed_is_clipped() {
        let mut mesh = unit_mesh(3);
        mesh.insert(&Seed::new(0.01, 0.01)); // box (0, 0)
        assert_eq!(marked_count(&mesh), 3);
        assert!(mesh.is_marked(0, 0));
        assert!(mesh.is_marked(1, 0));
        assert!(mesh.is_marked(0, 1));
    }

    #[test]
    fn one_box_outside_marks_inbounds_neighbors() {
        let mut mesh = unit_mesh(3);
        // Just left of the grid: box index (-1, 4); only the (0, 4) neighbor
        // lands in bounds.
        mesh.insert(&Seed::new(-0.05, 0.5625));
        assert_eq!(marked_count(&mesh), 1);
        assert!(mesh.is_marked(0, 4));
    }

    #[test]
    fn far_outside_seed_is_ignored() {
        let mut mesh = unit_mesh(3);
        mesh.insert(&Seed::new(-0.5, 0.5));
        mesh.insert(&Seed::new(0.5, 3.0));
        assert_eq!(marked_count(&mesh), 0);
    }

    #[test]
    fn insertion_is_idempotent() {
        let mut a = unit_mesh(4);
        let mut b = unit_mesh(4);
        let seeds: Vec<Seed> = (0..20)
            .map(|i| Seed::new(0.05 * i as f64, 1.0 - 0.05 * i as f64))
            .collect();

        a.insert_all(&seeds);
        b.insert_all(&seeds);
        b.insert_all(&seeds); // double insertion never un-marks
        for by in 0..a.dim() {
            for bx in 0..a.dim() {
                assert_eq!(a.is_marked(bx, by), b.is_marked(bx, by));
            }
        }
    }

    #[test]
    fn abandoned_seeds_are_skipped() {
        let mut mesh = unit_mesh(3);
        let mut s = Seed::new(0.5, 0.5);
        s.active = false;
        mesh.insert_all(&[s]);
        assert_eq!(marked_count(&mesh), 0);
    }
}
