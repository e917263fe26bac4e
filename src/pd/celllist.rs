// SPDX-License-Identifier: AGPL-3.0-only

//! Uniform-grid cell list for neighbor search.
//!
//! Particles are binned into cubic cells of side ≥ horizon, so every
//! neighbor of a particle lies in its own cell or one of the 3^D − 1
//! adjacent cells. Build is bin → count → exclusive scan → scatter;
//! queries touch O(neighbors) particles instead of all N.

/// Upper bound on grid cells per binned particle.
pub const MAX_CELLS_PER_PARTICLE: usize = 4;

/// CPU cell list over a bounded (non-periodic) domain.
#[derive(Clone, Debug)]
pub struct CellList {
    pub dim: usize,
    pub origin: [f64; 3],
    pub cell_size: f64,
    pub n_cells: [usize; 3],
    pub n_cells_total: usize,
    pub cell_start: Vec<u32>,
    pub cell_count: Vec<u32>,
    pub sorted_indices: Vec<usize>,
}

impl CellList {
    /// Bin `positions` (flat, stride `dim`) into cells of side at least
    /// `cell_size`. The side doubles while the grid would exceed
    /// [`MAX_CELLS_PER_PARTICLE`] cells per particle.
    #[must_use]
    pub fn build(positions: &[f64], dim: usize, cell_size: f64) -> Self {
        let n = positions.len() / dim;
        let mut origin = [0.0; 3];
        let mut upper = [0.0; 3];
        for k in 0..dim {
            let (lo, hi) = positions
                .iter()
                .skip(k)
                .step_by(dim)
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                    (lo.min(x), hi.max(x))
                });
            if n > 0 {
                origin[k] = lo;
                upper[k] = hi;
            }
        }

        // Sparse clouds over a wide box: coarsen until the grid is O(n).
        let cap = (MAX_CELLS_PER_PARTICLE * n.max(1)) as f64;
        let cells_along = |k: usize, size: f64| ((upper[k] - origin[k]) / size).floor() + 1.0;
        let mut cell_size = cell_size;
        while (0..dim).map(|k| cells_along(k, cell_size)).product::<f64>() > cap {
            cell_size *= 2.0;
        }

        let mut n_cells = [1usize; 3];
        for k in 0..dim {
            n_cells[k] = cells_along(k, cell_size) as usize;
        }
        let n_cells_total = n_cells.iter().product();

        let mut list = Self {
            dim,
            origin,
            cell_size,
            n_cells,
            n_cells_total,
            cell_start: vec![0u32; n_cells_total],
            cell_count: vec![0u32; n_cells_total],
            sorted_indices: Vec::with_capacity(n),
        };

        let cell_ids: Vec<usize> = positions
            .chunks_exact(dim)
            .map(|p| list.cell_id(list.cell_coords(p)))
            .collect();

        for &c in &cell_ids {
            list.cell_count[c] += 1;
        }
        let mut offset = 0u32;
        for c in 0..n_cells_total {
            list.cell_start[c] = offset;
            offset += list.cell_count[c];
        }

        // Stable sort keeps ascending particle order inside each cell.
        let mut indices: Vec<usize> = (0..n).collect();
        indices.sort_by_key(|&i| cell_ids[i]);
        list.sorted_indices = indices;
        list
    }

    /// Integer cell coordinates of a point, clamped into the grid.
    #[must_use]
    pub fn cell_coords(&self, p: &[f64]) -> [usize; 3] {
        let mut c = [0usize; 3];
        for k in 0..self.dim {
            let raw = ((p[k] - self.origin[k]) / self.cell_size).floor();
            c[k] = (raw.max(0.0) as usize).min(self.n_cells[k] - 1);
        }
        c
    }

    /// Linear cell index, x fastest.
    #[must_use]
    pub const fn cell_id(&self, c: [usize; 3]) -> usize {
        c[0] + c[1] * self.n_cells[0] + c[2] * self.n_cells[0] * self.n_cells[1]
    }

    /// Particles binned into one cell.
    #[must_use]
    pub fn cell_members(&self, cell: usize) -> &[usize] {
        let start = self.cell_start[cell] as usize;
        let count = self.cell_count[cell] as usize;
        &self.sorted_indices[start..start + count]
    }

    /// Visit every particle in the cell of `p` and its adjacent cells.
    ///
    /// Candidates still need a distance test; the visit order is
    /// deterministic but not sorted by particle index.
    pub fn for_each_candidate(&self, p: &[f64], mut visit: impl FnMut(usize)) {
        let home = self.cell_coords(p);
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        for k in 0..3 {
            if k < self.dim {
                lo[k] = home[k].saturating_sub(1);
                hi[k] = (home[k] + 1).min(self.n_cells[k] - 1);
            }
        }
        for cz in lo[2]..=hi[2] {
            for cy in lo[1]..=hi[1] {
                for cx in lo[0]..=hi[0] {
                    for &j in self.cell_members(self.cell_id([cx, cy, cz])) {
                        visit(j);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice_2d(nx: usize, ny: usize, a: f64) -> Vec<f64> {
        let mut pos = Vec::with_capacity(nx * ny * 2);
        for iy in 0..ny {
            for ix in 0..nx {
                pos.push(ix as f64 * a);
                pos.push(iy as f64 * a);
            }
        }
        pos
    }

    #[test]
    fn every_particle_binned_once() {
        let pos = lattice_2d(10, 7, 0.1);
        let cl = CellList::build(&pos, 2, 0.25);
        assert_eq!(cl.sorted_indices.len(), 70);
        let total: u32 = cl.cell_count.iter().sum();
        assert_eq!(total, 70);
        let mut seen = cl.sorted_indices.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..70).collect::<Vec<_>>());
    }

    #[test]
    fn cell_start_is_exclusive_scan() {
        let pos = lattice_2d(8, 8, 0.1);
        let cl = CellList::build(&pos, 2, 0.3);
        let mut expected = 0u32;
        for c in 0..cl.n_cells_total {
            assert_eq!(cl.cell_start[c], expected, "cell {c}");
            expected += cl.cell_count[c];
        }
    }

    #[test]
    fn candidates_cover_all_neighbors_within_cell_size() {
        let pos = lattice_2d(12, 9, 0.1);
        let cutoff = 0.25;
        let cl = CellList::build(&pos, 2, cutoff);
        let n = pos.len() / 2;
        for i in 0..n {
            let pi = &pos[i * 2..i * 2 + 2];
            let mut candidates = Vec::new();
            cl.for_each_candidate(pi, |j| candidates.push(j));
            for j in 0..n {
                let dx = pos[j * 2] - pi[0];
                let dy = pos[j * 2 + 1] - pi[1];
                if (dx * dx + dy * dy).sqrt() <= cutoff {
                    assert!(candidates.contains(&j), "{j} missing for {i}");
                }
            }
        }
    }

    #[test]
    fn three_dimensional_bins() {
        let mut pos = Vec::new();
        for iz in 0..4 {
            for iy in 0..4 {
                for ix in 0..4 {
                    pos.extend_from_slice(&[f64::from(ix), f64::from(iy), f64::from(iz)]);
                }
            }
        }
        let cl = CellList::build(&pos, 3, 1.5);
        assert_eq!(cl.n_cells, [3, 3, 3]);
        let mut count = 0;
        cl.for_each_candidate(&[0.0, 0.0, 0.0], |_| count += 1);
        assert_eq!(count, 27, "corner cell + neighbors hold 3×3×3 points");
    }

    #[test]
    fn sparse_clusters_keep_the_grid_small() {
        let pos = [
            0.0, 0.0, 0.0, 0.05, 0.0, 0.0, //
            1000.0, 1000.0, 1000.0, 1000.05, 1000.0, 1000.0,
        ];
        let cl = CellList::build(&pos, 3, 0.1);
        assert!(cl.n_cells_total <= MAX_CELLS_PER_PARTICLE * 4, "{:?}", cl.n_cells);
        assert!(cl.cell_size >= 0.1);
        let mut near = Vec::new();
        cl.for_each_candidate(&pos[..3], |j| near.push(j));
        assert!(near.contains(&1), "close pair still adjacent");
        near.clear();
        cl.for_each_candidate(&pos[6..9], |j| near.push(j));
        assert!(near.contains(&3));
    }
}
