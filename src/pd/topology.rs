// SPDX-License-Identifier: AGPL-3.0-only

//! Bond topology: per-particle families within the horizon.
//!
//! Families are stored CSR-style (`family_offsets`, `family_neighbors`),
//! sorted by neighbor index, so the same geometry always produces the same
//! slot and bond ordering on every backend. Each unordered pair is stored
//! once as a [`Bond`]; both endpoint slots point at the same bond id, and
//! the bond's `broken` flag is the only state that changes after build.

use crate::error::{PeridynError, Result};
use crate::pd::celllist::CellList;
use crate::pd::config::SimConfig;
use crate::pd::geometry::Geometry;
use crate::tolerances::{DEGENERATE_SEPARATION_REL, HORIZON_REL};
use std::sync::atomic::{AtomicBool, Ordering};

/// Initial-crack predicate on two reference coordinates: `true` cuts the pair.
pub type CrackPredicate = dyn Fn(&[f64], &[f64]) -> bool + Send + Sync;

/// Bond-type predicate on two reference coordinates (index into per-type tables).
pub type BondTypeFn = dyn Fn(&[f64], &[f64]) -> usize + Send + Sync;

/// One bond between particles `i < j`.
#[derive(Clone, Debug, PartialEq)]
pub struct Bond {
    pub i: u32,
    pub j: u32,
    /// |X_j − X_i|, never zero.
    pub reference_length: f64,
    /// Micromodulus c of this bond's type.
    pub stiffness: f64,
    /// Stretch at which the bond breaks.
    pub critical_stretch: f64,
}

/// Candidate family of one particle before assembly.
pub(crate) struct FamilyScan {
    pub neighbors: Vec<u32>,
    pub pre_cut: usize,
    pub degenerate: usize,
}

/// Neighbor search inputs shared by the sequential and parallel builders.
pub(crate) struct FamilySearch<'a> {
    pub geometry: &'a Geometry,
    pub cells: CellList,
    pub horizon: f64,
    pub cutoff: f64,
    pub crack: Option<&'a CrackPredicate>,
    pub strict: bool,
}

impl<'a> FamilySearch<'a> {
    pub fn new(
        geometry: &'a Geometry,
        horizon: f64,
        crack: Option<&'a CrackPredicate>,
        strict: bool,
    ) -> Self {
        let cutoff = bond_cutoff(horizon);
        Self {
            geometry,
            cells: CellList::build(geometry.coords(), geometry.dim(), cutoff),
            horizon,
            cutoff,
            crack,
            strict,
        }
    }

    /// Sorted family of particle `i`.
    pub fn scan(&self, i: usize) -> Result<FamilyScan> {
        let xi = self.geometry.coord(i);
        let min_separation = self.horizon * DEGENERATE_SEPARATION_REL;
        let mut out = FamilyScan {
            neighbors: Vec::new(),
            pre_cut: 0,
            degenerate: 0,
        };
        let mut failure = None;
        self.cells.for_each_candidate(xi, |j| {
            if j == i || failure.is_some() {
                return;
            }
            let xj = self.geometry.coord(j);
            let r = distance(xi, xj);
            if r > self.cutoff {
                return;
            }
            if r < min_separation {
                if self.strict {
                    failure = Some(PeridynError::DegenerateBond {
                        i: i.min(j),
                        j: i.max(j),
                    });
                }
                out.degenerate += 1;
                return;
            }
            // Evaluate in index order so the predicate sees each pair one way.
            let (lo, hi) = if i < j { (xi, xj) } else { (xj, xi) };
            if self.crack.is_some_and(|cut| cut(lo, hi)) {
                out.pre_cut += 1;
                return;
            }
            out.neighbors.push(j as u32);
        });
        if let Some(err) = failure {
            return Err(err);
        }
        out.neighbors.sort_unstable();
        Ok(out)
    }
}

/// Largest separation that still forms a bond for this horizon.
#[must_use]
pub fn bond_cutoff(horizon: f64) -> f64 {
    horizon * (1.0 + HORIZON_REL)
}

/// Euclidean distance between two points of equal dimension.
#[must_use]
pub fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (y - x) * (y - x))
        .sum::<f64>()
        .sqrt()
}

/// Static neighbor structure plus live breakage flags.
#[derive(Debug)]
pub struct BondTopology {
    n_particles: usize,
    family_offsets: Vec<usize>,
    family_neighbors: Vec<u32>,
    family_bonds: Vec<u32>,
    bonds: Vec<Bond>,
    broken: Vec<AtomicBool>,
    pre_cut: usize,
    degenerate: usize,
}

impl BondTopology {
    /// Sequential build: scan each particle's family in index order.
    pub fn build(
        geometry: &Geometry,
        config: &SimConfig,
        crack: Option<&CrackPredicate>,
        bond_type: Option<&BondTypeFn>,
    ) -> Result<Self> {
        let search = FamilySearch::new(geometry, config.horizon, crack, config.strict_geometry);
        let families = (0..geometry.len())
            .map(|i| search.scan(i))
            .collect::<Result<Vec<_>>>()?;
        Self::assemble(geometry, config, families, bond_type)
    }

    /// Turn per-particle families into CSR arrays and the bond table.
    pub(crate) fn assemble(
        geometry: &Geometry,
        config: &SimConfig,
        families: Vec<FamilyScan>,
        bond_type: Option<&BondTypeFn>,
    ) -> Result<Self> {
        let n = geometry.len();
        let mut family_offsets = Vec::with_capacity(n + 1);
        family_offsets.push(0usize);
        let mut pre_cut = 0;
        let mut degenerate = 0;
        for f in &families {
            family_offsets.push(family_offsets[family_offsets.len() - 1] + f.neighbors.len());
            pre_cut += f.pre_cut;
            degenerate += f.degenerate;
        }
        let family_neighbors: Vec<u32> = families.into_iter().flat_map(|f| f.neighbors).collect();
        let mut family_bonds = vec![0u32; family_neighbors.len()];
        let mut bonds = Vec::with_capacity(family_neighbors.len() / 2);

        for i in 0..n {
            for slot in family_offsets[i]..family_offsets[i + 1] {
                let j = family_neighbors[slot] as usize;
                if j > i {
                    let (xi, xj) = (geometry.coord(i), geometry.coord(j));
                    let t = bond_type.map_or(0, |f| f(xi, xj));
                    let lookup = |name: &str, value: Option<f64>| {
                        value.ok_or_else(|| {
                            PeridynError::InvalidConfig(format!(
                                "bond ({i}, {j}) has type {t} but {name} defines {} types",
                                config.bond_type_count()
                            ))
                        })
                    };
                    family_bonds[slot] = bonds.len() as u32;
                    bonds.push(Bond {
                        i: i as u32,
                        j: j as u32,
                        reference_length: distance(xi, xj),
                        stiffness: lookup("bond_stiffness", config.bond_stiffness.value(t))?,
                        critical_stretch: lookup(
                            "critical_stretch",
                            config.critical_stretch.value(t),
                        )?,
                    });
                } else {
                    let partner = &family_neighbors[family_offsets[j]..family_offsets[j + 1]];
                    let back = partner.binary_search(&(i as u32)).map_err(|_| {
                        PeridynError::GeometryMismatch(format!(
                            "asymmetric families: {j} is a neighbor of {i} but not vice versa"
                        ))
                    })?;
                    family_bonds[slot] = family_bonds[family_offsets[j] + back];
                }
            }
        }

        if degenerate > 0 {
            log::warn!(
                "topology: {} coincident particle pairs treated as pre-cut",
                degenerate / 2
            );
        }
        let broken = (0..bonds.len()).map(|_| AtomicBool::new(false)).collect();
        let topology = Self {
            n_particles: n,
            family_offsets,
            family_neighbors,
            family_bonds,
            bonds,
            broken,
            pre_cut: pre_cut / 2,
            degenerate: degenerate / 2,
        };
        log::info!(
            "topology: {} particles, {} bonds, {} pre-cut by crack, mean family {:.1}",
            topology.n_particles,
            topology.bond_count(),
            topology.pre_cut,
            topology.mean_family_size()
        );
        Ok(topology)
    }

    /// Number of particles.
    #[must_use]
    pub const fn n_particles(&self) -> usize {
        self.n_particles
    }

    /// Number of stored bonds (live and broken).
    #[must_use]
    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    /// All bonds, indexed by bond id.
    #[must_use]
    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    /// Neighbor indices of particle `i`, ascending.
    #[must_use]
    pub fn family(&self, i: usize) -> &[u32] {
        &self.family_neighbors[self.family_offsets[i]..self.family_offsets[i + 1]]
    }

    /// Bond ids of particle `i`'s family, aligned with [`Self::family`].
    #[must_use]
    pub fn family_bond_ids(&self, i: usize) -> &[u32] {
        &self.family_bonds[self.family_offsets[i]..self.family_offsets[i + 1]]
    }

    /// CSR offsets (length n + 1).
    #[must_use]
    pub fn family_offsets(&self) -> &[usize] {
        &self.family_offsets
    }

    /// Whether bond `b` has broken.
    #[must_use]
    pub fn is_broken(&self, b: usize) -> bool {
        self.broken[b].load(Ordering::Relaxed)
    }

    /// Break bond `b`; `true` only for the call that made the transition.
    pub fn break_bond(&self, b: usize) -> bool {
        self.broken[b]
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Number of broken bonds.
    #[must_use]
    pub fn broken_count(&self) -> usize {
        self.broken
            .iter()
            .filter(|b| b.load(Ordering::Relaxed))
            .count()
    }

    /// Live (unbroken) neighbors of particle `i`.
    pub fn live_family(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        self.family(i)
            .iter()
            .zip(self.family_bond_ids(i))
            .filter(|(_, &b)| !self.is_broken(b as usize))
            .map(|(&j, _)| j as usize)
    }

    /// Broken fraction of particle `i`'s family; 0 for an empty family.
    #[must_use]
    pub fn damage(&self, i: usize) -> f64 {
        let ids = self.family_bond_ids(i);
        if ids.is_empty() {
            return 0.0;
        }
        let broken = ids.iter().filter(|&&b| self.is_broken(b as usize)).count();
        broken as f64 / ids.len() as f64
    }

    /// Pairs within the horizon removed by the crack predicate.
    #[must_use]
    pub const fn pre_cut_count(&self) -> usize {
        self.pre_cut
    }

    /// Coincident pairs removed as degenerate.
    #[must_use]
    pub const fn degenerate_count(&self) -> usize {
        self.degenerate
    }

    /// Average family size.
    #[must_use]
    pub fn mean_family_size(&self) -> f64 {
        if self.n_particles == 0 {
            return 0.0;
        }
        self.family_neighbors.len() as f64 / self.n_particles as f64
    }

    /// Broken flags as 0.0 / 1.0 for checkpointing.
    #[must_use]
    pub fn broken_flags(&self) -> Vec<f64> {
        self.broken
            .iter()
            .map(|b| f64::from(u8::from(b.load(Ordering::Relaxed))))
            .collect()
    }

    /// Restore broken flags from a checkpoint. Flags only ever go false → true.
    pub fn restore_broken(&self, flags: &[f64]) -> Result<()> {
        if flags.len() != self.bonds.len() {
            return Err(PeridynError::Persistence(format!(
                "checkpoint has {} bond flags, topology has {} bonds",
                flags.len(),
                self.bonds.len()
            )));
        }
        for (b, &flag) in flags.iter().enumerate() {
            if flag != 0.0 {
                self.break_bond(b);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pd::config::pull_apart_2d;

    fn grid(spacing: f64) -> Geometry {
        Geometry::rectangular_grid(&[1.0, 0.5], spacing).expect("grid")
    }

    #[test]
    fn families_are_symmetric_and_within_horizon() {
        let g = grid(0.05);
        let config = pull_apart_2d();
        let topo = BondTopology::build(&g, &config, None, None).expect("build");
        for i in 0..g.len() {
            for &j in topo.family(i) {
                let j = j as usize;
                assert_ne!(i, j);
                assert!(distance(g.coord(i), g.coord(j)) <= bond_cutoff(config.horizon));
                assert!(topo.family(j).contains(&(i as u32)), "{i}→{j} not mirrored");
            }
        }
        let slots: usize = (0..g.len()).map(|i| topo.family(i).len()).sum();
        assert_eq!(slots, 2 * topo.bond_count());
    }

    #[test]
    fn matches_all_pairs_scan() {
        let g = grid(0.05);
        let config = pull_apart_2d();
        let topo = BondTopology::build(&g, &config, None, None).expect("build");
        for i in 0..g.len() {
            let brute: Vec<u32> = (0..g.len())
                .filter(|&j| {
                    j != i && distance(g.coord(i), g.coord(j)) <= bond_cutoff(config.horizon)
                })
                .map(|j| j as u32)
                .collect();
            assert_eq!(topo.family(i), brute.as_slice(), "particle {i}");
        }
    }

    #[test]
    fn mirrored_particles_have_equal_family_sizes() {
        // Horizon is exactly four spacings: a whole shell sits on the cutoff.
        let g = grid(0.025);
        let topo = BondTopology::build(&g, &pull_apart_2d(), None, None).expect("build");
        let key = |x: &[f64]| ((x[0] * 1e6).round() as i64, (x[1] * 1e6).round() as i64);
        let index: std::collections::HashMap<_, _> =
            (0..g.len()).map(|i| (key(g.coord(i)), i)).collect();
        for i in 0..g.len() {
            let x = g.coord(i);
            let j = index[&key(&[1.0 - x[0], x[1]])];
            assert_eq!(
                topo.family(i).len(),
                topo.family(j).len(),
                "particle {i} vs mirror {j}"
            );
        }
    }

    #[test]
    fn far_apart_clusters_build_without_a_dense_grid() {
        let coords = vec![
            0.0, 0.0, 0.0, 0.05, 0.0, 0.0, //
            1000.0, 1000.0, 1000.0, 1000.05, 1000.0, 1000.0,
        ];
        let g = Geometry::new(3, coords, vec![1e-4; 4]).expect("geometry");
        let topo = BondTopology::build(&g, &pull_apart_2d(), None, None).expect("build");
        assert_eq!(topo.bond_count(), 2);
        assert_eq!(topo.family(0), &[1]);
        assert_eq!(topo.family(2), &[3]);
    }

    #[test]
    fn slots_point_at_the_same_bond() {
        let g = grid(0.05);
        let topo = BondTopology::build(&g, &pull_apart_2d(), None, None).expect("build");
        for i in 0..g.len() {
            for (&j, &b) in topo.family(i).iter().zip(topo.family_bond_ids(i)) {
                let bond = &topo.bonds()[b as usize];
                let pair = (bond.i as usize, bond.j as usize);
                assert!(pair == (i, j as usize) || pair == (j as usize, i));
                assert!(bond.reference_length > 0.0);
            }
        }
    }

    #[test]
    fn break_bond_is_irreversible_and_idempotent() {
        let g = grid(0.1);
        let topo = BondTopology::build(&g, &pull_apart_2d(), None, None).expect("build");
        assert!(topo.break_bond(0), "first break transitions");
        assert!(!topo.break_bond(0), "second break is a no-op");
        assert!(topo.is_broken(0));
        assert_eq!(topo.broken_count(), 1);
        let bond = &topo.bonds()[0];
        assert!(topo.damage(bond.i as usize) > 0.0);
        assert!(!topo.live_family(bond.i as usize).any(|j| j == bond.j as usize));
    }

    #[test]
    fn coincident_particles_pre_cut_or_rejected() {
        let coords = vec![0.0, 0.0, 0.0, 0.0, 0.05, 0.0];
        let g = Geometry::new(2, coords, vec![1e-3; 3]).expect("geometry");
        let mut config = pull_apart_2d();
        let topo = BondTopology::build(&g, &config, None, None).expect("lenient");
        assert_eq!(topo.degenerate_count(), 1);
        assert_eq!(topo.bond_count(), 2, "0-2 and 1-2 survive");

        config.strict_geometry = true;
        let err = BondTopology::build(&g, &config, None, None).expect_err("strict");
        assert!(matches!(err, PeridynError::DegenerateBond { i: 0, j: 1 }));
    }

    #[test]
    fn per_type_material_lookup() {
        let g = grid(0.1);
        let mut config = pull_apart_2d();
        config.bond_stiffness = crate::pd::config::MaterialParam::PerType(vec![1.0, 2.0]);
        config.critical_stretch = crate::pd::config::MaterialParam::PerType(vec![0.1, 0.2]);
        let upper_half = |a: &[f64], b: &[f64]| usize::from(a[1] > 0.25 && b[1] > 0.25);
        let topo = BondTopology::build(&g, &config, None, Some(&upper_half as &BondTypeFn))
            .expect("build");
        for bond in topo.bonds() {
            let expected = if bond.stiffness > 1.5 { 0.2 } else { 0.1 };
            assert!((bond.critical_stretch - expected).abs() < 1e-15);
        }
        assert!(topo.bonds().iter().any(|b| b.stiffness > 1.5));

        let out_of_range = |_: &[f64], _: &[f64]| 5usize;
        let err = BondTopology::build(&g, &config, None, Some(&out_of_range as &BondTypeFn))
            .expect_err("type 5");
        assert!(err.is_config_error());
    }
}
