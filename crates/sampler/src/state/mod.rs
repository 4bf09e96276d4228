//! The mutable joint state of one chain (spec.md §3, §4.2).

pub mod dirty;

pub use dirty::{Dirty, DirtyField, DirtyFields, EvalKind, IndexDirty};

use crate::data::Families;
use crate::error::{SamplerError, SamplerResult};

/// One chain's full state: area membership, mixture weights, probability
/// tables, source assignment, and the dirty-set tracking what changed since
/// the last oracle evaluation.
///
/// Boolean and real matrices are kept flattened row-major, as in
/// [`geo_graph::Csr`] and [`geo_graph::Geography`]'s distance table, rather
/// than behind an `ndarray`/`nalgebra` dependency the teacher never needed.
#[derive(Debug, Clone)]
pub struct Sample {
    pub chain_index: usize,

    n_sites: usize,
    n_zones: usize,
    n_features: usize,
    n_states: usize,
    n_families: usize,
    n_components: usize,

    /// `(K, N)` row-major area membership `Z`.
    zones: Vec<bool>,
    /// `(F, C)` row-major mixture weights `W`.
    weights: Vec<f64>,
    /// `(F, S)` row-major `P_global[0,:,:]`.
    p_global: Vec<f64>,
    /// `(K, F, S)` row-major `P_area`.
    p_area: Vec<f64>,
    /// `(M, F, S)` row-major `P_family`.
    p_family: Vec<f64>,
    /// `(N, F, C)` row-major source indicator `U`.
    source: Vec<bool>,

    pub dirty: Dirty,
}

impl Sample {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain_index: usize,
        n_sites: usize,
        n_zones: usize,
        n_features: usize,
        n_states: usize,
        n_families: usize,
        n_components: usize,
        zones: Vec<bool>,
        weights: Vec<f64>,
        p_global: Vec<f64>,
        p_area: Vec<f64>,
        p_family: Vec<f64>,
        source: Vec<bool>,
    ) -> Self {
        debug_assert_eq!(zones.len(), n_zones * n_sites);
        debug_assert_eq!(weights.len(), n_features * n_components);
        debug_assert_eq!(p_global.len(), n_features * n_states);
        debug_assert_eq!(p_area.len(), n_zones * n_features * n_states);
        debug_assert_eq!(p_family.len(), n_families * n_features * n_states);
        debug_assert_eq!(source.len(), n_sites * n_features * n_components);

        Sample {
            chain_index,
            n_sites,
            n_zones,
            n_features,
            n_states,
            n_families,
            n_components,
            zones,
            weights,
            p_global,
            p_area,
            p_family,
            source,
            dirty: Dirty::all_dirty(),
        }
    }

    pub fn n_sites(&self) -> usize {
        self.n_sites
    }

    pub fn n_zones(&self) -> usize {
        self.n_zones
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn n_families(&self) -> usize {
        self.n_families
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Returns a deep copy suitable for mutation by an operator (spec.md
    /// §4.2). `Sample` is plain owned data, so this is simply [`Clone`].
    pub fn copy(&self) -> Sample {
        self.clone()
    }

    /// Records a mutation against both halves of the dirty-set (spec.md
    /// §4.2). Operators call this after every mutation they make.
    pub fn mark(&mut self, field: DirtyField) {
        self.dirty.mark(field);
    }

    pub fn clear_dirty(&mut self, kind: EvalKind) {
        self.dirty.clear(kind);
    }

    pub fn zone_row(&self, z: usize) -> &[bool] {
        &self.zones[z * self.n_sites..(z + 1) * self.n_sites]
    }

    fn zone_row_mut(&mut self, z: usize) -> &mut [bool] {
        let n = self.n_sites;
        &mut self.zones[z * n..(z + 1) * n]
    }

    pub fn is_member(&self, z: usize, site: usize) -> bool {
        self.zone_row(z)[site]
    }

    pub fn set_member(&mut self, z: usize, site: usize, value: bool) {
        self.zone_row_mut(z)[site] = value;
        self.mark(DirtyField::Zone(z));
    }

    pub fn zone_size(&self, z: usize) -> usize {
        self.zone_row(z).iter().filter(|&&m| m).count()
    }

    /// Logical OR of every area row: sites already claimed by some area.
    pub fn occupied(&self) -> Vec<bool> {
        let mut occ = vec![false; self.n_sites];
        for z in 0..self.n_zones {
            for (site, &member) in self.zone_row(z).iter().enumerate() {
                occ[site] |= member;
            }
        }
        occ
    }

    pub fn area_of(&self, site: usize) -> Option<usize> {
        (0..self.n_zones).find(|&z| self.is_member(z, site))
    }

    pub fn weights_row(&self, f: usize) -> &[f64] {
        &self.weights[f * self.n_components..(f + 1) * self.n_components]
    }

    pub fn set_weights_row(&mut self, f: usize, row: &[f64]) {
        let c = self.n_components;
        self.weights[f * c..(f + 1) * c].copy_from_slice(row);
        self.mark(DirtyField::Weights);
    }

    pub fn p_global_row(&self, f: usize) -> &[f64] {
        &self.p_global[f * self.n_states..(f + 1) * self.n_states]
    }

    pub fn set_p_global_row(&mut self, f: usize, row: &[f64]) {
        let s = self.n_states;
        self.p_global[f * s..(f + 1) * s].copy_from_slice(row);
        self.mark(DirtyField::PGlobal(f));
    }

    pub fn p_area_row(&self, z: usize, f: usize) -> &[f64] {
        let idx = (z * self.n_features + f) * self.n_states;
        &self.p_area[idx..idx + self.n_states]
    }

    pub fn set_p_area_row(&mut self, z: usize, f: usize, row: &[f64]) {
        let s = self.n_states;
        let idx = (z * self.n_features + f) * s;
        self.p_area[idx..idx + s].copy_from_slice(row);
        self.mark(DirtyField::PArea(z, f));
    }

    pub fn p_family_row(&self, m: usize, f: usize) -> &[f64] {
        let idx = (m * self.n_features + f) * self.n_states;
        &self.p_family[idx..idx + self.n_states]
    }

    pub fn set_p_family_row(&mut self, m: usize, f: usize, row: &[f64]) {
        let s = self.n_states;
        let idx = (m * self.n_features + f) * s;
        self.p_family[idx..idx + s].copy_from_slice(row);
        self.mark(DirtyField::PFamily(m, f));
    }

    pub fn source_row(&self, i: usize, f: usize) -> &[bool] {
        let idx = (i * self.n_features + f) * self.n_components;
        &self.source[idx..idx + self.n_components]
    }

    pub fn set_source_row(&mut self, i: usize, f: usize, row: &[bool]) {
        let c = self.n_components;
        let idx = (i * self.n_features + f) * c;
        self.source[idx..idx + c].copy_from_slice(row);
        // Source resampling is always a Gibbs step (spec.md §4.3.6); it does
        // not by itself dirty weights or probability tables, so no `mark`
        // call here. The oracle reads `source` directly when it needs it.
    }

    /// Checks invariants I1-I3 and the simplex laws of spec.md §8. Called by
    /// the driver after every accepted step and directly by tests.
    pub fn check_invariants(
        &self,
        min_size: usize,
        max_size: usize,
        families: &Families,
        applicable: impl Fn(usize) -> Vec<bool>,
    ) -> SamplerResult<()> {
        for site in 0..self.n_sites {
            let count = (0..self.n_zones).filter(|&z| self.is_member(z, site)).count();
            if count > 1 {
                return Err(SamplerError::InvariantViolation(format!(
                    "site {site} belongs to {count} areas"
                )));
            }
        }

        for z in 0..self.n_zones {
            let size = self.zone_size(z);
            if size < min_size || size > max_size {
                return Err(SamplerError::InvariantViolation(format!(
                    "area {z} has size {size}, outside [{min_size}, {max_size}]"
                )));
            }
        }

        const EPS: f64 = 1e-6;
        for f in 0..self.n_features {
            let sum: f64 = self.weights_row(f).iter().sum();
            if (sum - 1.0).abs() > EPS {
                return Err(SamplerError::InvariantViolation(format!(
                    "weights row for feature {f} sums to {sum}, not 1"
                )));
            }
            let mask = applicable(f);
            check_simplex_row(self.p_global_row(f), &mask, "p_global", f, 0)?;
            for z in 0..self.n_zones {
                check_simplex_row(self.p_area_row(z, f), &mask, "p_area", f, z)?;
            }
            for m in 0..self.n_families {
                check_simplex_row(self.p_family_row(m, f), &mask, "p_family", f, m)?;
            }

            for i in 0..self.n_sites {
                let row = self.source_row(i, f);
                let hot: usize = row.iter().filter(|&&b| b).count();
                if hot != 1 {
                    return Err(SamplerError::InvariantViolation(format!(
                        "source U[{i},{f},:] has {hot} set bits, expected exactly 1"
                    )));
                }
                if row.len() > 1 && row[1] && self.area_of(i).is_none() {
                    return Err(SamplerError::InvariantViolation(format!(
                        "U[{i},{f},1]=1 but site {i} belongs to no area"
                    )));
                }
                if row.len() > 2 && row[2] && families.family_of(i).is_none() {
                    return Err(SamplerError::InvariantViolation(format!(
                        "U[{i},{f},2]=1 but site {i} belongs to no family"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn check_simplex_row(
    row: &[f64],
    applicable: &[bool],
    name: &str,
    feature: usize,
    index: usize,
) -> SamplerResult<()> {
    const EPS: f64 = 1e-6;
    let mut sum = 0.0;
    for (s, &p) in row.iter().enumerate() {
        if applicable[s] {
            sum += p;
        } else if p.abs() > EPS {
            return Err(SamplerError::InvariantViolation(format!(
                "{name}[{index},{feature},{s}] = {p} but state {s} is inapplicable"
            )));
        }
    }
    if (sum - 1.0).abs() > EPS {
        return Err(SamplerError::InvariantViolation(format!(
            "{name}[{index},{feature},:] sums to {sum}, not 1"
        )));
    }
    Ok(())
}
