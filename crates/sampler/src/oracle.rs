//! The posterior oracle interface (spec.md §6) and a minimal reference
//! implementation used to drive the end-to-end tests of spec.md §8.
//!
//! The oracle's actual numeric evaluator — the real prior and likelihood
//! math — is explicitly out of scope (spec.md §1: "treated as pluggable
//! callable oracles — the sampler consumes them but does not define their
//! math"). [`ReferenceOracle`] exists only so the kernel is testable without
//! a full statistical model plugged in; it recomputes everything on every
//! call rather than exploiting the dirty-set, which a production oracle
//! would do instead.

use tracing::{instrument, trace};

use crate::data::{Families, FeatureSet};
use crate::error::SamplerResult;
use crate::state::{EvalKind, Sample};

/// Per-observation, per-component likelihood `L[N,F,C]` and effective
/// mixture weights `W_eff[N,F,C]`, both row-major flattened.
#[derive(Debug, Clone)]
pub struct ComponentTable {
    pub n_sites: usize,
    pub n_features: usize,
    pub n_components: usize,
    values: Vec<f64>,
}

impl ComponentTable {
    fn new(n_sites: usize, n_features: usize, n_components: usize) -> Self {
        ComponentTable {
            n_sites,
            n_features,
            n_components,
            values: vec![0.0; n_sites * n_features * n_components],
        }
    }

    pub fn row(&self, site: usize, feature: usize) -> &[f64] {
        let idx = (site * self.n_features + feature) * self.n_components;
        &self.values[idx..idx + self.n_components]
    }

    fn row_mut(&mut self, site: usize, feature: usize) -> &mut [f64] {
        let c = self.n_components;
        let idx = (site * self.n_features + feature) * c;
        &mut self.values[idx..idx + c]
    }
}

/// The sampler's view of the posterior evaluator (spec.md §6).
pub trait Oracle {
    /// Per-observation, per-component likelihood of the data under the
    /// current `Sample`.
    fn update_component_likelihoods(&mut self, sample: &Sample) -> ComponentTable;

    /// Effective mixture weights at each site, with components that don't
    /// apply at that site (no area, no family) masked to zero.
    fn update_weights(&mut self, sample: &Sample) -> ComponentTable;

    /// Total log-likelihood of `sample`, respecting its dirty-set.
    fn log_likelihood(&mut self, sample: &mut Sample) -> f64;

    /// Total log-prior of `sample`, respecting its dirty-set.
    fn log_prior(&mut self, sample: &mut Sample) -> f64;

    fn clear_dirty(&mut self, sample: &mut Sample, kind: EvalKind) {
        sample.clear_dirty(kind);
    }
}

/// A from-scratch oracle over the actual data, sufficient to drive and
/// assert on small end-to-end scenarios. Not a statement about what the
/// real evaluator should compute — only that *some* consistent evaluator
/// exists for testing the kernel around it.
#[derive(Debug, Clone)]
pub struct ReferenceOracle<'a> {
    features: &'a FeatureSet,
    families: &'a Families,
}

impl<'a> ReferenceOracle<'a> {
    pub fn new(features: &'a FeatureSet, families: &'a Families) -> Self {
        ReferenceOracle { features, families }
    }
}

impl Oracle for ReferenceOracle<'_> {
    #[instrument(skip(self, sample))]
    fn update_component_likelihoods(&mut self, sample: &Sample) -> ComponentTable {
        let mut table = ComponentTable::new(
            sample.n_sites(),
            sample.n_features(),
            sample.n_components(),
        );
        for site in 0..sample.n_sites() {
            let area = sample.area_of(site);
            let family = self.families.family_of(site);
            for f in 0..sample.n_features() {
                let obs = self.features.observation(site, f);
                let row = table.row_mut(site, f);
                row[0] = dot(obs, sample.p_global_row(f));
                if let Some(z) = area {
                    if row.len() > 1 {
                        row[1] = dot(obs, sample.p_area_row(z, f));
                    }
                }
                if let Some(m) = family {
                    if row.len() > 2 {
                        row[2] = dot(obs, sample.p_family_row(m, f));
                    }
                }
            }
        }
        trace!(sites = sample.n_sites(), "recomputed component likelihoods");
        table
    }

    fn update_weights(&mut self, sample: &Sample) -> ComponentTable {
        let mut table = ComponentTable::new(
            sample.n_sites(),
            sample.n_features(),
            sample.n_components(),
        );
        for site in 0..sample.n_sites() {
            let has_area = sample.area_of(site).is_some();
            let has_family = self.families.family_of(site).is_some();
            for f in 0..sample.n_features() {
                let w = sample.weights_row(f);
                let row = table.row_mut(site, f);
                row[0] = w[0];
                if row.len() > 1 {
                    row[1] = if has_area { w[1] } else { 0.0 };
                }
                if row.len() > 2 {
                    row[2] = if has_family { w[2] } else { 0.0 };
                }
            }
        }
        table
    }

    #[instrument(skip(self, sample))]
    fn log_likelihood(&mut self, sample: &mut Sample) -> f64 {
        let likelihoods = self.update_component_likelihoods(sample);
        let mut total = 0.0;
        for site in 0..sample.n_sites() {
            for f in 0..sample.n_features() {
                let l = likelihoods.row(site, f);
                let u = sample.source_row(site, f);
                let p: f64 = u
                    .iter()
                    .zip(l.iter())
                    .filter(|(&on, _)| on)
                    .map(|(_, &l)| l)
                    .sum();
                total += if p > 0.0 { p.ln() } else { f64::NEG_INFINITY };
            }
        }
        self.clear_dirty(sample, EvalKind::Likelihood);
        total
    }

    /// Flat (improper) prior: every simplex row of a symmetric Dirichlet(1,
    /// ..., 1) has constant density, so the log-prior is 0 regardless of
    /// state. Sufficient for acceptance-ratio tests where only the
    /// likelihood and proposal-density terms are expected to move.
    fn log_prior(&mut self, sample: &mut Sample) -> f64 {
        self.clear_dirty(sample, EvalKind::Prior);
        0.0
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> (FeatureSet, Families) {
        let features =
            FeatureSet::new(2, 1, 2, vec![1.0, 0.0, 0.0, 1.0], vec![true, true]).unwrap();
        let families = Families::none(2);
        (features, families)
    }

    #[test]
    fn likelihood_uses_area_component_when_present() {
        let (features, families) = toy();
        let oracle_data = (features, families);
        let mut oracle = ReferenceOracle::new(&oracle_data.0, &oracle_data.1);
        let mut sample = Sample::new(
            0, 2, 1, 1, 2, 0, 2,
            vec![true, false],
            vec![0.5, 0.5],
            vec![0.5, 0.5],
            vec![0.9, 0.1],
            vec![],
            vec![false, true, true, false],
        );
        let ll = oracle.log_likelihood(&mut sample);
        assert!(ll.is_finite());
    }
}
