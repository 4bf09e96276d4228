//! Gibbs operators: source resampling and per-component probability table
//! resampling (spec.md §4.3.6, §4.3.7). Both are encoded as `q=0, q_back=1`
//! — "always accept" (spec.md §9 Design Notes) — so the driver special-
//! cases them rather than computing a ratio.

use rand::Rng;

use crate::data::{Families, FeatureSet};
use crate::oracle::Oracle;
use crate::state::Sample;

use super::continuous::ProbTarget;
use super::{Proposal, dirichlet};

fn draw_categorical(probs: &[f64], rng: &mut impl Rng) -> usize {
    let u: f64 = rng.random();
    let mut cumulative = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumulative += p;
        if u < cumulative {
            return i;
        }
    }
    probs.len() - 1
}

/// Resamples `U` in place against the oracle's current likelihoods and
/// effective weights (spec.md §4.3.6). Used both as the standalone
/// `gibbs_sources` operator and as the immediate resample that grow/shrink/
/// swap trigger on the site they just touched.
pub fn resample_sources_in_place(sample: &mut Sample, oracle: &mut dyn Oracle, rng: &mut impl Rng) {
    let likelihoods = oracle.update_component_likelihoods(sample);
    let weights = oracle.update_weights(sample);
    let c = sample.n_components();

    for i in 0..sample.n_sites() {
        for f in 0..sample.n_features() {
            let l = likelihoods.row(i, f);
            let w = weights.row(i, f);
            let unnorm: Vec<f64> = (0..c).map(|comp| w[comp] * l[comp]).collect();
            let total: f64 = unnorm.iter().sum();

            let probs = if total > 0.0 {
                unnorm.iter().map(|&p| p / total).collect::<Vec<_>>()
            } else {
                // No component explains this observation under the current
                // parameters. Falls back to a uniform draw over components
                // with nonzero mixture weight so `set_source_row` still sees
                // a one-hot vector; a real oracle should make this
                // unreachable by construction (spec.md §4.3.6's "strictly
                // positive product" requirement).
                let applicable_count = w.iter().filter(|&&wi| wi > 0.0).count().max(1);
                w.iter()
                    .map(|&wi| if wi > 0.0 { 1.0 / applicable_count as f64 } else { 0.0 })
                    .collect()
            };

            let chosen = draw_categorical(&probs, rng);
            let mut row = vec![false; c];
            row[chosen] = true;
            sample.set_source_row(i, f, &row);
        }
    }
}

pub fn gibbs_sources(sample: &Sample, oracle: &mut dyn Oracle, rng: &mut impl Rng) -> Proposal {
    let mut proposed = sample.copy();
    resample_sources_in_place(&mut proposed, oracle, rng);
    Proposal::gibbs(proposed)
}

fn features_with_arity(features: &FeatureSet, k: usize) -> Vec<usize> {
    (0..features.n_features())
        .filter(|&f| features.arity(f) == k)
        .collect()
}

/// The conditional posterior of one component's probability row, given
/// observation counts `counts[s]` attributed to that component
/// (spec.md §4.3.7): `Dir(1 + n)` restricted to the applicable states,
/// probability 0 elsewhere.
fn dirichlet_posterior_row(counts: &[f64], applicable: &[bool], rng: &mut impl Rng) -> Vec<f64> {
    let applicable_idx: Vec<usize> = applicable
        .iter()
        .enumerate()
        .filter(|(_, &a)| a)
        .map(|(s, _)| s)
        .collect();
    let sub_alpha: Vec<f64> = applicable_idx.iter().map(|&s| 1.0 + counts[s]).collect();
    let sub_draw = dirichlet::sample(&sub_alpha, rng);

    let mut row = vec![0.0; counts.len()];
    for (slot, &s) in applicable_idx.iter().enumerate() {
        row[s] = sub_draw[slot];
    }
    row
}

/// Resamples every feature sharing one randomly chosen arity `k`, under one
/// randomly chosen component index, from its Dirichlet(1+n) conditional
/// posterior (spec.md §4.3.7). Grouping by arity lets every matching
/// feature draw from a Dirichlet of the same dimension; the net effect
/// across many steps covers every row, as required.
pub fn gibbs_p(
    sample: &Sample,
    target: ProbTarget,
    features: &FeatureSet,
    families: &Families,
    rng: &mut impl Rng,
) -> Proposal {
    let anchor_feature = rng.random_range(0..sample.n_features());
    let k = features.arity(anchor_feature);
    let group = features_with_arity(features, k);

    let mut proposed = sample.copy();
    match target {
        ProbTarget::Global => {
            for &f in &group {
                let applicable = features.applicable_states(f);
                let mut counts = vec![0.0; sample.n_states()];
                for i in 0..sample.n_sites() {
                    if sample.source_row(i, f)[0] {
                        let obs = features.observation(i, f);
                        for (c, &x) in counts.iter_mut().zip(obs) {
                            *c += x;
                        }
                    }
                }
                let row = dirichlet_posterior_row(&counts, applicable, rng);
                proposed.set_p_global_row(f, &row);
            }
        }
        ProbTarget::Area => {
            let z = rng.random_range(0..sample.n_zones());
            for &f in &group {
                let applicable = features.applicable_states(f);
                let mut counts = vec![0.0; sample.n_states()];
                for i in 0..sample.n_sites() {
                    if !sample.is_member(z, i) {
                        continue;
                    }
                    if sample.source_row(i, f).get(1).copied().unwrap_or(false) {
                        let obs = features.observation(i, f);
                        for (c, &x) in counts.iter_mut().zip(obs) {
                            *c += x;
                        }
                    }
                }
                let row = dirichlet_posterior_row(&counts, applicable, rng);
                proposed.set_p_area_row(z, f, &row);
            }
        }
        ProbTarget::Family => {
            let m = rng.random_range(0..sample.n_families());
            for &f in &group {
                let applicable = features.applicable_states(f);
                let mut counts = vec![0.0; sample.n_states()];
                for i in families.members(m) {
                    if sample.source_row(i, f).get(2).copied().unwrap_or(false) {
                        let obs = features.observation(i, f);
                        for (c, &x) in counts.iter_mut().zip(obs) {
                            *c += x;
                        }
                    }
                }
                let row = dirichlet_posterior_row(&counts, applicable, rng);
                proposed.set_p_family_row(m, f, &row);
            }
        }
    }

    Proposal::gibbs(proposed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::ReferenceOracle;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn gibbs_sources_produces_one_hot_rows() {
        // S3: F=1, S=2, two sites, one in the area, one not.
        let features =
            FeatureSet::new(2, 1, 2, vec![1.0, 0.0, 0.0, 1.0], vec![true, true]).unwrap();
        let families = Families::none(2);
        let mut oracle = ReferenceOracle::new(&features, &families);
        let sample = Sample::new(
            0, 2, 1, 1, 2, 0, 2,
            vec![true, false],
            vec![0.5, 0.5],
            vec![0.5, 0.5],
            vec![0.5, 0.5],
            vec![],
            vec![true, false, true, false],
        );
        let mut rng = SmallRng::seed_from_u64(42);
        let proposal = gibbs_sources(&sample, &mut oracle, &mut rng);
        assert_eq!(proposal.q, 0.0);
        assert_eq!(proposal.q_back, 1.0);
        for i in 0..2 {
            let row = proposal.sample.source_row(i, 0);
            assert_eq!(row.iter().filter(|&&b| b).count(), 1);
        }
        // Site 1 does not belong to any area: only the global component may fire.
        assert!(proposal.sample.source_row(1, 0)[0]);
    }
}
