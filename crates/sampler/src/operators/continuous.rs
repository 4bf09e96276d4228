//! Dirichlet random-walk operators on mixture weights and probability
//! tables (spec.md §4.3.4, §4.3.5).

use rand::Rng;

use crate::config::SamplerConfig;
use crate::data::FeatureSet;
use crate::state::Sample;

use super::{Proposal, dirichlet};

/// Which probability table an `AlterP`/`GibbsP` operator targets. Which
/// area or family row within it is chosen uniformly inside the operator
/// itself, per spec.md §4.3.5/§4.3.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbTarget {
    Global,
    Area,
    Family,
}

/// Perturbs the two-element pair `(row[sa], row[sb])` by a Dirichlet random
/// walk with precision `tau`, holding `row[sa] + row[sb]` and every other
/// entry fixed. Returns the full updated row plus the forward/backward
/// proposal densities.
fn perturb_pair(row: &[f64], sa: usize, sb: usize, tau: f64, rng: &mut impl Rng) -> (Vec<f64>, f64, f64) {
    let pair_sum = row[sa] + row[sb];
    let normalized = [row[sa] / pair_sum, row[sb] / pair_sum];

    let alpha = dirichlet::concentration(&normalized, tau);
    let proposed = dirichlet::sample(&alpha, rng);
    let q = dirichlet::log_pdf(&proposed, &alpha).exp();

    let back_alpha = dirichlet::concentration(&proposed, tau);
    let q_back = dirichlet::log_pdf(&normalized, &back_alpha).exp();

    let mut new_row = row.to_vec();
    new_row[sa] = proposed[0] * pair_sum;
    new_row[sb] = proposed[1] * pair_sum;
    (new_row, q, q_back)
}

/// Picks two distinct indices from `candidates` uniformly at random, order
/// unconstrained (the Dirichlet pair perturbation is symmetric in which
/// slot is `sa` vs `sb`).
fn choose_pair(candidates: &[usize], rng: &mut impl Rng) -> (usize, usize) {
    let i = rng.random_range(0..candidates.len());
    let mut j = rng.random_range(0..candidates.len() - 1);
    if j >= i {
        j += 1;
    }
    (candidates[i], candidates[j])
}

pub fn alter_weights(sample: &Sample, config: &SamplerConfig, rng: &mut impl Rng) -> Proposal {
    let f = rng.random_range(0..sample.n_features());
    let c = sample.n_components();
    let (a, b) = if c == 3 {
        const PAIRS: [(usize, usize); 3] = [(0, 1), (0, 2), (1, 2)];
        PAIRS[rng.random_range(0..3)]
    } else {
        (0, 1)
    };

    let (new_row, q, q_back) = perturb_pair(
        sample.weights_row(f),
        a,
        b,
        config.var_proposal.weights,
        rng,
    );

    let mut proposed = sample.copy();
    proposed.set_weights_row(f, &new_row);
    Proposal {
        sample: proposed,
        q,
        q_back,
    }
}

pub fn alter_p(
    sample: &Sample,
    target: ProbTarget,
    config: &SamplerConfig,
    features: &FeatureSet,
    rng: &mut impl Rng,
) -> Proposal {
    let f = rng.random_range(0..sample.n_features());
    let states: Vec<usize> = features
        .applicable_states(f)
        .iter()
        .enumerate()
        .filter(|(_, &a)| a)
        .map(|(s, _)| s)
        .collect();
    let (sa, sb) = choose_pair(&states, rng);

    let mut proposed = sample.copy();
    match target {
        ProbTarget::Global => {
            let (row, q, q_back) = perturb_pair(
                sample.p_global_row(f),
                sa,
                sb,
                config.var_proposal.universal,
                rng,
            );
            proposed.set_p_global_row(f, &row);
            Proposal {
                sample: proposed,
                q,
                q_back,
            }
        }
        ProbTarget::Area => {
            let z = rng.random_range(0..sample.n_zones());
            let (row, q, q_back) = perturb_pair(
                sample.p_area_row(z, f),
                sa,
                sb,
                config.var_proposal.contact,
                rng,
            );
            proposed.set_p_area_row(z, f, &row);
            Proposal {
                sample: proposed,
                q,
                q_back,
            }
        }
        ProbTarget::Family => {
            let m = rng.random_range(0..sample.n_families());
            let (row, q, q_back) = perturb_pair(
                sample.p_family_row(m, f),
                sa,
                sb,
                config.var_proposal.inheritance,
                rng,
            );
            proposed.set_p_family_row(m, f, &row);
            Proposal {
                sample: proposed,
                q,
                q_back,
            }
        }
    }
}
