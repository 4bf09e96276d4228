//! Initial-state construction (spec.md §4.7): area seeding under
//! connectivity constraints, uniform weights, regularized-MLE probability
//! tables, and a single Gibbs pass to seed sources.

use rand::Rng;
use rand::seq::IteratorRandom;

use crate::config::SamplerConfig;
use crate::data::{Families, FeatureSet};
use crate::error::{SamplerError, SamplerResult};
use crate::operators::gibbs::resample_sources_in_place;
use crate::oracle::Oracle;
use crate::state::Sample;
use geo_graph::Geography;

/// Prior-run outputs copied verbatim into a freshly constructed [`Sample`];
/// any field left `None` is initialized from scratch as in spec.md §4.7.
#[derive(Debug, Clone, Default)]
pub struct WarmStart {
    pub zones: Option<Vec<bool>>,
    pub weights: Option<Vec<f64>>,
    pub p_global: Option<Vec<f64>>,
    pub p_area: Option<Vec<f64>>,
    pub p_family: Option<Vec<f64>>,
}

/// Grows `config.n_zones` disjoint areas of `initial_size`, one at a time
/// from a random free seed, extending via [`Geography::neighbours`]
/// (spec.md §4.7). A stuck growth restarts the *whole* in-progress
/// assignment rather than just the one area, and the `max_growth_attempts`
/// budget is shared across every area — the behavior of
/// `original_source`'s `generate_initial_zones`, which the literal "restart
/// that one area" of spec.md §4.7 undersells; see DESIGN.md. Exhausting the
/// budget surfaces as the fatal [`SamplerError::GrowthStuck`] (spec.md §7).
fn generate_initial_zones(
    config: &SamplerConfig,
    geography: &Geography,
    rng: &mut impl Rng,
) -> SamplerResult<Vec<bool>> {
    let n = geography.node_count();
    let mut attempts = 0usize;

    'restart: loop {
        let mut zones = vec![false; config.n_zones * n];
        let mut occupied = vec![false; n];

        for z in 0..config.n_zones {
            loop {
                attempts += 1;
                if attempts > config.max_growth_attempts {
                    return Err(SamplerError::GrowthStuck { attempts });
                }

                let Some(seed) = (0..n).filter(|&i| !occupied[i]).choose(rng) else {
                    continue 'restart;
                };

                let mut zone_row = vec![false; n];
                zone_row[seed] = true;
                occupied[seed] = true;
                let mut size = 1usize;
                let mut stuck = false;

                while size < config.initial_size {
                    let nbrs = geography.neighbours(&zone_row, &occupied);
                    let Some(site) = (0..n).filter(|&i| nbrs[i]).choose(rng) else {
                        stuck = true;
                        break;
                    };
                    zone_row[site] = true;
                    occupied[site] = true;
                    size += 1;
                }

                if stuck {
                    continue 'restart;
                }

                zones[z * n..(z + 1) * n].copy_from_slice(&zone_row);
                break;
            }
        }

        return Ok(zones);
    }
}

/// Observation counts `Σ X[i,f,:]` over `sites`, used by the regularized
/// MLE below and structurally identical to the Gibbs conditional-count step
/// of spec.md §4.3.7 (there restricted further by the source indicator).
fn counts_over(features: &FeatureSet, f: usize, sites: impl Iterator<Item = usize>) -> Vec<f64> {
    let mut counts = vec![0.0; features.n_states()];
    for i in sites {
        let obs = features.observation(i, f);
        for (c, &x) in counts.iter_mut().zip(obs) {
            *c += x;
        }
    }
    counts
}

/// `+1`-regularized normalized row over the applicable states only (spec.md
/// §4.7): avoids both the undefined all-NaN simplex (zero counts, no
/// regularization) and the singular 0/1 simplex (unregularized MLE with a
/// single observed state).
fn mle_row(counts: &[f64], applicable: &[bool]) -> Vec<f64> {
    let mut row = vec![0.0; counts.len()];
    let mut total = 0.0;
    for (s, &a) in applicable.iter().enumerate() {
        if a {
            row[s] = counts[s] + 1.0;
            total += row[s];
        }
    }
    if total > 0.0 {
        for (s, &a) in applicable.iter().enumerate() {
            if a {
                row[s] /= total;
            }
        }
    }
    row
}

/// Builds the initial `Sample` for one chain (spec.md §4.7): areas, uniform
/// mixture weights, regularized-MLE probability tables for every component
/// kind, and a Gibbs pass to seed the source indicator against those fresh
/// parameters. Any field supplied via `warm_start` is copied in verbatim
/// instead.
#[allow(clippy::too_many_arguments)]
pub fn build_initial_sample(
    chain_index: usize,
    config: &SamplerConfig,
    geography: &Geography,
    features: &FeatureSet,
    families: &Families,
    warm_start: &WarmStart,
    oracle: &mut dyn Oracle,
    rng: &mut impl Rng,
) -> SamplerResult<Sample> {
    let n = geography.node_count();
    let f_count = features.n_features();
    let s_count = features.n_states();
    let c = config.n_components();

    let zones = match &warm_start.zones {
        Some(z) => z.clone(),
        None => generate_initial_zones(config, geography, rng)?,
    };

    let weights = match &warm_start.weights {
        Some(w) => w.clone(),
        None => {
            let mut w = vec![0.0; f_count * c];
            for row in w.chunks_mut(c) {
                row.fill(1.0 / c as f64);
            }
            w
        }
    };

    let p_global = match &warm_start.p_global {
        Some(p) => p.clone(),
        None => {
            let mut p = vec![0.0; f_count * s_count];
            for f in 0..f_count {
                let counts = counts_over(features, f, 0..n);
                let row = mle_row(&counts, features.applicable_states(f));
                p[f * s_count..(f + 1) * s_count].copy_from_slice(&row);
            }
            p
        }
    };

    let p_area = match &warm_start.p_area {
        Some(p) => p.clone(),
        None => {
            let mut p = vec![0.0; config.n_zones * f_count * s_count];
            for z in 0..config.n_zones {
                let members: Vec<usize> = (0..n).filter(|&i| zones[z * n + i]).collect();
                for f in 0..f_count {
                    let counts = counts_over(features, f, members.iter().copied());
                    let row = mle_row(&counts, features.applicable_states(f));
                    let idx = (z * f_count + f) * s_count;
                    p[idx..idx + s_count].copy_from_slice(&row);
                }
            }
            p
        }
    };

    let p_family = match &warm_start.p_family {
        Some(p) => p.clone(),
        None => {
            let mut p = vec![0.0; families.n_families() * f_count * s_count];
            for m in 0..families.n_families() {
                let members: Vec<usize> = families.members(m).collect();
                for f in 0..f_count {
                    let counts = counts_over(features, f, members.iter().copied());
                    let row = mle_row(&counts, features.applicable_states(f));
                    let idx = (m * f_count + f) * s_count;
                    p[idx..idx + s_count].copy_from_slice(&row);
                }
            }
            p
        }
    };

    let source = vec![false; n * f_count * c];
    let mut sample = Sample::new(
        chain_index,
        n,
        config.n_zones,
        f_count,
        s_count,
        families.n_families(),
        c,
        zones,
        weights,
        p_global,
        p_area,
        p_family,
        source,
    );

    resample_sources_in_place(&mut sample, oracle, rng);

    Ok(sample)
}
