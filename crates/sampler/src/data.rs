//! Read-only inputs produced by the (out-of-scope) feature loader: feature
//! observations and their applicable-state masks, and the family partition
//! (spec.md §3, §6). Loaded once per run and shared, unsynchronized, across
//! every chain (spec.md §5: "Shared resources. Read-only: ... features,
//! families").

use crate::error::{SamplerError, SamplerResult};

/// Feature observations `X[N,F,S]` and the per-feature applicable-states
/// mask `A[F,S]`, flattened row-major like [`geo_graph::Csr`]'s adjacency
/// arrays.
///
/// A missing observation at `(i,f)` is represented by an all-zero slice
/// `X[i,f,:]`, per the loader's NaN-propagation rule (spec.md §6); such
/// slices are excluded from MLE counts and Gibbs draws by simply summing to
/// zero everywhere they would otherwise contribute.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    n_sites: usize,
    n_features: usize,
    n_states: usize,
    x: Vec<f64>,
    applicable: Vec<bool>,
}

impl FeatureSet {
    pub fn new(
        n_sites: usize,
        n_features: usize,
        n_states: usize,
        x: Vec<f64>,
        applicable: Vec<bool>,
    ) -> SamplerResult<Self> {
        if x.len() != n_sites * n_features * n_states {
            return Err(SamplerError::InvalidConfig(format!(
                "feature observation array has {} entries, expected {}",
                x.len(),
                n_sites * n_features * n_states
            )));
        }
        if applicable.len() != n_features * n_states {
            return Err(SamplerError::InvalidConfig(format!(
                "applicable-states mask has {} entries, expected {}",
                applicable.len(),
                n_features * n_states
            )));
        }
        for f in 0..n_features {
            let k = applicable[f * n_states..(f + 1) * n_states]
                .iter()
                .filter(|&&a| a)
                .count();
            if k < 2 {
                return Err(SamplerError::InvalidConfig(format!(
                    "feature {f} has only {k} applicable states, need at least 2"
                )));
            }
        }
        Ok(FeatureSet {
            n_sites,
            n_features,
            n_states,
            x,
            applicable,
        })
    }

    pub fn n_sites(&self) -> usize {
        self.n_sites
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// The `S`-length observation slice `X[site,feature,:]`.
    pub fn observation(&self, site: usize, feature: usize) -> &[f64] {
        let base = (site * self.n_features + feature) * self.n_states;
        &self.x[base..base + self.n_states]
    }

    /// The `S`-length applicable-states mask `A[feature,:]`.
    pub fn applicable_states(&self, feature: usize) -> &[bool] {
        &self.applicable[feature * self.n_states..(feature + 1) * self.n_states]
    }

    /// `k_f`, the number of applicable states for `feature`.
    pub fn arity(&self, feature: usize) -> usize {
        self.applicable_states(feature).iter().filter(|&&a| a).count()
    }
}

/// The fixed family partition `Φ[M,N]` (spec.md §3), immutable after load.
#[derive(Debug, Clone)]
pub struct Families {
    n_sites: usize,
    n_families: usize,
    phi: Vec<bool>,
}

impl Families {
    pub fn new(n_sites: usize, n_families: usize, phi: Vec<bool>) -> SamplerResult<Self> {
        if phi.len() != n_families * n_sites {
            return Err(SamplerError::InvalidConfig(format!(
                "family membership mask has {} entries, expected {}",
                phi.len(),
                n_families * n_sites
            )));
        }
        Ok(Families {
            n_sites,
            n_families,
            phi,
        })
    }

    /// No families in use (`inheritance: false`, spec.md §6).
    pub fn none(n_sites: usize) -> Self {
        Families {
            n_sites,
            n_families: 0,
            phi: Vec::new(),
        }
    }

    pub fn n_families(&self) -> usize {
        self.n_families
    }

    pub fn is_member(&self, family: usize, site: usize) -> bool {
        self.phi[family * self.n_sites + site]
    }

    /// The (assumed unique) family containing `site`, if any.
    pub fn family_of(&self, site: usize) -> Option<usize> {
        (0..self.n_families).find(|&m| self.is_member(m, site))
    }

    pub fn members(&self, family: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.n_sites).filter(move |&i| self.is_member(family, i))
    }
}
