//! Sampler configuration (spec.md §6). Plain `serde`-derived structs, in the
//! manner of the teacher's pervasively `Serialize`/`Deserialize`-derived
//! types — a downstream config-file loader (out of scope) deserializes
//! these directly; the kernel only consumes the parsed result.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{SamplerError, SamplerResult};

/// Dirichlet proposal precisions, one per continuous-parameter operator
/// family (spec.md §6: `var_proposal`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarProposal {
    /// τ_w, for `alter_weights`.
    pub weights: f64,
    /// τ_g, for `alter_p_global`.
    pub universal: f64,
    /// τ_a, for `alter_p_area`.
    pub contact: f64,
    /// τ_f, for `alter_p_family`.
    pub inheritance: f64,
}

/// The eleven named operators of spec.md §6, used both as the key of
/// [`OperatorWeights`] and as a tag the driver records per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorName {
    GrowArea,
    ShrinkArea,
    SwapArea,
    AlterWeights,
    AlterPGlobal,
    AlterPArea,
    AlterPFamily,
    GibbsSources,
    GibbsPGlobal,
    GibbsPArea,
    GibbsPFamily,
}

impl OperatorName {
    pub const ALL: [OperatorName; 11] = [
        OperatorName::GrowArea,
        OperatorName::ShrinkArea,
        OperatorName::SwapArea,
        OperatorName::AlterWeights,
        OperatorName::AlterPGlobal,
        OperatorName::AlterPArea,
        OperatorName::AlterPFamily,
        OperatorName::GibbsSources,
        OperatorName::GibbsPGlobal,
        OperatorName::GibbsPArea,
        OperatorName::GibbsPFamily,
    ];
}

/// Operator name → nonnegative weight; missing entries default to 0
/// (spec.md §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorWeights(FxHashMap<OperatorName, f64>);

impl OperatorWeights {
    pub fn new(weights: FxHashMap<OperatorName, f64>) -> Self {
        OperatorWeights(weights)
    }

    pub fn get(&self, name: OperatorName) -> f64 {
        self.0.get(&name).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, name: OperatorName, weight: f64) {
        self.0.insert(name, weight);
    }
}

/// Scalar/vector hyperparameters shared by every operator of a single chain.
/// The warmup coordinator fills these from its per-chain schedule (spec.md
/// §4.6); the production coordinator uses the same type with the same
/// scalar repeated for every chain, per spec.md §9's "model both as the
/// same operator set parameterized by a `ChainParams` record".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Inverse temperature β; 1.0 for the cold chain.
    pub beta: f64,
    pub max_size: usize,
    pub p_connected: f64,
}

/// Sampler-wide configuration (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub n_chains: usize,
    /// K; 0 disables every structural operator.
    pub n_zones: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub initial_size: usize,
    pub p_grow_connected: f64,
    pub var_proposal: VarProposal,
    /// When false: `C=2`, no `p_family`, `alter_weights` operates on both
    /// coordinates, family operators are disabled.
    pub inheritance: bool,
    /// When false: `gibbs_sources` is disabled (oracle marginalizes
    /// sources analytically).
    pub sample_source: bool,
    pub operator_weights: OperatorWeights,
    /// How many steps between MC3 swap proposal rounds (spec.md §4.5).
    pub swap_interval: usize,
    /// Shared retry budget for initial area growth (spec.md §4.7).
    pub max_growth_attempts: usize,
}

impl SamplerConfig {
    pub fn n_components(&self) -> usize {
        if self.inheritance { 3 } else { 2 }
    }

    pub fn validate(&self, n_sites: usize) -> SamplerResult<()> {
        if self.n_chains == 0 {
            return Err(SamplerError::InvalidConfig("n_chains must be >= 1".into()));
        }
        if !(1 <= self.min_size
            && self.min_size <= self.initial_size
            && self.initial_size <= self.max_size
            && self.max_size <= n_sites)
        {
            return Err(SamplerError::InvalidConfig(format!(
                "size bounds must satisfy 1 <= min_size ({}) <= initial_size ({}) <= max_size ({}) <= n_sites ({})",
                self.min_size, self.initial_size, self.max_size, n_sites
            )));
        }
        if !(0.0..=1.0).contains(&self.p_grow_connected) {
            return Err(SamplerError::InvalidConfig(
                "p_grow_connected must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SamplerConfig {
        SamplerConfig {
            n_chains: 1,
            n_zones: 1,
            min_size: 1,
            max_size: 3,
            initial_size: 1,
            p_grow_connected: 1.0,
            var_proposal: VarProposal {
                weights: 10.0,
                universal: 10.0,
                contact: 10.0,
                inheritance: 10.0,
            },
            inheritance: false,
            sample_source: true,
            operator_weights: OperatorWeights::default(),
            swap_interval: 10,
            max_growth_attempts: 1000,
        }
    }

    #[test]
    fn missing_weight_defaults_to_zero() {
        let cfg = base_config();
        assert_eq!(cfg.operator_weights.get(OperatorName::GrowArea), 0.0);
    }

    #[test]
    fn validate_rejects_inverted_size_bounds() {
        let mut cfg = base_config();
        cfg.min_size = 4;
        assert!(cfg.validate(4).is_err());
    }

    #[test]
    fn n_components_follows_inheritance_flag() {
        let mut cfg = base_config();
        assert_eq!(cfg.n_components(), 2);
        cfg.inheritance = true;
        assert_eq!(cfg.n_components(), 3);
    }
}
