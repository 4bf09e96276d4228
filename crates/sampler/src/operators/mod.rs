//! The proposal kernels (spec.md §4.3): a tagged variant over operator
//! families with a uniform `propose` contract, per spec.md §9 Design
//! Notes' "prefer a tagged variant `Operator = Grow | Shrink | Swap |
//! AlterWeights | AlterP(target) | GibbsSources | GibbsP(target)`".

pub mod area;
pub mod continuous;
pub mod dirichlet;
pub mod gibbs;

pub use continuous::ProbTarget;

use rand::Rng;

use crate::config::{ChainParams, OperatorName, SamplerConfig};
use crate::data::{Families, FeatureSet};
use crate::oracle::Oracle;
use crate::state::Sample;
use geo_graph::Geography;

/// Every operator proposes `(Sample', q, q_back)` (spec.md §4.3).
#[derive(Debug)]
pub struct Proposal {
    pub sample: Sample,
    pub q: f64,
    pub q_back: f64,
}

impl Proposal {
    /// A structural operator that could not proceed returns the unchanged
    /// input with `q=1, q_back=0`, forcing the driver to reject
    /// (spec.md §4.3, §7 `OperatorBlocked`).
    pub fn rejected(sample: Sample) -> Self {
        Proposal {
            sample,
            q: 1.0,
            q_back: 0.0,
        }
    }

    /// A Gibbs step is always accepted by convention (spec.md §4.3.6,
    /// §9 Design Notes).
    pub fn gibbs(sample: Sample) -> Self {
        Proposal {
            sample,
            q: 0.0,
            q_back: 1.0,
        }
    }
}

/// The shared, read-only resources every operator needs besides the
/// `Sample` it is proposing from (spec.md §5: "Shared resources. Read-
/// only: graph, features, families, operator weight table").
pub struct Context<'a> {
    pub geography: &'a Geography,
    pub features: &'a FeatureSet,
    pub families: &'a Families,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    GrowArea,
    ShrinkArea,
    SwapArea,
    AlterWeights,
    AlterP(ProbTarget),
    GibbsSources,
    GibbsP(ProbTarget),
}

impl Operator {
    pub fn name(self) -> OperatorName {
        match self {
            Operator::GrowArea => OperatorName::GrowArea,
            Operator::ShrinkArea => OperatorName::ShrinkArea,
            Operator::SwapArea => OperatorName::SwapArea,
            Operator::AlterWeights => OperatorName::AlterWeights,
            Operator::AlterP(ProbTarget::Global) => OperatorName::AlterPGlobal,
            Operator::AlterP(ProbTarget::Area) => OperatorName::AlterPArea,
            Operator::AlterP(ProbTarget::Family) => OperatorName::AlterPFamily,
            Operator::GibbsSources => OperatorName::GibbsSources,
            Operator::GibbsP(ProbTarget::Global) => OperatorName::GibbsPGlobal,
            Operator::GibbsP(ProbTarget::Area) => OperatorName::GibbsPArea,
            Operator::GibbsP(ProbTarget::Family) => OperatorName::GibbsPFamily,
        }
    }

    /// Every operator reachable for a given configuration: structural
    /// operators vanish when `n_zones == 0`, family operators vanish when
    /// `inheritance` is false, and `gibbs_sources` vanishes when
    /// `sample_source` is false (spec.md §6, §8 "K=0 ⇒ structural
    /// operators are never scheduled").
    pub fn enabled_for(config: &SamplerConfig) -> Vec<Operator> {
        let mut ops = Vec::with_capacity(11);
        if config.n_zones > 0 {
            ops.push(Operator::GrowArea);
            ops.push(Operator::ShrinkArea);
            ops.push(Operator::SwapArea);
        }
        ops.push(Operator::AlterWeights);
        ops.push(Operator::AlterP(ProbTarget::Global));
        if config.n_zones > 0 {
            ops.push(Operator::AlterP(ProbTarget::Area));
        }
        if config.inheritance {
            ops.push(Operator::AlterP(ProbTarget::Family));
        }
        if config.sample_source {
            ops.push(Operator::GibbsSources);
        }
        ops.push(Operator::GibbsP(ProbTarget::Global));
        if config.n_zones > 0 {
            ops.push(Operator::GibbsP(ProbTarget::Area));
        }
        if config.inheritance {
            ops.push(Operator::GibbsP(ProbTarget::Family));
        }
        ops
    }

    #[allow(clippy::too_many_arguments)]
    pub fn propose(
        self,
        sample: &Sample,
        ctx: &Context,
        config: &SamplerConfig,
        chain: &ChainParams,
        oracle: &mut dyn Oracle,
        rng: &mut impl Rng,
    ) -> Proposal {
        match self {
            Operator::GrowArea => area::grow_area(
                sample,
                chain,
                ctx.geography,
                config.sample_source,
                oracle,
                rng,
            ),
            Operator::ShrinkArea => area::shrink_area(
                sample,
                chain,
                ctx.geography,
                config.min_size,
                config.sample_source,
                oracle,
                rng,
            ),
            Operator::SwapArea => area::swap_area(
                sample,
                chain,
                ctx.geography,
                config.sample_source,
                oracle,
                rng,
            ),
            Operator::AlterWeights => continuous::alter_weights(sample, config, rng),
            Operator::AlterP(target) => {
                continuous::alter_p(sample, target, config, ctx.features, rng)
            }
            Operator::GibbsSources => gibbs::gibbs_sources(sample, oracle, rng),
            Operator::GibbsP(target) => {
                gibbs::gibbs_p(sample, target, ctx.features, ctx.families, rng)
            }
        }
    }
}

/// Weighted sampling of one enabled operator from the configured
/// operator-name → weight table (spec.md §4.4 step 1).
pub fn choose_operator(config: &SamplerConfig, rng: &mut impl Rng) -> Option<Operator> {
    let candidates: Vec<(Operator, f64)> = Operator::enabled_for(config)
        .into_iter()
        .map(|op| (op, config.operator_weights.get(op.name())))
        .filter(|(_, w)| *w > 0.0)
        .collect();

    let total: f64 = candidates.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return None;
    }

    let mut draw = rng.random::<f64>() * total;
    for (op, w) in &candidates {
        if draw < *w {
            return Some(*op);
        }
        draw -= w;
    }
    candidates.last().map(|(op, _)| *op)
}
