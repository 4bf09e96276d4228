use geo::Coord;
use geo_graph::{Csr, Geography};
use rand::Rng;
use rand::rngs::SmallRng;
use sampler_core::config::{ChainParams, OperatorName, OperatorWeights, SamplerConfig, VarProposal};
use sampler_core::coordinator::ChainSlot;
use sampler_core::data::{Families, FeatureSet};
use sampler_core::driver::{ChainDriver, initial_log_posterior};
use sampler_core::init::{WarmStart, build_initial_sample};
use sampler_core::oracle::ReferenceOracle;

/// A line graph of `n` sites, standing in for a real geography fixture.
pub fn line_geography(n: usize) -> Geography {
    let edges: Vec<(usize, usize)> = (0..n.saturating_sub(1)).map(|i| (i, i + 1)).collect();
    let adjacency = Csr::from_edges(n, edges);
    let coords = (0..n).map(|i| Coord { x: i as f64, y: 0.0 }).collect();
    let names = (0..n).map(|i| format!("s{i}")).collect();
    Geography::new(adjacency, coords, names).unwrap()
}

/// Random two-state categorical observations over `n` sites and `f` features.
pub fn random_features(n: usize, f: usize, rng: &mut SmallRng) -> FeatureSet {
    let n_states = 2;
    let mut x = vec![0.0; n * f * n_states];
    for i in 0..n {
        for feat in 0..f {
            let state = usize::from(rng.random::<bool>());
            x[(i * f + feat) * n_states + state] = 1.0;
        }
    }
    let applicable = vec![true; f * n_states];
    FeatureSet::new(n, f, n_states, x, applicable).unwrap()
}

pub fn full_operator_config(n_zones: usize, min_size: usize, max_size: usize) -> SamplerConfig {
    let mut weights = OperatorWeights::default();
    weights.set(OperatorName::GrowArea, 4.0);
    weights.set(OperatorName::ShrinkArea, 4.0);
    weights.set(OperatorName::SwapArea, 2.0);
    weights.set(OperatorName::AlterWeights, 2.0);
    weights.set(OperatorName::AlterPGlobal, 1.0);
    weights.set(OperatorName::AlterPArea, 1.0);
    weights.set(OperatorName::GibbsSources, 4.0);
    weights.set(OperatorName::GibbsPGlobal, 2.0);
    weights.set(OperatorName::GibbsPArea, 2.0);

    SamplerConfig {
        n_chains: 1,
        n_zones,
        min_size,
        max_size,
        initial_size: min_size.max(1),
        p_grow_connected: 0.8,
        var_proposal: VarProposal {
            weights: 20.0,
            universal: 20.0,
            contact: 20.0,
            inheritance: 20.0,
        },
        inheritance: false,
        sample_source: true,
        operator_weights: weights,
        swap_interval: 10,
        max_growth_attempts: 500,
    }
}

/// Builds one chain end to end: initial state, chain-local reference
/// oracle, and driver, exactly as the CLI's `build_chain_slot` does.
pub fn build_chain<'a>(
    chain_index: usize,
    config: &SamplerConfig,
    params: ChainParams,
    geography: &'a Geography,
    features: &'a FeatureSet,
    families: &'a Families,
    rng: &mut SmallRng,
) -> ChainSlot<'a> {
    let mut oracle = ReferenceOracle::new(features, families);
    let mut sample = build_initial_sample(
        chain_index,
        config,
        geography,
        features,
        families,
        &WarmStart::default(),
        &mut oracle,
        rng,
    )
    .expect("initial state construction succeeds for this fixture");
    let lp0 = initial_log_posterior(&mut sample, &mut oracle);
    let step_rng = {
        use rand::SeedableRng;
        SmallRng::seed_from_u64(rng.random())
    };
    let driver = ChainDriver::new(chain_index, sample, params, step_rng, lp0);
    ChainSlot {
        driver,
        oracle: Box::new(oracle),
    }
}
