//! The Chain Driver (spec.md §4.4): per-step operator selection, the
//! Metropolis–Hastings acceptance ratio, and cooperative cancellation
//! (spec.md §5).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;
use rand::rngs::SmallRng;
use tracing::{debug, error, instrument};

use crate::config::{ChainParams, OperatorName, SamplerConfig};
use crate::error::{SamplerError, SamplerResult};
use crate::operators::{Context, choose_operator};
use crate::oracle::Oracle;
use crate::state::Sample;

/// A cooperative cancellation flag shared between the coordinator and every
/// chain (spec.md §5, §7 `Cancelled`). Checked between steps; setting it
/// lets each chain finish its current step and return cleanly, leaving the
/// last accepted sample intact.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One step's record: operator id, accept flag, and the log-posterior of
/// the chain's state *after* the step (spec.md §4.4 step 6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepRecord {
    pub step: u64,
    pub operator: OperatorName,
    pub accepted: bool,
    pub log_posterior: f64,
}

/// Evaluates `sample`'s initial log-posterior so a freshly built [`ChainDriver`]
/// has something to compare the first proposal against (spec.md §3
/// "Lifecycle": a Sample is created, then the oracle is evaluated).
pub fn initial_log_posterior(sample: &mut Sample, oracle: &mut dyn Oracle) -> f64 {
    oracle.log_likelihood(sample) + oracle.log_prior(sample)
}

/// Runs one chain: strictly sequential operator selection, oracle
/// evaluation, and accept/reject (spec.md §4.4, §5 "Within one chain the
/// driver is strictly sequential").
#[derive(Debug)]
pub struct ChainDriver {
    chain_index: usize,
    chain: ChainParams,
    sample: Sample,
    rng: SmallRng,
    step_index: u64,
    current_log_posterior: f64,
}

impl ChainDriver {
    pub fn new(
        chain_index: usize,
        sample: Sample,
        chain: ChainParams,
        rng: SmallRng,
        current_log_posterior: f64,
    ) -> Self {
        ChainDriver {
            chain_index,
            chain,
            sample,
            rng,
            step_index: 0,
            current_log_posterior,
        }
    }

    pub fn chain_index(&self) -> usize {
        self.chain_index
    }

    pub fn chain(&self) -> &ChainParams {
        &self.chain
    }

    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn current_log_posterior(&self) -> f64 {
        self.current_log_posterior
    }

    pub fn into_sample(self) -> Sample {
        self.sample
    }

    /// Exchanges states with another chain's driver in place, per spec.md
    /// §4.5: "the swap exchanges ... their Samples by move". Step counters
    /// stay attached to chain position, not to the sample, matching
    /// spec.md §5's "the step counter of each chain is unaffected".
    pub fn swap_sample_with(&mut self, other: &mut ChainDriver) {
        std::mem::swap(&mut self.sample, &mut other.sample);
        std::mem::swap(
            &mut self.current_log_posterior,
            &mut other.current_log_posterior,
        );
    }

    /// One Metropolis–Hastings step (spec.md §4.4).
    #[instrument(skip(self, ctx, config, oracle), fields(chain = self.chain_index))]
    pub fn step(
        &mut self,
        ctx: &Context,
        config: &SamplerConfig,
        oracle: &mut dyn Oracle,
    ) -> SamplerResult<StepRecord> {
        self.step_index += 1;

        let Some(op) = choose_operator(config, &mut self.rng) else {
            return Err(SamplerError::InvalidConfig(
                "no enabled operator has a positive weight".into(),
            ));
        };

        let proposal = op.propose(&self.sample, ctx, config, &self.chain, oracle, &mut self.rng);

        // spec.md §4.4 step 3: q_back == 0 rejects immediately, without an
        // oracle call (`OperatorBlocked`, spec.md §7 — not an error).
        if proposal.q_back == 0.0 {
            debug!(step = self.step_index, operator = ?op.name(), "operator blocked");
            return Ok(StepRecord {
                step: self.step_index,
                operator: op.name(),
                accepted: false,
                log_posterior: self.current_log_posterior,
            });
        }

        // Gibbs convention: q=0, q_back=1 means "always accept" (spec.md
        // §4.3.6/§4.3.7, §4.4 step 4, §9 Design Notes). The oracle is still
        // invoked to refresh caches and clear dirty-sets.
        let is_gibbs = proposal.q == 0.0 && proposal.q_back == 1.0;
        let mut proposed = proposal.sample;
        let lp_proposed = oracle.log_likelihood(&mut proposed) + oracle.log_prior(&mut proposed);

        let accept = if is_gibbs {
            true
        } else {
            let log_alpha = (lp_proposed - self.current_log_posterior)
                + self.chain.beta * (proposal.q_back.ln() - proposal.q.ln());
            let u: f64 = self.rng.random();
            u.ln() < log_alpha
        };

        if accept {
            if let Err(e) = proposed.check_invariants(
                config.min_size,
                self.chain.max_size,
                ctx.families,
                |f| ctx.features.applicable_states(f).to_vec(),
            ) {
                error!(step = self.step_index, "invariant violation: {e}");
                return Err(e);
            }
            self.sample = proposed;
            self.current_log_posterior = lp_proposed;
        }

        Ok(StepRecord {
            step: self.step_index,
            operator: op.name(),
            accepted: accept,
            log_posterior: self.current_log_posterior,
        })
    }

    /// Runs up to `steps` steps, polling `cancel` between each one (spec.md
    /// §5: "the driver polls a cooperative cancel flag between steps").
    /// `on_step` is invoked after every step, accepted or not, so callers
    /// can build the emitted sample stream of spec.md §6.
    pub fn run(
        &mut self,
        steps: usize,
        ctx: &Context,
        config: &SamplerConfig,
        oracle: &mut dyn Oracle,
        cancel: &CancelToken,
        mut on_step: impl FnMut(&Sample, &StepRecord),
    ) -> SamplerResult<()> {
        for _ in 0..steps {
            if cancel.is_cancelled() {
                break;
            }
            let record = self.step(ctx, config, oracle)?;
            on_step(&self.sample, &record);
            if cancel.is_cancelled() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OperatorWeights, VarProposal};
    use crate::data::{Families, FeatureSet};
    use crate::oracle::ReferenceOracle;
    use crate::state::Sample;
    use geo::Coord;
    use geo_graph::{Csr, Geography};
    use rand::SeedableRng;

    fn line_of_four() -> Geography {
        let adjacency = Csr::from_edges(4, [(0, 1), (1, 2), (2, 3)]);
        let coords = (0..4)
            .map(|i| Coord { x: i as f64, y: 0.0 })
            .collect();
        let names = (0..4).map(|i| format!("s{i}")).collect();
        Geography::new(adjacency, coords, names).unwrap()
    }

    fn config_with_weight(op: OperatorName, weight: f64) -> SamplerConfig {
        let mut weights = OperatorWeights::default();
        weights.set(op, weight);
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
            operator_weights: weights,
            swap_interval: 10,
            max_growth_attempts: 1000,
        }
    }

    fn toy_sample() -> Sample {
        let mut zones = vec![false; 4];
        zones[1] = true;
        let source = vec![true, false].repeat(4);
        Sample::new(
            0, 4, 1, 1, 2, 0, 2,
            zones,
            vec![0.5, 0.5],
            vec![0.5, 0.5],
            vec![0.5, 0.5],
            vec![],
            source,
        )
    }

    #[test]
    fn gibbs_step_is_always_accepted() {
        let geo = line_of_four();
        let features = FeatureSet::new(4, 1, 2, vec![1.0, 0.0].repeat(4), vec![true, true]).unwrap();
        let families = Families::none(4);
        let ctx = Context {
            geography: &geo,
            features: &features,
            families: &families,
        };
        let config = config_with_weight(OperatorName::GibbsSources, 1.0);
        let mut oracle = ReferenceOracle::new(&features, &families);
        let mut sample = toy_sample();
        let lp0 = initial_log_posterior(&mut sample, &mut oracle);
        let mut driver = ChainDriver::new(0, sample, ChainParams { beta: 1.0, max_size: 3, p_connected: 1.0 }, SmallRng::seed_from_u64(0), lp0);

        let record = driver.step(&ctx, &config, &mut oracle).unwrap();
        assert!(record.accepted);
    }

    #[test]
    fn shrink_at_min_size_is_rejected_without_oracle_mutation() {
        let geo = line_of_four();
        let features = FeatureSet::new(4, 1, 2, vec![1.0, 0.0].repeat(4), vec![true, true]).unwrap();
        let families = Families::none(4);
        let ctx = Context {
            geography: &geo,
            features: &features,
            families: &families,
        };
        let config = config_with_weight(OperatorName::ShrinkArea, 1.0);
        let mut oracle = ReferenceOracle::new(&features, &families);
        let mut sample = toy_sample(); // zone size 1 == min_size
        let lp0 = initial_log_posterior(&mut sample, &mut oracle);
        let mut driver = ChainDriver::new(0, sample, ChainParams { beta: 1.0, max_size: 3, p_connected: 1.0 }, SmallRng::seed_from_u64(0), lp0);

        let record = driver.step(&ctx, &config, &mut oracle).unwrap();
        assert!(!record.accepted);
        assert_eq!(record.log_posterior, lp0);
    }

    #[test]
    fn no_positive_weight_is_a_config_error() {
        let geo = line_of_four();
        let features = FeatureSet::new(4, 1, 2, vec![1.0, 0.0].repeat(4), vec![true, true]).unwrap();
        let families = Families::none(4);
        let ctx = Context {
            geography: &geo,
            features: &features,
            families: &families,
        };
        let config = config_with_weight(OperatorName::GibbsSources, 0.0);
        let mut oracle = ReferenceOracle::new(&features, &families);
        let mut sample = toy_sample();
        let lp0 = initial_log_posterior(&mut sample, &mut oracle);
        let mut driver = ChainDriver::new(0, sample, ChainParams { beta: 1.0, max_size: 3, p_connected: 1.0 }, SmallRng::seed_from_u64(0), lp0);

        assert!(driver.step(&ctx, &config, &mut oracle).is_err());
    }

    #[test]
    fn cancel_token_stops_run_early() {
        let geo = line_of_four();
        let features = FeatureSet::new(4, 1, 2, vec![1.0, 0.0].repeat(4), vec![true, true]).unwrap();
        let families = Families::none(4);
        let ctx = Context {
            geography: &geo,
            features: &features,
            families: &families,
        };
        let config = config_with_weight(OperatorName::GibbsSources, 1.0);
        let mut oracle = ReferenceOracle::new(&features, &families);
        let mut sample = toy_sample();
        let lp0 = initial_log_posterior(&mut sample, &mut oracle);
        let mut driver = ChainDriver::new(0, sample, ChainParams { beta: 1.0, max_size: 3, p_connected: 1.0 }, SmallRng::seed_from_u64(0), lp0);

        let cancel = CancelToken::new();
        cancel.cancel();
        let mut steps_seen = 0;
        driver
            .run(10, &ctx, &config, &mut oracle, &cancel, |_, _| steps_seen += 1)
            .unwrap();
        assert_eq!(steps_seen, 0);
    }
}
