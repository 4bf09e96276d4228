//! CLI driver for the sampling kernel, in the shape of the teacher's
//! `burp` binary's `clap` derive + subcommand `Cli` (`crates/burp/src/
//! main.rs`). Feature/geography ingestion is out of scope (spec.md §1), so
//! this binary generates a synthetic geography and feature set itself and
//! wires it through [`sampler_core::coordinator::Coordinator`] /
//! [`sampler_core::coordinator::WarmupCoordinator`] — a way to exercise the
//! kernel end to end without a real CSV loader plugged in.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::info;

use geo::Coord;
use geo_graph::{Csr, Geography};
use sampler_core::config::{ChainParams, OperatorName, OperatorWeights, SamplerConfig, VarProposal};
use sampler_core::coordinator::{ChainSlot, Coordinator, WarmupCoordinator, warmup_chain_params};
use sampler_core::data::{Families, FeatureSet};
use sampler_core::driver::{CancelToken, ChainDriver, initial_log_posterior};
use sampler_core::init::{WarmStart, build_initial_sample};
use sampler_core::operators::Context;
use sampler_core::oracle::ReferenceOracle;

#[derive(Parser)]
#[command(name = "sampler-cli", about = "Areal-contact MCMC sampling kernel")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Run production sampling directly from a freshly built initial state.
    Run(RunArgs),
    /// Run the warmup regime, then hand the cold chain off to production
    /// sampling for the remaining steps.
    Warmup(RunArgs),
}

#[derive(clap::Args, Clone)]
struct RunArgs {
    /// Number of synthetic sites, laid out on a line graph.
    #[arg(short = 'n', long, default_value_t = 20)]
    n_sites: usize,

    /// Number of categorical features, each with 2 applicable states.
    #[arg(short = 'f', long, default_value_t = 5)]
    n_features: usize,

    /// Number of areas K.
    #[arg(short = 'k', long, default_value_t = 2)]
    n_zones: usize,

    /// Number of parallel chains.
    #[arg(short = 'c', long, default_value_t = 1)]
    n_chains: usize,

    /// Total MCMC steps (production phase).
    #[arg(short = 's', long, default_value_t = 1000)]
    steps: usize,

    /// Steps to run during warmup, before handing off (ignored by `run`).
    #[arg(long, default_value_t = 500)]
    warmup_steps: usize,

    #[arg(long, default_value_t = 1)]
    min_size: usize,

    #[arg(long, default_value_t = 8)]
    max_size: usize,

    #[arg(long, default_value_t = 3)]
    initial_size: usize,

    #[arg(long, default_value_t = 0.8)]
    p_grow_connected: f64,

    /// RNG seed, for reproducibility (spec.md §5).
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Where to write the final per-chain state as JSON (optional).
    #[arg(short = 'o', long)]
    out_file: Option<PathBuf>,
}

fn default_operator_weights() -> OperatorWeights {
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
    weights
}

fn build_config(args: &RunArgs) -> SamplerConfig {
    SamplerConfig {
        n_chains: args.n_chains,
        n_zones: args.n_zones,
        min_size: args.min_size,
        max_size: args.max_size,
        initial_size: args.initial_size,
        p_grow_connected: args.p_grow_connected,
        var_proposal: VarProposal {
            weights: 20.0,
            universal: 20.0,
            contact: 20.0,
            inheritance: 20.0,
        },
        inheritance: false,
        sample_source: true,
        operator_weights: default_operator_weights(),
        swap_interval: 50,
        max_growth_attempts: 1000,
    }
}

/// A line-graph geography with `n` evenly spaced sites, standing in for the
/// (out-of-scope) CSV/GIS loader of spec.md §6.
fn synthetic_geography(n: usize) -> Geography {
    let edges: Vec<(usize, usize)> = (0..n.saturating_sub(1)).map(|i| (i, i + 1)).collect();
    let adjacency = Csr::from_edges(n, edges);
    let coords = (0..n).map(|i| Coord { x: i as f64, y: 0.0 }).collect();
    let names = (0..n).map(|i| format!("site_{i}")).collect();
    Geography::new(adjacency, coords, names).expect("synthetic geography is well-formed")
}

/// Random two-state categorical observations, standing in for the
/// (out-of-scope) feature loader of spec.md §6.
fn synthetic_features(n_sites: usize, n_features: usize, rng: &mut impl Rng) -> FeatureSet {
    let n_states = 2;
    let mut x = vec![0.0; n_sites * n_features * n_states];
    for i in 0..n_sites {
        for f in 0..n_features {
            let state = usize::from(rng.random::<bool>());
            x[(i * n_features + f) * n_states + state] = 1.0;
        }
    }
    let applicable = vec![true; n_features * n_states];
    FeatureSet::new(n_sites, n_features, n_states, x, applicable)
        .expect("synthetic feature set is well-formed")
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} steps",
    ) {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar
}

/// Builds one chain's initial state + chain-local oracle + driver.
fn build_chain_slot<'a>(
    chain_index: usize,
    config: &SamplerConfig,
    chain_params: ChainParams,
    geography: &'a Geography,
    features: &'a FeatureSet,
    families: &'a Families,
    rng: &mut SmallRng,
) -> sampler_core::error::SamplerResult<ChainSlot<'a>> {
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
    )?;
    let lp0 = initial_log_posterior(&mut sample, &mut oracle);
    let driver = ChainDriver::new(
        chain_index,
        sample,
        chain_params,
        SmallRng::seed_from_u64(rng.random()),
        lp0,
    );
    Ok(ChainSlot {
        driver,
        oracle: Box::new(oracle),
    })
}

fn run_production(args: &RunArgs) {
    let config = build_config(args);
    let geography = synthetic_geography(args.n_sites);
    let mut data_rng = SmallRng::seed_from_u64(args.seed);
    let features = synthetic_features(args.n_sites, args.n_features, &mut data_rng);
    let families = Families::none(args.n_sites);

    let ctx = Context {
        geography: &geography,
        features: &features,
        families: &families,
    };

    let chain_params: Vec<ChainParams> = (0..args.n_chains)
        .map(|c| ChainParams {
            beta: 1.0 - 0.1 * c as f64,
            max_size: config.max_size,
            p_connected: config.p_grow_connected,
        })
        .collect();

    let mut build_rng = SmallRng::seed_from_u64(args.seed.wrapping_add(1));
    let chains: Vec<ChainSlot<'_>> = chain_params
        .into_iter()
        .enumerate()
        .map(|(i, params)| {
            build_chain_slot(i, &config, params, &geography, &features, &families, &mut build_rng)
                .expect("initial state construction succeeds for the synthetic geography")
        })
        .collect();

    let mut coordinator = Coordinator::new(config, chains);
    let cancel = CancelToken::new();
    let mut swap_rng = SmallRng::seed_from_u64(args.seed.wrapping_add(2));

    let bar = progress_bar(args.steps as u64);
    info!(steps = args.steps, chains = args.n_chains, "starting production sampling");
    coordinator
        .run(args.steps, &ctx, &mut swap_rng, &cancel)
        .expect("sampling run");
    bar.finish();

    report(&coordinator, args.out_file.as_deref());
}

fn run_warmup_then_production(args: &RunArgs) {
    let config = build_config(args);
    let geography = synthetic_geography(args.n_sites);
    let mut data_rng = SmallRng::seed_from_u64(args.seed);
    let features = synthetic_features(args.n_sites, args.n_features, &mut data_rng);
    let families = Families::none(args.n_sites);

    let ctx = Context {
        geography: &geography,
        features: &features,
        families: &families,
    };

    let warmup_params = warmup_chain_params(&config, args.n_chains, args.seed);
    let mut build_rng = SmallRng::seed_from_u64(args.seed.wrapping_add(1));
    let warmup_chains: Vec<ChainSlot<'_>> = warmup_params
        .into_iter()
        .enumerate()
        .map(|(i, params)| {
            build_chain_slot(i, &config, params, &geography, &features, &families, &mut build_rng)
                .expect("initial state construction succeeds for the synthetic geography")
        })
        .collect();

    let mut warmup = WarmupCoordinator::new(config.clone(), warmup_chains);
    let cancel = CancelToken::new();
    let mut swap_rng = SmallRng::seed_from_u64(args.seed.wrapping_add(2));

    info!(steps = args.warmup_steps, chains = args.n_chains, "starting warmup");
    warmup
        .run(args.warmup_steps, &ctx, &mut swap_rng, &cancel)
        .expect("warmup run");
    let cold_sample = warmup.into_cold_sample();

    let mut oracle = ReferenceOracle::new(&features, &families);
    let mut cold_sample = cold_sample;
    let lp0 = initial_log_posterior(&mut cold_sample, &mut oracle);
    let driver = ChainDriver::new(
        0,
        cold_sample,
        ChainParams {
            beta: 1.0,
            max_size: config.max_size,
            p_connected: config.p_grow_connected,
        },
        SmallRng::seed_from_u64(args.seed.wrapping_add(3)),
        lp0,
    );

    let mut coordinator = Coordinator::new(
        config,
        vec![ChainSlot {
            driver,
            oracle: Box::new(oracle),
        }],
    );

    let bar = progress_bar(args.steps as u64);
    info!(steps = args.steps, "starting production sampling from warmed-up state");
    coordinator
        .run(args.steps, &ctx, &mut swap_rng, &cancel)
        .expect("sampling run");
    bar.finish();

    report(&coordinator, args.out_file.as_deref());
}

fn report(coordinator: &Coordinator<'_>, out_file: Option<&std::path::Path>) {
    for slot in coordinator.chains() {
        println!(
            "chain {}: step {}, log-posterior {:.4}",
            slot.driver.chain_index(),
            slot.driver.step_index(),
            slot.driver.current_log_posterior()
        );
    }

    if let Some(path) = out_file {
        let summary: Vec<_> = coordinator
            .chains()
            .iter()
            .map(|slot| {
                serde_json::json!({
                    "chain_index": slot.driver.chain_index(),
                    "step": slot.driver.step_index(),
                    "log_posterior": slot.driver.current_log_posterior(),
                })
            })
            .collect();
        if let Err(e) = std::fs::write(
            path,
            serde_json::to_string_pretty(&summary).unwrap_or_default(),
        ) {
            eprintln!("failed to write {}: {e}", path.display());
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_production(&args),
        Commands::Warmup(args) => run_warmup_then_production(&args),
    }
}
