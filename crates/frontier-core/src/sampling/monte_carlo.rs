use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Uniform;
use std::time::Instant;
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::FrontierError;
use crate::returns::matrix::ReturnMatrix;
use crate::returns::statistics::{sharpe_ratio, AnnualizedMoments, AssetStatistics};
use crate::types::{nan_as_null, with_metadata, ComputationOutput, WeightVector};
use crate::FrontierResult;

use super::selection::{self, PortfolioSelection};

/// Samples drawn from one sub-seeded random stream. Must not depend on the
/// worker count.
pub const SAMPLES_PER_BLOCK: usize = 1024;

/// Redraw attempts for a sample whose uniform draws are all exactly zero.
const MAX_REDRAWS: u32 = 16;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Settings for the random portfolio sampler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Number of random portfolios to draw.
    #[serde(default = "default_num_portfolios")]
    pub num_portfolios: u32,
    /// Trading days per year used to annualize daily moments.
    #[serde(default = "default_trading_days")]
    pub trading_days: f64,
    /// Annual risk-free rate used in the Sharpe ratio.
    #[serde(default)]
    pub risk_free_rate: f64,
    /// Seed of the random stream.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            num_portfolios: default_num_portfolios(),
            trading_days: default_trading_days(),
            risk_free_rate: 0.0,
            seed: default_seed(),
        }
    }
}

pub(crate) fn default_num_portfolios() -> u32 {
    25_000
}

pub(crate) fn default_trading_days() -> f64 {
    252.0
}

pub(crate) fn default_seed() -> u64 {
    42
}

/// A randomly drawn portfolio and its annualized features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPoint {
    #[serde(rename = "return")]
    pub expected_return: f64,
    pub volatility: f64,
    /// `NaN` (serialized as `null`) when volatility is exactly zero.
    #[serde(with = "nan_as_null")]
    pub sharpe: f64,
    pub weights: WeightVector,
    /// Position in draw order. Differs from the position in the population
    /// once a sample has been skipped.
    #[serde(default)]
    pub draw_index: usize,
}

/// The sampled population plus counters for locally recovered draws.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampledPortfolios {
    pub portfolios: Vec<PortfolioPoint>,
    /// Draws that were all-zero and had to be redrawn.
    pub redrawn_samples: u32,
    /// Samples abandoned after exhausting their redraws.
    pub skipped_samples: u32,
    /// Samples whose volatility is exactly zero (Sharpe undefined).
    pub zero_volatility_samples: u32,
}

/// Input to a standalone sampling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerInput {
    pub returns: ReturnMatrix,
    #[serde(flatten)]
    pub config: SamplerConfig,
    /// Include every sampled portfolio in the output (for plotting).
    #[serde(default)]
    pub include_samples: bool,
}

/// Output of a standalone sampling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerOutput {
    pub num_portfolios: u32,
    pub max_sharpe: Option<PortfolioSelection>,
    pub min_volatility: PortfolioSelection,
    pub max_return: PortfolioSelection,
    pub redrawn_samples: u32,
    pub skipped_samples: u32,
    pub zero_volatility_samples: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolios: Option<Vec<PortfolioPoint>>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Sample random long-only portfolios from a return matrix and summarize
/// the max-Sharpe, min-volatility and max-return members.
pub fn run_portfolio_sampling(
    input: &SamplerInput,
) -> FrontierResult<ComputationOutput<SamplerOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let stats = input.returns.statistics()?;
    let sampled = sample_portfolios(&stats, &input.config)?;
    collect_sampling_warnings(&sampled, &mut warnings);

    let min_volatility = selection::select_min_volatility(&sampled.portfolios)?;
    let max_return = selection::select_max_return(&sampled.portfolios)?;
    let max_sharpe = selection::select_max_sharpe(&sampled.portfolios);
    if max_sharpe.is_none() {
        warnings.push("No sample has a defined Sharpe ratio".into());
    }

    let output = SamplerOutput {
        num_portfolios: sampled.portfolios.len() as u32,
        max_sharpe,
        min_volatility,
        max_return,
        redrawn_samples: sampled.redrawn_samples,
        skipped_samples: sampled.skipped_samples,
        zero_volatility_samples: sampled.zero_volatility_samples,
        portfolios: input.include_samples.then_some(sampled.portfolios),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Monte Carlo Portfolio Sampling",
        &serde_json::json!({
            "n_assets": stats.num_assets(),
            "num_portfolios": input.config.num_portfolios,
            "trading_days": input.config.trading_days,
            "risk_free_rate": input.config.risk_free_rate,
            "seed": input.config.seed,
            "samples_per_block": SAMPLES_PER_BLOCK,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Draw `config.num_portfolios` random weight vectors and compute their
/// annualized return, volatility and Sharpe ratio.
///
/// The random stream is split into blocks of `SAMPLES_PER_BLOCK` samples,
/// each seeded from `(seed, block index)`. The output is therefore
/// bit-identical whether blocks run sequentially or in parallel.
pub fn sample_portfolios(
    stats: &AssetStatistics,
    config: &SamplerConfig,
) -> FrontierResult<SampledPortfolios> {
    validate_config(config)?;

    let moments = AnnualizedMoments::new(stats, config.trading_days);
    let uniform = Uniform::new(0.0, 1.0).map_err(|e| FrontierError::InvalidInput {
        field: "distribution".into(),
        reason: format!("Invalid Uniform parameters: {e}"),
    })?;

    let total = config.num_portfolios as usize;
    let num_blocks = total.div_ceil(SAMPLES_PER_BLOCK);
    let block_len = |b: usize| SAMPLES_PER_BLOCK.min(total - b * SAMPLES_PER_BLOCK);
    let run_block = |b: usize| {
        sample_block(
            &moments,
            &uniform,
            config.risk_free_rate,
            block_seed(config.seed, b as u64),
            b * SAMPLES_PER_BLOCK,
            block_len(b),
        )
    };

    #[cfg(feature = "parallel")]
    let blocks: Vec<BlockResult> = (0..num_blocks).into_par_iter().map(run_block).collect();
    #[cfg(not(feature = "parallel"))]
    let blocks: Vec<BlockResult> = (0..num_blocks).map(run_block).collect();

    let mut sampled = SampledPortfolios {
        portfolios: Vec::with_capacity(total),
        redrawn_samples: 0,
        skipped_samples: 0,
        zero_volatility_samples: 0,
    };
    for (b, block) in blocks.into_iter().enumerate() {
        debug!(
            block = b,
            samples = block.portfolios.len(),
            redrawn = block.redrawn,
            "sampled block"
        );
        sampled.redrawn_samples += block.redrawn;
        sampled.skipped_samples += block.skipped;
        sampled.portfolios.extend(block.portfolios);
    }
    sampled.zero_volatility_samples =
        sampled.portfolios.iter().filter(|p| p.volatility == 0.0).count() as u32;

    if sampled.portfolios.is_empty() {
        return Err(FrontierError::InsufficientData(
            "Every sample failed to draw a usable weight vector".into(),
        ));
    }

    info!(
        samples = sampled.portfolios.len(),
        assets = stats.num_assets(),
        seed = config.seed,
        "portfolio sampling complete"
    );
    Ok(sampled)
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

struct BlockResult {
    portfolios: Vec<PortfolioPoint>,
    redrawn: u32,
    skipped: u32,
}

fn sample_block(
    moments: &AnnualizedMoments,
    uniform: &Uniform,
    risk_free_rate: f64,
    seed: u64,
    first_draw: usize,
    len: usize,
) -> BlockResult {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = moments.returns.len();
    let mut result = BlockResult {
        portfolios: Vec::with_capacity(len),
        redrawn: 0,
        skipped: 0,
    };

    for k in 0..len {
        match draw_weights(&mut rng, uniform, n) {
            (Some(weights), redraws) => {
                result.redrawn += redraws;
                result
                    .portfolios
                    .push(evaluate(moments, risk_free_rate, weights, first_draw + k));
            }
            (None, redraws) => {
                result.redrawn += redraws;
                result.skipped += 1;
            }
        }
    }
    result
}

/// Draw `n` uniform values and normalize them by their sum. Returns the
/// weights (if a non-degenerate draw was found) and the number of redraws.
fn draw_weights(rng: &mut StdRng, uniform: &Uniform, n: usize) -> (Option<WeightVector>, u32) {
    let mut redraws = 0;
    loop {
        let raw: Vec<f64> = (0..n).map(|_| rng.sample(uniform)).collect();
        let total: f64 = raw.iter().sum();
        if total > 0.0 {
            let weights = raw.into_iter().map(|v| v / total).collect();
            return (Some(WeightVector::from_normalized(weights)), redraws);
        }
        if redraws == MAX_REDRAWS {
            return (None, redraws);
        }
        redraws += 1;
    }
}

fn evaluate(
    moments: &AnnualizedMoments,
    risk_free_rate: f64,
    weights: WeightVector,
    draw_index: usize,
) -> PortfolioPoint {
    let expected_return = moments.portfolio_return(weights.as_slice());
    let volatility = moments.portfolio_volatility(weights.as_slice());
    PortfolioPoint {
        expected_return,
        volatility,
        sharpe: sharpe_ratio(expected_return, risk_free_rate, volatility),
        weights,
        draw_index,
    }
}

/// SplitMix64 finalizer over (seed, block): decorrelates neighbouring
/// block seeds so each block gets an independent stream.
fn block_seed(seed: u64, block: u64) -> u64 {
    let mut z = seed ^ block.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub(crate) fn collect_sampling_warnings(sampled: &SampledPortfolios, warnings: &mut Vec<String>) {
    if sampled.redrawn_samples > 0 {
        warnings.push(format!(
            "{} degenerate all-zero draws were redrawn",
            sampled.redrawn_samples
        ));
    }
    if sampled.skipped_samples > 0 {
        warnings.push(format!(
            "{} samples skipped after exhausting redraws",
            sampled.skipped_samples
        ));
    }
    if sampled.zero_volatility_samples > 0 {
        warnings.push(format!(
            "{} samples have zero volatility; their Sharpe ratio is undefined",
            sampled.zero_volatility_samples
        ));
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_config(config: &SamplerConfig) -> FrontierResult<()> {
    if config.num_portfolios == 0 {
        return Err(FrontierError::InvalidInput {
            field: "num_portfolios".into(),
            reason: "Must draw at least one portfolio".into(),
        });
    }
    if !config.trading_days.is_finite() || config.trading_days <= 0.0 {
        return Err(FrontierError::InvalidInput {
            field: "trading_days".into(),
            reason: format!("Annualization factor must be positive, got {}", config.trading_days),
        });
    }
    if !config.risk_free_rate.is_finite() {
        return Err(FrontierError::InvalidInput {
            field: "risk_free_rate".into(),
            reason: "Risk-free rate must be finite".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
