//! Full allocation run: sample the portfolio cloud, pick the named
//! portfolios, trace the efficient frontier between the min-risk and
//! max-return samples and match the investor's risk tolerance onto it.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

use crate::error::FrontierError;
use crate::matching::risk_tolerance::{
    clamp_warning, convergent_endpoints, match_risk_tolerance, InvestorSelection,
    ToleranceBoundsPolicy,
};
use crate::optimization::active_set::SolverOptions;
use crate::optimization::frontier::{
    collect_frontier_warnings, efficient_frontier, linspace_targets, FrontierPoint,
};
use crate::returns::matrix::ReturnMatrix;
use crate::returns::statistics::AssetStatistics;
use crate::sampling::monte_carlo::{
    collect_sampling_warnings, sample_portfolios, PortfolioPoint, SamplerConfig,
};
use crate::sampling::selection::{
    select_max_return, select_max_sharpe, select_min_volatility, PortfolioSelection,
};
use crate::types::{with_metadata, ComputationOutput};
use crate::FrontierResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Run settings shared by every entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSettings {
    /// Investor risk tolerance, notionally in [0, 100].
    pub risk_tolerance: f64,
    #[serde(flatten)]
    pub sampler: SamplerConfig,
    /// Number of evenly spaced frontier targets.
    #[serde(default = "default_frontier_points")]
    pub frontier_points: usize,
    #[serde(default)]
    pub tolerance_policy: ToleranceBoundsPolicy,
    #[serde(default)]
    pub solver: SolverOptions,
    /// Include the sampled cloud in the output (for an external plotter).
    #[serde(default)]
    pub include_samples: bool,
}

fn default_frontier_points() -> usize {
    50
}

/// Full pipeline input: a daily log-return matrix plus run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationInput {
    pub returns: ReturnMatrix,
    #[serde(flatten)]
    pub settings: AllocationSettings,
}

/// The four named portfolios, the frontier they were derived from and the
/// run counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutput {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub asset_names: Vec<String>,
    pub max_sharpe: Option<PortfolioSelection>,
    pub min_volatility: PortfolioSelection,
    pub max_return: PortfolioSelection,
    pub investor: InvestorSelection,
    pub frontier: Vec<FrontierPoint>,
    /// Frontier volatilities mapped to scores 0 and 100.
    pub matching_volatility_range: (f64, f64),
    pub num_portfolios: usize,
    pub converged_points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolios: Option<Vec<PortfolioPoint>>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build the allocation for a return matrix.
pub fn build_allocation(
    input: &AllocationInput,
) -> FrontierResult<ComputationOutput<AllocationOutput>> {
    let start = Instant::now();
    let stats = input.returns.statistics()?;

    let (mut output, warnings) = allocate(&stats, &input.settings)?;
    output.asset_names = input.returns.asset_names().to_vec();

    let settings = &input.settings;
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Monte Carlo Sampling + Mean-Variance Frontier + Risk-Tolerance Matching",
        &serde_json::json!({
            "n_assets": stats.num_assets(),
            "n_observations": input.returns.num_observations(),
            "num_portfolios": settings.sampler.num_portfolios,
            "trading_days": settings.sampler.trading_days,
            "risk_free_rate": settings.sampler.risk_free_rate,
            "seed": settings.sampler.seed,
            "frontier_points": settings.frontier_points,
            "risk_tolerance": settings.risk_tolerance,
            "tolerance_policy": settings.tolerance_policy,
            "solver": settings.solver,
            "returns": "daily log returns, sample (n-1) covariance",
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Run the pipeline from precomputed daily moments. Returns the output
/// (without asset names) and the non-fatal warnings collected on the way.
pub fn allocate(
    stats: &AssetStatistics,
    settings: &AllocationSettings,
) -> FrontierResult<(AllocationOutput, Vec<String>)> {
    if settings.frontier_points == 0 {
        return Err(FrontierError::InvalidInput {
            field: "frontier_points".into(),
            reason: "At least one frontier target is required".into(),
        });
    }
    let mut warnings: Vec<String> = Vec::new();
    info!(
        assets = stats.num_assets(),
        portfolios = settings.sampler.num_portfolios,
        frontier_points = settings.frontier_points,
        "allocation started"
    );

    // 1. Sample the random cloud and pick the named portfolios
    let sampled = sample_portfolios(stats, &settings.sampler)?;
    collect_sampling_warnings(&sampled, &mut warnings);
    let min_volatility = select_min_volatility(&sampled.portfolios)?;
    let max_return = select_max_return(&sampled.portfolios)?;
    let max_sharpe = select_max_sharpe(&sampled.portfolios);
    if max_sharpe.is_none() {
        warnings.push("No sample has a defined Sharpe ratio".into());
    }

    // 2. Frontier between the min-risk and max-return sample returns
    let targets = linspace_targets(
        min_volatility.expected_return,
        max_return.expected_return,
        settings.frontier_points,
    );
    let frontier = efficient_frontier(
        stats,
        settings.sampler.trading_days,
        &targets,
        &settings.solver,
    )?;
    collect_frontier_warnings(&frontier, &mut warnings);
    if frontier
        .iter()
        .filter(|p| p.converged)
        .collect::<Vec<_>>()
        .windows(2)
        .any(|pair| pair[1].volatility < pair[0].volatility)
    {
        warn!("frontier volatility decreases between consecutive targets");
        warnings.push(
            "Frontier volatility decreases between some targets; the lowest targets lie \
             below the minimum-variance return"
                .into(),
        );
    }

    // 3. Match the risk tolerance against the convergent frontier endpoints
    let (min_risk_volatility, max_return_volatility) = convergent_endpoints(&frontier)
        .ok_or_else(|| {
            FrontierError::EmptyCandidateSet(format!(
                "None of {} frontier points converged",
                frontier.len()
            ))
        })?;
    let investor = match_risk_tolerance(
        settings.risk_tolerance,
        min_risk_volatility,
        max_return_volatility,
        &frontier,
        settings.tolerance_policy,
        settings.sampler.risk_free_rate,
    )?;
    if investor.score_clamped {
        warnings.push(clamp_warning(settings.risk_tolerance, investor.risk_tolerance));
    }

    let converged_points = frontier.iter().filter(|p| p.converged).count();
    info!(
        samples = sampled.portfolios.len(),
        converged_points,
        investor_index = investor.frontier_index,
        "allocation finished"
    );

    let output = AllocationOutput {
        asset_names: Vec::new(),
        max_sharpe,
        min_volatility,
        max_return,
        investor,
        frontier,
        matching_volatility_range: (min_risk_volatility, max_return_volatility),
        num_portfolios: sampled.portfolios.len(),
        converged_points,
        portfolios: settings.include_samples.then_some(sampled.portfolios),
    };
    Ok((output, warnings))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
