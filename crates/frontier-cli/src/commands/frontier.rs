use clap::Args;
use serde_json::{json, Map, Value};

use frontier_core::optimization::active_set::SolverOptions;
use frontier_core::optimization::frontier::{
    self, feasible_return_range, global_minimum_variance, linspace_targets, FrontierInput,
};
use frontier_core::returns::matrix::ReturnMatrix;
use frontier_core::returns::statistics::AssetStatistics;

use crate::input::request::{apply_overrides, load_request, RequestSource};

const DEFAULT_POINTS: usize = 50;

/// Arguments for the efficient frontier
#[derive(Args)]
pub struct EfficientFrontierArgs {
    /// Path to a JSON request (statistics or returns, optional target_returns)
    #[arg(long)]
    pub input: Option<String>,

    /// Path to a CSV price table
    #[arg(long)]
    pub prices: Option<String>,

    /// Path to a YAML or JSON file with solver settings
    #[arg(long)]
    pub config: Option<String>,

    /// Number of targets from the minimum-variance return to the highest
    /// asset return, used when the request lists no target_returns
    #[arg(long)]
    pub points: Option<usize>,

    #[arg(long)]
    pub trading_days: Option<f64>,

    /// Active-set iteration budget per target
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

pub fn run_efficient_frontier(
    args: EfficientFrontierArgs,
) -> Result<Value, Box<dyn std::error::Error>> {
    let source = RequestSource {
        input: args.input.as_deref(),
        prices: args.prices.as_deref(),
        config: args.config.as_deref(),
    };
    let mut request = load_request(&source, "efficient-frontier")?;
    apply_overrides(
        &mut request,
        vec![("trading_days", args.trading_days.map(|v| json!(v)))],
    );
    if let Some(max_iterations) = args.max_iterations {
        let solver = request
            .entry("solver")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(s) = solver {
            s.insert("max_iterations".into(), json!(max_iterations));
        }
    }

    // A returns matrix stands in for precomputed statistics.
    if !request.contains_key("statistics") {
        let returns = request
            .remove("returns")
            .ok_or("Request needs either 'statistics' or 'returns'")?;
        let returns: ReturnMatrix = serde_json::from_value(returns)?;
        request.insert("statistics".into(), serde_json::to_value(returns.statistics()?)?);
    }

    if !request.contains_key("target_returns") {
        let stats: AssetStatistics = serde_json::from_value(request["statistics"].clone())?;
        let trading_days = request
            .get("trading_days")
            .and_then(Value::as_f64)
            .unwrap_or(252.0);
        let solver: SolverOptions = match request.get("solver") {
            Some(v) => serde_json::from_value(v.clone())?,
            None => SolverOptions::default(),
        };
        let gmv = global_minimum_variance(&stats, trading_days, &solver)?;
        let (_, highest) = feasible_return_range(&stats, trading_days);
        let targets = linspace_targets(
            gmv.target_return,
            highest,
            args.points.unwrap_or(DEFAULT_POINTS),
        );
        request.insert("target_returns".into(), json!(targets));
    }

    let frontier_input: FrontierInput = serde_json::from_value(Value::Object(request))?;
    let result = frontier::run_efficient_frontier(&frontier_input)?;
    Ok(serde_json::to_value(result)?)
}
