use clap::Args;
use serde_json::{json, Value};

use frontier_core::pipeline::allocation::{self, AllocationInput};

use super::matching::PolicyArg;
use crate::input::request::{apply_overrides, load_request, RequestSource};

/// Arguments for the full allocation pipeline
#[derive(Args)]
pub struct AllocateArgs {
    /// Path to a JSON request (returns matrix plus settings)
    #[arg(long)]
    pub input: Option<String>,

    /// Path to a CSV price table (optional Date column, one column per asset)
    #[arg(long)]
    pub prices: Option<String>,

    /// Path to a YAML or JSON file with run settings
    #[arg(long)]
    pub config: Option<String>,

    /// Investor risk tolerance, 0 (lowest risk) to 100 (highest return)
    #[arg(long, allow_hyphen_values = true)]
    pub risk_tolerance: Option<f64>,

    /// Seed of the portfolio sampler
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of random portfolios to draw
    #[arg(long)]
    pub portfolios: Option<u32>,

    /// Number of frontier targets
    #[arg(long)]
    pub frontier_points: Option<usize>,

    /// Trading days per year used to annualize daily moments
    #[arg(long)]
    pub trading_days: Option<f64>,

    /// Annual risk-free rate for Sharpe ratios (decimal)
    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<f64>,

    /// Handling of risk tolerances outside [0, 100]
    #[arg(long)]
    pub policy: Option<PolicyArg>,

    /// Include every sampled portfolio in the output
    #[arg(long)]
    pub include_samples: bool,
}

pub fn run_allocate(args: AllocateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let source = RequestSource {
        input: args.input.as_deref(),
        prices: args.prices.as_deref(),
        config: args.config.as_deref(),
    };
    let mut request = load_request(&source, "allocate")?;
    apply_overrides(
        &mut request,
        vec![
            ("risk_tolerance", args.risk_tolerance.map(|v| json!(v))),
            ("seed", args.seed.map(|v| json!(v))),
            ("num_portfolios", args.portfolios.map(|v| json!(v))),
            ("frontier_points", args.frontier_points.map(|v| json!(v))),
            ("trading_days", args.trading_days.map(|v| json!(v))),
            ("risk_free_rate", args.risk_free_rate.map(|v| json!(v))),
            ("tolerance_policy", args.policy.map(|p| json!(p.as_str()))),
            ("include_samples", args.include_samples.then(|| json!(true))),
        ],
    );
    if !request.contains_key("risk_tolerance") {
        return Err("--risk-tolerance <0-100> (or risk_tolerance in the request) required".into());
    }

    let alloc_input: AllocationInput = serde_json::from_value(Value::Object(request))?;
    let result = allocation::build_allocation(&alloc_input)?;
    Ok(serde_json::to_value(result)?)
}
