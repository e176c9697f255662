use clap::Args;
use serde_json::{json, Value};

use frontier_core::sampling::monte_carlo::{self, SamplerInput};

use crate::input::request::{apply_overrides, load_request, RequestSource};

/// Arguments for random portfolio sampling
#[derive(Args)]
pub struct SampleArgs {
    /// Path to a JSON request (returns matrix plus sampler settings)
    #[arg(long)]
    pub input: Option<String>,

    /// Path to a CSV price table
    #[arg(long)]
    pub prices: Option<String>,

    /// Path to a YAML or JSON file with sampler settings
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of random portfolios to draw
    #[arg(long)]
    pub portfolios: Option<u32>,

    #[arg(long)]
    pub trading_days: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<f64>,

    /// Include every sampled portfolio in the output
    #[arg(long)]
    pub include_samples: bool,
}

pub fn run_sample(args: SampleArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let source = RequestSource {
        input: args.input.as_deref(),
        prices: args.prices.as_deref(),
        config: args.config.as_deref(),
    };
    let mut request = load_request(&source, "sampling")?;
    apply_overrides(
        &mut request,
        vec![
            ("seed", args.seed.map(|v| json!(v))),
            ("num_portfolios", args.portfolios.map(|v| json!(v))),
            ("trading_days", args.trading_days.map(|v| json!(v))),
            ("risk_free_rate", args.risk_free_rate.map(|v| json!(v))),
            ("include_samples", args.include_samples.then(|| json!(true))),
        ],
    );

    let sampler_input: SamplerInput = serde_json::from_value(Value::Object(request))?;
    let result = monte_carlo::run_portfolio_sampling(&sampler_input)?;
    Ok(serde_json::to_value(result)?)
}
