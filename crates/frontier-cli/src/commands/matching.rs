use clap::{Args, ValueEnum};
use serde_json::{json, Value};

use frontier_core::matching::risk_tolerance::{self, RiskMatchInput};

use crate::input::request::{apply_overrides, load_request, RequestSource};

/// Handling of risk-tolerance scores outside [0, 100]
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    Clamp,
    Reject,
}

impl PolicyArg {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyArg::Clamp => "clamp",
            PolicyArg::Reject => "reject",
        }
    }
}

/// Arguments for risk-tolerance matching
#[derive(Args)]
pub struct MatchRiskArgs {
    /// Path to a JSON request with a frontier, or the JSON output of
    /// `efficient-frontier` / `allocate`
    #[arg(long)]
    pub input: Option<String>,

    /// Investor risk tolerance, 0 (lowest risk) to 100 (highest return)
    #[arg(long, allow_hyphen_values = true)]
    pub risk_tolerance: Option<f64>,

    #[arg(long)]
    pub policy: Option<PolicyArg>,

    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<f64>,
}

pub fn run_match_risk(args: MatchRiskArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let source = RequestSource {
        input: args.input.as_deref(),
        prices: None,
        config: None,
    };
    let mut request = load_request(&source, "match-risk")?;

    // Accept the envelope of a previous frontier or allocation run.
    if !request.contains_key("frontier") {
        let points = request
            .get("result")
            .and_then(|r| r.get("points").or_else(|| r.get("frontier")))
            .cloned()
            .ok_or("Request needs a 'frontier' array")?;
        request.insert("frontier".into(), points);
    }
    request.remove("result");

    apply_overrides(
        &mut request,
        vec![
            ("risk_tolerance", args.risk_tolerance.map(|v| json!(v))),
            ("policy", args.policy.map(|p| json!(p.as_str()))),
            ("risk_free_rate", args.risk_free_rate.map(|v| json!(v))),
        ],
    );
    if !request.contains_key("risk_tolerance") {
        return Err("--risk-tolerance <0-100> (or risk_tolerance in the request) required".into());
    }

    let match_input: RiskMatchInput = serde_json::from_value(Value::Object(request))?;
    let result = risk_tolerance::run_risk_matching(&match_input)?;
    Ok(serde_json::to_value(result)?)
}
