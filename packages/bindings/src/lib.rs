use napi::Result as NapiResult;
use napi_derive::napi;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[napi]
pub fn build_allocation(input_json: String) -> NapiResult<String> {
    let input: frontier_core::pipeline::allocation::AllocationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        frontier_core::pipeline::allocation::build_allocation(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[napi]
pub fn sample_portfolios(input_json: String) -> NapiResult<String> {
    let input: frontier_core::sampling::monte_carlo::SamplerInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = frontier_core::sampling::monte_carlo::run_portfolio_sampling(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn efficient_frontier(input_json: String) -> NapiResult<String> {
    let input: frontier_core::optimization::frontier::FrontierInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = frontier_core::optimization::frontier::run_efficient_frontier(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn match_risk_tolerance(input_json: String) -> NapiResult<String> {
    let input: frontier_core::matching::risk_tolerance::RiskMatchInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = frontier_core::matching::risk_tolerance::run_risk_matching(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
