use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::FrontierError;
use crate::optimization::frontier::FrontierPoint;
use crate::returns::statistics::sharpe_ratio;
use crate::types::{nan_as_null, with_metadata, ComputationOutput, WeightVector};
use crate::FrontierResult;

/// Lowest and highest valid risk-tolerance score.
pub const SCORE_RANGE: (f64, f64) = (0.0, 100.0);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What to do with a finite score outside [0, 100].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceBoundsPolicy {
    /// Clamp into range and record a warning.
    #[default]
    Clamp,
    /// Fail with `InvalidInput`.
    Reject,
}

/// The frontier point chosen for an investor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestorSelection {
    #[serde(rename = "return")]
    pub expected_return: f64,
    pub volatility: f64,
    #[serde(with = "nan_as_null")]
    pub sharpe: f64,
    pub weights: WeightVector,
    pub frontier_index: usize,
    /// Score actually used, after the bounds policy.
    pub risk_tolerance: f64,
    /// Volatility interpolated from the score.
    pub desired_volatility: f64,
    pub score_clamped: bool,
}

/// Input to a standalone matching run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMatchInput {
    pub risk_tolerance: f64,
    pub frontier: Vec<FrontierPoint>,
    /// Defaults to the volatility of the lowest-volatility convergent point.
    #[serde(default)]
    pub min_risk_volatility: Option<f64>,
    /// Defaults to the volatility of the highest-return convergent point.
    #[serde(default)]
    pub max_return_volatility: Option<f64>,
    #[serde(default)]
    pub policy: ToleranceBoundsPolicy,
    #[serde(default)]
    pub risk_free_rate: f64,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Match a score against a frontier and wrap the result in the standard
/// envelope.
pub fn run_risk_matching(
    input: &RiskMatchInput,
) -> FrontierResult<ComputationOutput<InvestorSelection>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let endpoints = convergent_endpoints(&input.frontier);
    let resolve = |given: Option<f64>, derived: Option<f64>| {
        given.or(derived).ok_or_else(|| {
            FrontierError::EmptyCandidateSet("No converged frontier point to match against".into())
        })
    };
    let min_risk_volatility = resolve(input.min_risk_volatility, endpoints.map(|e| e.0))?;
    let max_return_volatility = resolve(input.max_return_volatility, endpoints.map(|e| e.1))?;

    let selection = match_risk_tolerance(
        input.risk_tolerance,
        min_risk_volatility,
        max_return_volatility,
        &input.frontier,
        input.policy,
        input.risk_free_rate,
    )?;
    if selection.score_clamped {
        warnings.push(clamp_warning(input.risk_tolerance, selection.risk_tolerance));
    }
    let excluded = input.frontier.iter().filter(|p| !p.converged).count();
    if excluded > 0 {
        warnings.push(format!(
            "{} non-convergent frontier points excluded from matching",
            excluded
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Risk-Tolerance Frontier Matching (nearest volatility)",
        &serde_json::json!({
            "risk_tolerance": input.risk_tolerance,
            "min_risk_volatility": min_risk_volatility,
            "max_return_volatility": max_return_volatility,
            "policy": input.policy,
            "risk_free_rate": input.risk_free_rate,
            "tie_break": "lowest frontier index",
        }),
        warnings,
        elapsed,
        selection,
    ))
}

/// Map a 0-100 risk-tolerance score onto the frontier.
///
/// The desired volatility interpolates linearly between
/// `min_risk_volatility` (score 0) and `max_return_volatility` (score 100).
/// Among converged points the one whose volatility is nearest wins, with
/// the lowest index breaking ties.
pub fn match_risk_tolerance(
    score: f64,
    min_risk_volatility: f64,
    max_return_volatility: f64,
    frontier: &[FrontierPoint],
    policy: ToleranceBoundsPolicy,
    risk_free_rate: f64,
) -> FrontierResult<InvestorSelection> {
    let (effective, clamped) = apply_bounds_policy(score, policy)?;
    for (field, v) in [
        ("min_risk_volatility", min_risk_volatility),
        ("max_return_volatility", max_return_volatility),
    ] {
        if !v.is_finite() || v < 0.0 {
            return Err(FrontierError::InvalidInput {
                field: field.into(),
                reason: format!("Volatility must be finite and non-negative, got {}", v),
            });
        }
    }
    if clamped {
        warn!(score, effective, "risk tolerance clamped into [0, 100]");
    }

    let desired = desired_volatility(effective, min_risk_volatility, max_return_volatility);

    let mut best: Option<(usize, f64)> = None;
    for (i, point) in frontier.iter().enumerate() {
        if !point.converged {
            continue;
        }
        let distance = (point.volatility - desired).abs();
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((i, distance)),
        }
    }
    let (index, _) = best.ok_or_else(|| {
        FrontierError::EmptyCandidateSet(format!(
            "None of {} frontier points converged",
            frontier.len()
        ))
    })?;

    let point = &frontier[index];
    debug!(
        score = effective,
        desired,
        index,
        volatility = point.volatility,
        "matched risk tolerance"
    );
    Ok(InvestorSelection {
        expected_return: point.target_return,
        volatility: point.volatility,
        sharpe: sharpe_ratio(point.target_return, risk_free_rate, point.volatility),
        weights: point.weights.clone(),
        frontier_index: index,
        risk_tolerance: effective,
        desired_volatility: desired,
        score_clamped: clamped,
    })
}

/// min + score/100 * (max - min)
pub fn desired_volatility(score: f64, min_risk_volatility: f64, max_return_volatility: f64) -> f64 {
    min_risk_volatility + score / SCORE_RANGE.1 * (max_return_volatility - min_risk_volatility)
}

/// Volatilities of the lowest-volatility and of the highest-return
/// converged points (first index on ties), or `None` when nothing converged.
pub fn convergent_endpoints(frontier: &[FrontierPoint]) -> Option<(f64, f64)> {
    let converged = || frontier.iter().filter(|p| p.converged);
    let min_risk = converged().fold(None, |best: Option<&FrontierPoint>, p| match best {
        Some(b) if b.volatility <= p.volatility => Some(b),
        _ => Some(p),
    })?;
    let max_return = converged().fold(None, |best: Option<&FrontierPoint>, p| match best {
        Some(b) if b.target_return >= p.target_return => Some(b),
        _ => Some(p),
    })?;
    Some((min_risk.volatility, max_return.volatility))
}

pub(crate) fn clamp_warning(requested: f64, effective: f64) -> String {
    format!(
        "Risk tolerance {} outside [0, 100]; clamped to {}",
        requested, effective
    )
}

fn apply_bounds_policy(score: f64, policy: ToleranceBoundsPolicy) -> FrontierResult<(f64, bool)> {
    if !score.is_finite() {
        return Err(FrontierError::InvalidInput {
            field: "risk_tolerance".into(),
            reason: format!("Score must be finite, got {}", score),
        });
    }
    let (lo, hi) = SCORE_RANGE;
    if (lo..=hi).contains(&score) {
        return Ok((score, false));
    }
    match policy {
        ToleranceBoundsPolicy::Clamp => Ok((score.clamp(lo, hi), true)),
        ToleranceBoundsPolicy::Reject => Err(FrontierError::InvalidInput {
            field: "risk_tolerance".into(),
            reason: format!("Score {} outside [0, 100]", score),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
