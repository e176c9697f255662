use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::FrontierError;
use crate::returns::statistics::{AnnualizedMoments, AssetStatistics};
use crate::types::{with_metadata, ComputationOutput, WeightVector};
use crate::FrontierResult;

use super::active_set::{QuadraticProgram, SolveStatus, SolverOptions, FEASIBILITY_TOLERANCE};

/// A converged point must reproduce its target return this closely.
const TARGET_RETURN_TOLERANCE: f64 = 1e-8;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Minimum-volatility allocation for one target return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub target_return: f64,
    pub volatility: f64,
    pub weights: WeightVector,
    /// Only converged points are eligible for risk matching.
    pub converged: bool,
    pub status: SolveStatus,
    pub iterations: u32,
}

/// Input to a standalone frontier run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierInput {
    pub statistics: AssetStatistics,
    /// Annualization factor applied to the daily moments.
    #[serde(default = "default_trading_days")]
    pub trading_days: f64,
    /// Target annual returns, solved independently.
    pub target_returns: Vec<f64>,
    #[serde(default)]
    pub solver: SolverOptions,
}

fn default_trading_days() -> f64 {
    252.0
}

/// Output of a standalone frontier run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierOutput {
    pub points: Vec<FrontierPoint>,
    pub converged_points: usize,
    /// Lowest and highest attainable annual return (single-asset extremes).
    pub feasible_return_range: (f64, f64),
    /// Unconstrained-return minimum-variance portfolio, for reference.
    pub global_min_variance: Option<FrontierPoint>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Solve the efficient frontier for a list of target returns and wrap the
/// result in the standard envelope.
pub fn run_efficient_frontier(
    input: &FrontierInput,
) -> FrontierResult<ComputationOutput<FrontierOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let points = efficient_frontier(
        &input.statistics,
        input.trading_days,
        &input.target_returns,
        &input.solver,
    )?;
    collect_frontier_warnings(&points, &mut warnings);

    let global_min_variance =
        global_minimum_variance(&input.statistics, input.trading_days, &input.solver)?;
    if let Some(first) = input.target_returns.first() {
        if global_min_variance.converged && *first < global_min_variance.target_return - 1e-12 {
            warnings.push(format!(
                "First target {:.6} lies below the minimum-variance return {:.6}; \
                 lower targets trace the inefficient branch",
                first, global_min_variance.target_return
            ));
        }
    }

    let output = FrontierOutput {
        converged_points: points.iter().filter(|p| p.converged).count(),
        points,
        feasible_return_range: feasible_return_range(&input.statistics, input.trading_days),
        global_min_variance: Some(global_min_variance),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Long-only Mean-Variance Efficient Frontier (active-set QP)",
        &serde_json::json!({
            "n_assets": input.statistics.num_assets(),
            "n_targets": input.target_returns.len(),
            "trading_days": input.trading_days,
            "max_iterations": input.solver.max_iterations,
            "tolerance": input.solver.tolerance,
            "constraints": "sum(w) = 1, 0 <= w_i <= 1, return(w) = target",
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Minimum-volatility long-only allocation for each target annual return.
///
/// Targets are solved independently (in parallel with the `parallel`
/// feature); order of the output matches the input.
pub fn efficient_frontier(
    stats: &AssetStatistics,
    annualization_factor: f64,
    targets: &[f64],
    options: &SolverOptions,
) -> FrontierResult<Vec<FrontierPoint>> {
    validate_factor(annualization_factor)?;
    if let Some(i) = targets.iter().position(|t| !t.is_finite()) {
        return Err(FrontierError::InvalidInput {
            field: format!("target_returns[{}]", i),
            reason: "Target return must be finite".into(),
        });
    }
    let moments = AnnualizedMoments::new(stats, annualization_factor);

    let solve = |t: &f64| solve_target(&moments, *t, options);
    #[cfg(feature = "parallel")]
    let points: FrontierResult<Vec<FrontierPoint>> = targets.par_iter().map(solve).collect();
    #[cfg(not(feature = "parallel"))]
    let points: FrontierResult<Vec<FrontierPoint>> = targets.iter().map(solve).collect();
    points
}

/// `count` evenly spaced targets from `low` to `high` inclusive.
pub fn linspace_targets(low: f64, high: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![low],
        _ => {
            let step = (high - low) / (count - 1) as f64;
            (0..count)
                .map(|k| if k == count - 1 { high } else { low + step * k as f64 })
                .collect()
        }
    }
}

/// Range of annual returns attainable by a long-only fully invested
/// portfolio: the lowest and highest single-asset mean return.
pub fn feasible_return_range(stats: &AssetStatistics, annualization_factor: f64) -> (f64, f64) {
    stats
        .annualized_returns(annualization_factor)
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
            (lo.min(*r), hi.max(*r))
        })
}

/// Global minimum-variance long-only portfolio, without a return target.
/// The returned point's `target_return` is the return it achieves.
pub fn global_minimum_variance(
    stats: &AssetStatistics,
    annualization_factor: f64,
    options: &SolverOptions,
) -> FrontierResult<FrontierPoint> {
    validate_factor(annualization_factor)?;
    let moments = AnnualizedMoments::new(stats, annualization_factor);
    let n = moments.returns.len();
    let qp = QuadraticProgram {
        hessian: moments.covariance.clone(),
        linear: vec![0.0; n],
        equality_matrix: vec![vec![1.0; n]],
        equality_rhs: vec![1.0],
        lower: vec![0.0; n],
        upper: vec![1.0; n],
    };
    let solution = qp.solve(WeightVector::uniform(n).as_slice(), options)?;
    let weights = WeightVector::from_solver(solution.x);
    Ok(FrontierPoint {
        target_return: moments.portfolio_return(weights.as_slice()),
        volatility: moments.portfolio_volatility(weights.as_slice()),
        weights,
        converged: solution.status.is_converged(),
        status: solution.status,
        iterations: solution.iterations,
    })
}

// ---------------------------------------------------------------------------
// Per-target solve
// ---------------------------------------------------------------------------

fn solve_target(
    moments: &AnnualizedMoments,
    target: f64,
    options: &SolverOptions,
) -> FrontierResult<FrontierPoint> {
    let n = moments.returns.len();
    let (lo, hi) = moments
        .returns
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
            (lo.min(*r), hi.max(*r))
        });
    let slack = FEASIBILITY_TOLERANCE * target.abs().max(1.0);

    if target < lo - slack || target > hi + slack {
        let weights = WeightVector::uniform(n);
        warn!(target, min = lo, max = hi, "target return outside feasible range");
        return Ok(FrontierPoint {
            target_return: target,
            volatility: moments.portfolio_volatility(weights.as_slice()),
            weights,
            converged: false,
            status: SolveStatus::Infeasible,
            iterations: 0,
        });
    }

    let qp = QuadraticProgram {
        hessian: moments.covariance.clone(),
        linear: vec![0.0; n],
        equality_matrix: vec![vec![1.0; n], moments.returns.clone()],
        equality_rhs: vec![1.0, target],
        lower: vec![0.0; n],
        upper: vec![1.0; n],
    };
    let x0 = feasible_start(&moments.returns, target.clamp(lo, hi));
    let solution = qp.solve(&x0, options)?;

    let weights = WeightVector::from_solver(solution.x);
    let achieved = moments.portfolio_return(weights.as_slice());
    let mut status = solution.status;
    if status.is_converged() && (achieved - target).abs() > TARGET_RETURN_TOLERANCE {
        status = SolveStatus::Degenerate;
    }

    let point = FrontierPoint {
        target_return: target,
        volatility: moments.portfolio_volatility(weights.as_slice()),
        weights,
        converged: status.is_converged(),
        status,
        iterations: solution.iterations,
    };
    if point.converged {
        debug!(
            target,
            volatility = point.volatility,
            iterations = point.iterations,
            "frontier point solved"
        );
    } else {
        warn!(
            target,
            status = ?point.status,
            iterations = point.iterations,
            "frontier point did not converge"
        );
    }
    Ok(point)
}

/// Shift the uniform allocation toward the highest (or lowest) return asset
/// just far enough to hit `target`. `target` must lie in the feasible range.
fn feasible_start(returns: &[f64], target: f64) -> Vec<f64> {
    let n = returns.len();
    let mut x = vec![1.0 / n as f64; n];
    let uniform_return = returns.iter().sum::<f64>() / n as f64;

    let pick = |better: fn(f64, f64) -> bool| {
        returns
            .iter()
            .enumerate()
            .fold(0, |best, (i, r)| if better(*r, returns[best]) { i } else { best })
    };
    let j = if target >= uniform_return {
        pick(|a, b| a > b)
    } else {
        pick(|a, b| a < b)
    };

    let spread = returns[j] - uniform_return;
    if spread == 0.0 {
        return x;
    }
    let alpha = ((target - uniform_return) / spread).clamp(0.0, 1.0);
    for (i, xi) in x.iter_mut().enumerate() {
        *xi = (1.0 - alpha) / n as f64 + if i == j { alpha } else { 0.0 };
    }
    x
}

fn validate_factor(annualization_factor: f64) -> FrontierResult<()> {
    if !annualization_factor.is_finite() || annualization_factor <= 0.0 {
        return Err(FrontierError::InvalidInput {
            field: "trading_days".into(),
            reason: format!(
                "Annualization factor must be positive, got {}",
                annualization_factor
            ),
        });
    }
    Ok(())
}

pub(crate) fn collect_frontier_warnings(points: &[FrontierPoint], warnings: &mut Vec<String>) {
    let count = |status: SolveStatus| points.iter().filter(|p| p.status == status).count();
    let infeasible = count(SolveStatus::Infeasible);
    let limited = count(SolveStatus::IterationLimit);
    let degenerate = count(SolveStatus::Degenerate);
    if infeasible > 0 {
        warnings.push(format!(
            "{} frontier targets lie outside the feasible return range",
            infeasible
        ));
    }
    if limited > 0 {
        warnings.push(format!(
            "{} frontier points hit the iteration limit and are excluded from matching",
            limited
        ));
    }
    if degenerate > 0 {
        warnings.push(format!(
            "{} frontier points were degenerate and are excluded from matching",
            degenerate
        ));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::statistics::{portfolio_return, portfolio_volatility};
    use pretty_assertions::assert_eq;

    const FACTOR: f64 = 252.0;

    fn three_asset_stats() -> AssetStatistics {
        AssetStatistics::new(
            vec![0.0002, 0.0004, 0.0007],
            vec![
                vec![0.00008, 0.00002, 0.00001],
                vec![0.00002, 0.00012, 0.00004],
                vec![0.00001, 0.00004, 0.00030],
            ],
        )
        .unwrap()
    }

    fn two_asset_stats() -> AssetStatistics {
        AssetStatistics::new(
            vec![0.0004, 0.0006],
            vec![vec![0.0001, 0.00003], vec![0.00003, 0.00015]],
        )
        .unwrap()
    }

    fn efficient_targets(stats: &AssetStatistics, m: usize) -> Vec<f64> {
        let gmv = global_minimum_variance(stats, FACTOR, &SolverOptions::default()).unwrap();
        let (_, hi) = feasible_return_range(stats, FACTOR);
        linspace_targets(gmv.target_return, hi, m)
    }

    // ------------------------------------------------------------------
    // 1. Converged points honour the constraints
    // ------------------------------------------------------------------
    #[test]
    fn test_converged_points_hit_target_and_reproduce_volatility() {
        let stats = three_asset_stats();
        let targets = efficient_targets(&stats, 25);
        let points = efficient_frontier(&stats, FACTOR, &targets, &SolverOptions::default()).unwrap();
        assert_eq!(points.len(), 25);
        for p in &points {
            assert!(p.converged, "status {:?} at {}", p.status, p.target_return);
            let w = p.weights.as_slice();
            assert!((p.weights.sum() - 1.0).abs() <= 1e-9);
            assert!(w.iter().all(|x| (0.0..=1.0).contains(x)));
            assert!((portfolio_return(&stats, FACTOR, w) - p.target_return).abs() <= 1e-6);
            assert!((portfolio_volatility(&stats, FACTOR, w) - p.volatility).abs() <= 1e-9);
        }
    }

    // ------------------------------------------------------------------
    // 2. Monotonic volatility along ascending targets
    // ------------------------------------------------------------------
    #[test]
    fn test_volatility_non_decreasing() {
        let stats = three_asset_stats();
        let targets = efficient_targets(&stats, 40);
        let points = efficient_frontier(&stats, FACTOR, &targets, &SolverOptions::default()).unwrap();
        for pair in points.windows(2) {
            assert!(
                pair[1].volatility >= pair[0].volatility - 1e-12,
                "{} then {}",
                pair[0].volatility,
                pair[1].volatility
            );
        }
    }

    // ------------------------------------------------------------------
    // 3. Two assets: weights pinned by the return constraint
    // ------------------------------------------------------------------
    #[test]
    fn test_two_asset_weights_closed_form() {
        let stats = two_asset_stats();
        let (lo, hi) = feasible_return_range(&stats, FACTOR);
        let target = 0.25 * lo + 0.75 * hi;
        let points = efficient_frontier(&stats, FACTOR, &[target], &SolverOptions::default()).unwrap();
        let w = points[0].weights.as_slice();
        assert!(points[0].converged);
        assert!((w[0] - 0.25).abs() < 1e-9);
        assert!((w[1] - 0.75).abs() < 1e-9);
    }

    // ------------------------------------------------------------------
    // 4. Endpoints of the feasible range
    // ------------------------------------------------------------------
    #[test]
    fn test_max_return_target_is_single_asset() {
        let stats = three_asset_stats();
        let (_, hi) = feasible_return_range(&stats, FACTOR);
        let points = efficient_frontier(&stats, FACTOR, &[hi], &SolverOptions::default()).unwrap();
        assert_eq!(points[0].status, SolveStatus::Converged);
        assert!((points[0].weights.as_slice()[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_min_return_target_is_single_asset() {
        let stats = three_asset_stats();
        let (lo, _) = feasible_return_range(&stats, FACTOR);
        let points = efficient_frontier(&stats, FACTOR, &[lo], &SolverOptions::default()).unwrap();
        assert!(points[0].converged);
        assert!((points[0].weights.as_slice()[0] - 1.0).abs() < 1e-12);
    }

    // ------------------------------------------------------------------
    // 5. Infeasible targets fail fast
    // ------------------------------------------------------------------
    #[test]
    fn test_infeasible_target() {
        let stats = three_asset_stats();
        let (lo, hi) = feasible_return_range(&stats, FACTOR);
        let points =
            efficient_frontier(&stats, FACTOR, &[hi + 0.05, lo - 0.05], &SolverOptions::default())
                .unwrap();
        for p in &points {
            assert_eq!(p.status, SolveStatus::Infeasible);
            assert!(!p.converged);
            assert_eq!(p.iterations, 0);
            assert_eq!(p.weights, WeightVector::uniform(3));
        }
    }

    // ------------------------------------------------------------------
    // 6. Iteration budget
    // ------------------------------------------------------------------
    #[test]
    fn test_iteration_limit_marks_non_convergent() {
        let stats = three_asset_stats();
        let (_, hi) = feasible_return_range(&stats, FACTOR);
        // Confirming optimality needs at least one iteration after the
        // first step.
        let target = hi - 0.001;
        let options = SolverOptions {
            max_iterations: 1,
            tolerance: 1e-10,
        };
        let points = efficient_frontier(&stats, FACTOR, &[target], &options).unwrap();
        assert_eq!(points[0].status, SolveStatus::IterationLimit);
        assert!(!points[0].converged);
        assert!((points[0].weights.sum() - 1.0).abs() <= 1e-9);
    }

    // ------------------------------------------------------------------
    // 7. Equal means: the return constraint is redundant
    // ------------------------------------------------------------------
    #[test]
    fn test_equal_means_collapse_to_min_variance() {
        let stats = AssetStatistics::new(
            vec![0.0003, 0.0003],
            vec![vec![0.0001, 0.0], vec![0.0, 0.0003]],
        )
        .unwrap();
        let target = 0.0003 * FACTOR;
        let points = efficient_frontier(&stats, FACTOR, &[target], &SolverOptions::default()).unwrap();
        assert!(points[0].converged, "status {:?}", points[0].status);
        // Inverse-variance weights: 0.75 / 0.25.
        let w = points[0].weights.as_slice();
        assert!((w[0] - 0.75).abs() < 1e-9);
    }

    // ------------------------------------------------------------------
    // 8. Global minimum variance and helpers
    // ------------------------------------------------------------------
    #[test]
    fn test_global_minimum_variance_is_lowest() {
        let stats = three_asset_stats();
        let gmv = global_minimum_variance(&stats, FACTOR, &SolverOptions::default()).unwrap();
        assert!(gmv.converged);
        let targets = linspace_targets(0.06, 0.17, 12);
        let points = efficient_frontier(&stats, FACTOR, &targets, &SolverOptions::default()).unwrap();
        for p in points.iter().filter(|p| p.converged) {
            assert!(p.volatility >= gmv.volatility - 1e-12);
        }
    }

    #[test]
    fn test_linspace_targets() {
        assert_eq!(linspace_targets(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace_targets(0.3, 0.9, 1), vec![0.3]);
        assert!(linspace_targets(0.3, 0.9, 0).is_empty());
    }

    #[test]
    fn test_feasible_start_hits_target() {
        let returns = vec![0.05, 0.10, 0.20];
        for target in [0.05, 0.08, 0.1166, 0.15, 0.20] {
            let x = feasible_start(&returns, target);
            let r: f64 = x.iter().zip(&returns).map(|(a, b)| a * b).sum();
            assert!((r - target).abs() < 1e-15, "target {}", target);
            assert!((x.iter().sum::<f64>() - 1.0).abs() < 1e-15);
            assert!(x.iter().all(|v| *v >= 0.0));
        }
    }

    // ------------------------------------------------------------------
    // 9. Validation and envelope
    // ------------------------------------------------------------------
    #[test]
    fn test_non_finite_target_rejected() {
        let err = efficient_frontier(&two_asset_stats(), FACTOR, &[f64::NAN], &SolverOptions::default());
        assert!(err.is_err());
    }

    #[test]
    fn test_run_efficient_frontier_envelope() {
        let input = FrontierInput {
            statistics: three_asset_stats(),
            trading_days: FACTOR,
            target_returns: vec![0.08, 0.12, 0.5],
            solver: SolverOptions::default(),
        };
        let out = run_efficient_frontier(&input).unwrap();
        assert_eq!(out.result.points.len(), 3);
        assert_eq!(out.result.converged_points, 2);
        assert!(out.warnings.iter().any(|w| w.contains("feasible return range")));
        assert_eq!(out.metadata.precision, "ieee754_f64");
    }

    // ------------------------------------------------------------------
    // 10. Singular covariance
    // ------------------------------------------------------------------
    #[test]
    fn test_duplicated_asset_frontier_converges() {
        // Asset 2 repeats asset 0.
        let stats = AssetStatistics::new(
            vec![0.0002, 0.0007, 0.0002],
            vec![
                vec![0.00008, 0.00001, 0.00008],
                vec![0.00001, 0.00030, 0.00001],
                vec![0.00008, 0.00001, 0.00008],
            ],
        )
        .unwrap();
        let (lo, hi) = feasible_return_range(&stats, FACTOR);
        let targets = linspace_targets(lo, hi, 10);
        let points = efficient_frontier(&stats, FACTOR, &targets, &SolverOptions::default()).unwrap();
        for p in &points {
            assert_eq!(p.status, SolveStatus::Converged, "target {}", p.target_return);
            let w = p.weights.as_slice();
            assert!((portfolio_return(&stats, FACTOR, w) - p.target_return).abs() <= 1e-8);
        }
        let gmv = global_minimum_variance(&stats, FACTOR, &SolverOptions::default()).unwrap();
        assert!(gmv.converged);
    }

    // ------------------------------------------------------------------
    // 11. Parallel solves
    // ------------------------------------------------------------------
    #[cfg(feature = "parallel")]
    #[test]
    fn test_thread_count_does_not_change_frontier() {
        let stats = three_asset_stats();
        let targets = efficient_targets(&stats, 30);
        let run = |threads: usize| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap()
                .install(|| {
                    efficient_frontier(&stats, FACTOR, &targets, &SolverOptions::default()).unwrap()
                })
        };
        let single = run(1);
        assert_eq!(single, run(4));

        // Each target solved on its own gives the same point.
        let moments = AnnualizedMoments::new(&stats, FACTOR);
        for (t, p) in targets.iter().zip(single.iter()) {
            assert_eq!(&solve_target(&moments, *t, &SolverOptions::default()).unwrap(), p);
        }
    }
}
