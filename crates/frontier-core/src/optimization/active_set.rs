//! Primal active-set solver for convex quadratic programs
//!
//! ```text
//! minimize    0.5 * x' G x + c' x
//! subject to  A x = b
//!             lower <= x <= upper
//! ```
//!
//! Iterates stay feasible, so on budget exhaustion the last iterate is the
//! best point found. Every outcome is reported through `SolveStatus`.
//!
//! G only needs to be positive semi-definite. When the reduced KKT system is
//! singular the step is taken from its echelon form: a consistent system
//! yields one of its many minimizers, and an inconsistent one exposes a
//! zero-curvature descent ray that is followed to the nearest bound.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::FrontierError;
use crate::linalg::{mat_vec_multiply, norm_inf, solve_linear_system, solve_rank_deficient, vec_dot};
use crate::FrontierResult;

/// Slack allowed when checking that a starting point is feasible.
pub const FEASIBILITY_TOLERANCE: f64 = 1e-9;

/// Distance from a bound at which a variable counts as sitting on it.
const ACTIVE_TOLERANCE: f64 = 1e-12;

/// Relative residual below which a constraint row is a linear combination
/// of the rows already kept.
const RANK_TOLERANCE: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Iteration budget and optimality tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Maximum active-set iterations per solve.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Step-length and multiplier tolerance.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

fn default_max_iterations() -> u32 {
    500
}

fn default_tolerance() -> f64 {
    1e-10
}

/// Outcome of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// KKT conditions hold within tolerance.
    Converged,
    /// Budget exhausted before optimality was confirmed.
    IterationLimit,
    /// No feasible starting point exists for the constraints.
    Infeasible,
    /// The objective decreases without bound along a zero-curvature ray,
    /// or the returned point misses the equality constraints.
    Degenerate,
}

impl SolveStatus {
    pub fn is_converged(self) -> bool {
        self == SolveStatus::Converged
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveBound {
    Lower,
    Upper,
}

/// A convex quadratic program with linear equalities and box bounds.
#[derive(Debug, Clone)]
pub struct QuadraticProgram {
    /// Symmetric positive semi-definite Hessian G (n x n).
    pub hessian: Vec<Vec<f64>>,
    /// Linear term c (n).
    pub linear: Vec<f64>,
    /// Equality constraint matrix A (m x n).
    pub equality_matrix: Vec<Vec<f64>>,
    /// Equality right-hand side b (m).
    pub equality_rhs: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Result of `QuadraticProgram::solve`.
#[derive(Debug, Clone)]
pub struct QpSolution {
    pub x: Vec<f64>,
    pub objective: f64,
    pub status: SolveStatus,
    pub iterations: u32,
}

/// Search direction on the current free set.
struct EqualityStep {
    direction: Vec<f64>,
    /// The direction is a zero-curvature descent ray: the step length is
    /// limited only by the bounds.
    ray: bool,
    /// Equality multipliers, zero for rows dropped as dependent.
    multipliers: Vec<f64>,
    /// Rows that are linear combinations of kept rows on the free set,
    /// with their coefficients over the kept rows.
    dependent: Vec<(usize, Vec<(usize, f64)>)>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl QuadraticProgram {
    pub fn dimension(&self) -> usize {
        self.linear.len()
    }

    /// 0.5 * x' G x + c' x
    pub fn objective(&self, x: &[f64]) -> f64 {
        0.5 * vec_dot(x, &mat_vec_multiply(&self.hessian, x)) + vec_dot(&self.linear, x)
    }

    /// Whether `x` satisfies every constraint within `tolerance`.
    pub fn is_feasible(&self, x: &[f64], tolerance: f64) -> bool {
        let bounds_ok = x
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(xi, (lo, hi))| *xi >= lo - tolerance && *xi <= hi + tolerance);
        let equalities_ok = self
            .equality_matrix
            .iter()
            .zip(self.equality_rhs.iter())
            .all(|(row, b)| (vec_dot(row, x) - b).abs() <= tolerance * b.abs().max(1.0));
        bounds_ok && equalities_ok
    }

    /// Solve from the feasible starting point `x0`.
    ///
    /// Malformed problems are errors. An infeasible `x0`, a singular KKT
    /// system and an exhausted budget are reported through the status with
    /// the last iterate attached.
    pub fn solve(&self, x0: &[f64], options: &SolverOptions) -> FrontierResult<QpSolution> {
        self.validate()?;
        let n = self.dimension();
        if x0.len() != n {
            return Err(FrontierError::InvalidInput {
                field: "x0".into(),
                reason: format!("Expected {} values but got {}", n, x0.len()),
            });
        }
        if options.max_iterations == 0 || !(options.tolerance > 0.0) {
            return Err(FrontierError::InvalidInput {
                field: "solver".into(),
                reason: "max_iterations and tolerance must be positive".into(),
            });
        }

        if !self.is_feasible(x0, FEASIBILITY_TOLERANCE) {
            return Ok(self.finish(x0.to_vec(), SolveStatus::Infeasible, 0));
        }

        // The initial working set holds only lower bounds (and fixed
        // variables); upper bounds enter through the ratio test, so a start
        // at a vertex of the simplex keeps its nonzero variable free.
        let mut x = x0.to_vec();
        let mut working: Vec<Option<ActiveBound>> = vec![None; n];
        for i in 0..n {
            if self.upper[i] - self.lower[i] <= ACTIVE_TOLERANCE
                || x[i] - self.lower[i] <= ACTIVE_TOLERANCE
            {
                x[i] = self.lower[i];
                working[i] = Some(ActiveBound::Lower);
            }
        }

        for iteration in 1..=options.max_iterations {
            let gradient: Vec<f64> = mat_vec_multiply(&self.hessian, &x)
                .iter()
                .zip(self.linear.iter())
                .map(|(gx, c)| gx + c)
                .collect();
            let free: Vec<usize> = (0..n).filter(|&i| working[i].is_none()).collect();

            let step = match self.equality_step(&gradient, &free, options.tolerance) {
                Ok(step) => step,
                Err(FrontierError::SingularSystem(reason)) => {
                    trace!(iteration, %reason, "reduced KKT system unresolved");
                    return Ok(self.finish(x, SolveStatus::Degenerate, iteration));
                }
                Err(e) => return Err(e),
            };

            if !step.ray && norm_inf(&step.direction) <= options.tolerance {
                match self.release_candidate(&gradient, &step, &working, options.tolerance) {
                    None => return Ok(self.finish(x, SolveStatus::Converged, iteration)),
                    Some(i) => {
                        trace!(iteration, index = i, "releasing bound");
                        working[i] = None;
                    }
                }
                continue;
            }

            // Ratio test: longest step along the direction that keeps every
            // free variable within its bounds.
            let mut alpha = if step.ray { f64::INFINITY } else { 1.0_f64 };
            let mut blocking: Option<(usize, ActiveBound)> = None;
            for &i in &free {
                let p = step.direction[i];
                let limit = if p < 0.0 {
                    Some(((self.lower[i] - x[i]) / p, ActiveBound::Lower))
                } else if p > 0.0 {
                    Some(((self.upper[i] - x[i]) / p, ActiveBound::Upper))
                } else {
                    None
                };
                if let Some((a, bound)) = limit {
                    if a < alpha {
                        alpha = a.max(0.0);
                        blocking = Some((i, bound));
                    }
                }
            }
            if !alpha.is_finite() {
                trace!(iteration, "objective unbounded along a zero-curvature ray");
                return Ok(self.finish(x, SolveStatus::Degenerate, iteration));
            }

            for &i in &free {
                x[i] += alpha * step.direction[i];
            }
            if let Some((i, bound)) = blocking {
                x[i] = match bound {
                    ActiveBound::Lower => self.lower[i],
                    ActiveBound::Upper => self.upper[i],
                };
                working[i] = Some(bound);
                trace!(iteration, index = i, alpha, "bound became active");
            }
        }

        Ok(self.finish(x, SolveStatus::IterationLimit, options.max_iterations))
    }
}

// ---------------------------------------------------------------------------
// Core routines
// ---------------------------------------------------------------------------

impl QuadraticProgram {
    fn finish(&self, x: Vec<f64>, status: SolveStatus, iterations: u32) -> QpSolution {
        QpSolution {
            objective: self.objective(&x),
            x,
            status,
            iterations,
        }
    }

    /// Solve the equality-constrained subproblem on the free set:
    ///
    /// minimize 0.5 p' G p + g' p  subject to  A_F p_F = 0, p_W = 0.
    ///
    /// Null vectors of the KKT matrix have zero multiplier part, so their
    /// direction part z satisfies G z = 0 and A_F z = 0. A null vector with
    /// g' z != 0 is returned as a descent ray.
    fn equality_step(
        &self,
        gradient: &[f64],
        free: &[usize],
        tolerance: f64,
    ) -> FrontierResult<EqualityStep> {
        let n = self.dimension();
        let m = self.equality_rhs.len();
        let (kept, dependent) = self.independent_rows(free)?;

        let mut direction = vec![0.0; n];
        let mut multipliers = vec![0.0; m];
        if free.is_empty() {
            return Ok(EqualityStep {
                direction,
                ray: false,
                multipliers,
                dependent,
            });
        }

        let nf = free.len();
        let size = nf + kept.len();
        let mut kkt = vec![vec![0.0; size]; size];
        let mut rhs = vec![0.0; size];
        for (a, &i) in free.iter().enumerate() {
            for (b, &j) in free.iter().enumerate() {
                kkt[a][b] = self.hessian[i][j];
            }
            for (r, &row) in kept.iter().enumerate() {
                let v = self.equality_matrix[row][i];
                kkt[a][nf + r] = v;
                kkt[nf + r][a] = v;
            }
            rhs[a] = -gradient[i];
        }

        let echelon = solve_rank_deficient(&kkt, &rhs)?;
        let gradient_scale = norm_inf(&rhs[..nf]).max(1.0);

        // Steepest zero-curvature descent among the null vectors.
        let descent = echelon
            .null_basis
            .iter()
            .filter_map(|z| {
                let part = &z[..nf];
                let length = norm_inf(part);
                if length == 0.0 {
                    return None;
                }
                let slope = free
                    .iter()
                    .zip(part.iter())
                    .map(|(&i, zi)| gradient[i] * zi)
                    .sum::<f64>()
                    / length;
                Some((part, length, slope))
            })
            .filter(|(_, _, slope)| slope.abs() > tolerance * gradient_scale)
            .fold(None, |best: Option<(&[f64], f64, f64)>, candidate| match best {
                Some(b) if b.2.abs() >= candidate.2.abs() => Some(b),
                _ => Some(candidate),
            });

        if let Some((part, length, slope)) = descent {
            let sign = -slope.signum() / length;
            for (a, &i) in free.iter().enumerate() {
                direction[i] = sign * part[a];
            }
            return Ok(EqualityStep {
                direction,
                ray: true,
                multipliers,
                dependent,
            });
        }

        if echelon.inconsistency > tolerance * gradient_scale {
            return Err(FrontierError::SingularSystem(format!(
                "Reduced KKT system inconsistent by {:e}",
                echelon.inconsistency
            )));
        }

        for (a, &i) in free.iter().enumerate() {
            direction[i] = echelon.solution[a];
        }
        for (r, &row) in kept.iter().enumerate() {
            multipliers[row] = echelon.solution[nf + r];
        }

        Ok(EqualityStep {
            direction,
            ray: false,
            multipliers,
            dependent,
        })
    }

    /// Split equality rows into a linearly independent subset on the free
    /// columns and the rows that depend on it.
    #[allow(clippy::type_complexity)]
    fn independent_rows(
        &self,
        free: &[usize],
    ) -> FrontierResult<(Vec<usize>, Vec<(usize, Vec<(usize, f64)>)>)> {
        let restricted: Vec<Vec<f64>> = self
            .equality_matrix
            .iter()
            .map(|row| free.iter().map(|&i| row[i]).collect())
            .collect();

        let mut kept: Vec<usize> = Vec::new();
        let mut dependent = Vec::new();
        for (r, row) in restricted.iter().enumerate() {
            let row_norm = norm_inf(row);
            let coefficients = if kept.is_empty() {
                Vec::new()
            } else {
                let gram: Vec<Vec<f64>> = kept
                    .iter()
                    .map(|&k| kept.iter().map(|&l| vec_dot(&restricted[k], &restricted[l])).collect())
                    .collect();
                let proj: Vec<f64> = kept.iter().map(|&k| vec_dot(&restricted[k], row)).collect();
                solve_linear_system(&gram, &proj)?
            };
            let residual: Vec<f64> = row
                .iter()
                .enumerate()
                .map(|(a, v)| {
                    v - kept
                        .iter()
                        .zip(coefficients.iter())
                        .map(|(&k, c)| c * restricted[k][a])
                        .sum::<f64>()
                })
                .collect();

            if norm_inf(&residual) <= RANK_TOLERANCE * row_norm.max(1.0) {
                dependent.push((r, kept.iter().copied().zip(coefficients).collect()));
            } else {
                kept.push(r);
            }
        }
        Ok((kept, dependent))
    }

    /// Pick the working-set bound whose multiplier has the wrong sign, or
    /// `None` when the current point satisfies the KKT conditions.
    ///
    /// With one dependent equality row the multipliers are determined only
    /// up to a shift `s` along the null direction; the shift is chosen to
    /// satisfy every sign condition when such a shift exists.
    fn release_candidate(
        &self,
        gradient: &[f64],
        step: &EqualityStep,
        working: &[Option<ActiveBound>],
        tolerance: f64,
    ) -> Option<usize> {
        let null_direction = match step.dependent.as_slice() {
            [(row, coefficients)] => Some((row, coefficients)),
            _ => None,
        };

        // (index, bound, multiplier, derivative wrt shift)
        let active: Vec<(usize, ActiveBound, f64, f64)> = working
            .iter()
            .enumerate()
            .filter_map(|(i, bound)| bound.map(|b| (i, b)))
            .map(|(i, bound)| {
                let base = gradient[i]
                    + self
                        .equality_matrix
                        .iter()
                        .zip(step.multipliers.iter())
                        .map(|(row, nu)| nu * row[i])
                        .sum::<f64>();
                let slope = match null_direction {
                    Some((&row, coefficients)) => {
                        self.equality_matrix[row][i]
                            - coefficients
                                .iter()
                                .map(|(k, c)| c * self.equality_matrix[*k][i])
                                .sum::<f64>()
                    }
                    None => 0.0,
                };
                (i, bound, base, slope)
            })
            .collect();

        let mut lo = f64::NEG_INFINITY;
        let mut hi = f64::INFINITY;
        for &(_, bound, base, slope) in &active {
            if slope == 0.0 {
                continue;
            }
            // Lower bounds need base + s*slope >= -tol, upper bounds <= tol.
            let limit = match bound {
                ActiveBound::Lower => (-tolerance - base) / slope,
                ActiveBound::Upper => (tolerance - base) / slope,
            };
            let is_floor = matches!(
                (bound, slope > 0.0),
                (ActiveBound::Lower, true) | (ActiveBound::Upper, false)
            );
            if is_floor {
                lo = lo.max(limit);
            } else {
                hi = hi.min(limit);
            }
        }
        let shift = if lo <= hi {
            0.0_f64.clamp(lo, hi)
        } else {
            0.5 * (lo + hi)
        };

        active
            .iter()
            .map(|&(i, bound, base, slope)| {
                let multiplier = base + shift * slope;
                let violation = match bound {
                    ActiveBound::Lower => -multiplier,
                    ActiveBound::Upper => multiplier,
                };
                (i, violation)
            })
            .filter(|(_, violation)| *violation > tolerance)
            .fold(None, |best: Option<(usize, f64)>, (i, v)| match best {
                Some((_, bv)) if bv >= v => best,
                _ => Some((i, v)),
            })
            .map(|(i, _)| i)
    }

    fn validate(&self) -> FrontierResult<()> {
        let n = self.dimension();
        if n == 0 {
            return Err(FrontierError::InsufficientData(
                "Quadratic program has no variables".into(),
            ));
        }
        if self.hessian.len() != n || self.hessian.iter().any(|row| row.len() != n) {
            return Err(FrontierError::InvalidInput {
                field: "hessian".into(),
                reason: format!("Expected {}x{} matrix", n, n),
            });
        }
        if self.equality_matrix.len() != self.equality_rhs.len()
            || self.equality_matrix.iter().any(|row| row.len() != n)
        {
            return Err(FrontierError::InvalidInput {
                field: "equality_matrix".into(),
                reason: format!(
                    "Expected {} rows of length {}",
                    self.equality_rhs.len(),
                    n
                ),
            });
        }
        if self.lower.len() != n || self.upper.len() != n {
            return Err(FrontierError::InvalidInput {
                field: "bounds".into(),
                reason: format!("Expected {} lower and upper bounds", n),
            });
        }
        if let Some(i) = (0..n).find(|&i| !(self.lower[i] <= self.upper[i])) {
            return Err(FrontierError::InvalidInput {
                field: format!("bounds[{}]", i),
                reason: format!("lower {} > upper {}", self.lower[i], self.upper[i]),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn simplex_qp(hessian: Vec<Vec<f64>>, mu: Vec<f64>, target: f64) -> QuadraticProgram {
        let n = mu.len();
        QuadraticProgram {
            hessian,
            linear: vec![0.0; n],
            equality_matrix: vec![vec![1.0; n], mu],
            equality_rhs: vec![1.0, target],
            lower: vec![0.0; n],
            upper: vec![1.0; n],
        }
    }

    fn start_point(mu: &[f64], target: f64) -> Vec<f64> {
        // Convex combination of the uniform point and the best/worst vertex.
        let n = mu.len();
        let ru = mu.iter().sum::<f64>() / n as f64;
        let (j, extreme) = if target >= ru {
            mu.iter().enumerate().fold((0, f64::MIN), |b, (i, v)| if *v > b.1 { (i, *v) } else { b })
        } else {
            mu.iter().enumerate().fold((0, f64::MAX), |b, (i, v)| if *v < b.1 { (i, *v) } else { b })
        };
        let alpha = if (extreme - ru).abs() > 0.0 { (target - ru) / (extreme - ru) } else { 0.0 };
        let mut x = vec![(1.0 - alpha) / n as f64; n];
        x[j] += alpha;
        x
    }

    // ------------------------------------------------------------------
    // 1. Unconstrained-in-the-interior solution matches the closed form
    // ------------------------------------------------------------------
    #[test]
    fn test_interior_min_variance_matches_closed_form() {
        // min 0.5 x'Gx s.t. sum x = 1 with G diagonal: x_i ∝ 1/g_i
        let qp = QuadraticProgram {
            hessian: vec![vec![1.0, 0.0], vec![0.0, 3.0]],
            linear: vec![0.0, 0.0],
            equality_matrix: vec![vec![1.0, 1.0]],
            equality_rhs: vec![1.0],
            lower: vec![0.0, 0.0],
            upper: vec![1.0, 1.0],
        };
        let sol = qp.solve(&[0.5, 0.5], &SolverOptions::default()).unwrap();
        assert_eq!(sol.status, SolveStatus::Converged);
        assert!((sol.x[0] - 0.75).abs() < 1e-12);
        assert!((sol.x[1] - 0.25).abs() < 1e-12);
    }

    // ------------------------------------------------------------------
    // 2. Two assets: return constraint pins the weights
    // ------------------------------------------------------------------
    #[test]
    fn test_two_asset_target_pins_weights() {
        let g = vec![vec![0.04, 0.006], vec![0.006, 0.01]];
        let mu = vec![0.10, 0.06];
        let qp = simplex_qp(g, mu.clone(), 0.08);
        let sol = qp.solve(&start_point(&mu, 0.08), &SolverOptions::default()).unwrap();
        assert!(sol.status.is_converged());
        assert!((sol.x[0] - 0.5).abs() < 1e-10);
        assert!((sol.x[1] - 0.5).abs() < 1e-10);
    }

    // ------------------------------------------------------------------
    // 3. A lower bound becomes active
    // ------------------------------------------------------------------
    #[test]
    fn test_lower_bound_activates() {
        // Asset 2 is dominated (same return as asset 1, much riskier,
        // positively correlated) and must be dropped entirely.
        let g = vec![
            vec![0.04, 0.0, 0.06],
            vec![0.0, 0.09, 0.0],
            vec![0.06, 0.0, 0.25],
        ];
        let mu = vec![0.08, 0.12, 0.08];
        let qp = simplex_qp(g, mu.clone(), 0.10);
        let sol = qp.solve(&start_point(&mu, 0.10), &SolverOptions::default()).unwrap();
        assert_eq!(sol.status, SolveStatus::Converged);
        assert!(sol.x[2].abs() < 1e-12, "x = {:?}", sol.x);
        assert!((sol.x[0] - 0.5).abs() < 1e-10);
        assert!((sol.x[1] - 0.5).abs() < 1e-10);
    }

    // ------------------------------------------------------------------
    // 4. Target at the top of the feasible range (vertex solution)
    // ------------------------------------------------------------------
    #[test]
    fn test_vertex_target_converges() {
        let g = vec![
            vec![0.04, 0.01, 0.0],
            vec![0.01, 0.09, 0.02],
            vec![0.0, 0.02, 0.16],
        ];
        let mu = vec![0.05, 0.08, 0.12];
        let qp = simplex_qp(g, mu.clone(), 0.12);
        let sol = qp.solve(&start_point(&mu, 0.12), &SolverOptions::default()).unwrap();
        assert_eq!(sol.status, SolveStatus::Converged);
        assert!((sol.x[2] - 1.0).abs() < 1e-12);
    }

    // ------------------------------------------------------------------
    // 5. Optimality: no feasible perturbation improves the objective
    // ------------------------------------------------------------------
    #[test]
    fn test_solution_beats_feasible_perturbations() {
        let g = vec![
            vec![0.040, 0.006, 0.010, 0.002],
            vec![0.006, 0.020, 0.004, 0.001],
            vec![0.010, 0.004, 0.090, 0.012],
            vec![0.002, 0.001, 0.012, 0.060],
        ];
        let mu = vec![0.07, 0.04, 0.12, 0.09];
        let target = 0.085;
        let qp = simplex_qp(g, mu.clone(), target);
        let sol = qp.solve(&start_point(&mu, target), &SolverOptions::default()).unwrap();
        assert!(sol.status.is_converged());
        assert!(qp.is_feasible(&sol.x, 1e-12));

        // Directions d with sum d = 0 and mu'd = 0 built from triples.
        let n = mu.len();
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    if i == j || j == k || i == k {
                        continue;
                    }
                    // d = e_i + a e_j + b e_k, solve for a, b
                    let det = mu[k] - mu[j];
                    if det.abs() < 1e-12 {
                        continue;
                    }
                    let a = (mu[i] - mu[k]) / det;
                    let b = -1.0 - a;
                    for eps in [1e-4, -1e-4] {
                        let mut y = sol.x.clone();
                        y[i] += eps;
                        y[j] += eps * a;
                        y[k] += eps * b;
                        if qp.is_feasible(&y, 1e-12) {
                            assert!(qp.objective(&y) >= sol.objective - 1e-15);
                        }
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // 6. Infeasible starting point is reported, not iterated
    // ------------------------------------------------------------------
    #[test]
    fn test_infeasible_start_reported() {
        let qp = simplex_qp(vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec![0.1, 0.2], 0.15);
        let sol = qp.solve(&[0.9, 0.9], &SolverOptions::default()).unwrap();
        assert_eq!(sol.status, SolveStatus::Infeasible);
        assert_eq!(sol.iterations, 0);
    }

    // ------------------------------------------------------------------
    // 7. Iteration budget is honoured
    // ------------------------------------------------------------------
    #[test]
    fn test_iteration_limit() {
        let g = vec![
            vec![0.04, 0.0, 0.06],
            vec![0.0, 0.09, 0.0],
            vec![0.06, 0.0, 0.25],
        ];
        let mu = vec![0.08, 0.12, 0.08];
        let qp = simplex_qp(g, mu.clone(), 0.10);
        let options = SolverOptions {
            max_iterations: 1,
            tolerance: 1e-10,
        };
        let sol = qp.solve(&start_point(&mu, 0.10), &options).unwrap();
        assert_eq!(sol.status, SolveStatus::IterationLimit);
        assert_eq!(sol.iterations, 1);
        // Iterates remain feasible.
        assert!(qp.is_feasible(&sol.x, 1e-9));
    }

    // ------------------------------------------------------------------
    // 8. Singular Hessian on the constraint null space
    // ------------------------------------------------------------------
    #[test]
    fn test_duplicate_assets_converge() {
        // Two identical assets: only their combined weight is determined.
        let g = vec![
            vec![0.04, 0.04, 0.0],
            vec![0.04, 0.04, 0.0],
            vec![0.0, 0.0, 0.09],
        ];
        let mu = vec![0.08, 0.08, 0.12];
        let qp = simplex_qp(g, mu.clone(), 0.10);
        let sol = qp.solve(&start_point(&mu, 0.10), &SolverOptions::default()).unwrap();
        assert_eq!(sol.status, SolveStatus::Converged);
        assert!(qp.is_feasible(&sol.x, 1e-9));
        assert!((sol.x[0] + sol.x[1] - 0.5).abs() < 1e-10);
        assert!((sol.x[2] - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_duplicate_assets_keep_uneven_split() {
        // Any split of the duplicated pair is optimal, so an uneven start is
        // accepted where it stands.
        let g = vec![
            vec![0.04, 0.04, 0.0],
            vec![0.04, 0.04, 0.0],
            vec![0.0, 0.0, 0.09],
        ];
        let mu = vec![0.08, 0.08, 0.12];
        let qp = simplex_qp(g, mu, 0.09);
        let sol = qp.solve(&[0.7, 0.05, 0.25], &SolverOptions::default()).unwrap();
        assert_eq!(sol.status, SolveStatus::Converged);
        // u + v = 1, 0.08 u + 0.12 v = 0.09 pins u = 0.75 in total.
        assert!((sol.x[0] + sol.x[1] - 0.75).abs() < 1e-10);
        assert!((sol.x[2] - 0.25).abs() < 1e-10);
        let expected = 0.5 * (0.04 * 0.75 * 0.75 + 0.09 * 0.25 * 0.25);
        assert!((sol.objective - expected).abs() < 1e-14);
    }

    #[test]
    fn test_zero_curvature_ray_runs_to_bound() {
        // x1 and x2 carry no curvature; the linear term pulls weight onto x1.
        let qp = QuadraticProgram {
            hessian: vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 0.0, 0.0],
                vec![0.0, 0.0, 0.0],
            ],
            linear: vec![0.0, -1.0, 0.0],
            equality_matrix: vec![vec![1.0, 1.0, 1.0]],
            equality_rhs: vec![1.0],
            lower: vec![0.0; 3],
            upper: vec![1.0; 3],
        };
        let third = 1.0 / 3.0;
        let sol = qp.solve(&[third, third, third], &SolverOptions::default()).unwrap();
        assert_eq!(sol.status, SolveStatus::Converged);
        assert!(sol.x[0].abs() < 1e-12, "x = {:?}", sol.x);
        assert!((sol.x[1] - 1.0).abs() < 1e-12);
        assert!(sol.x[2].abs() < 1e-12);
        assert!((sol.objective + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unbounded_ray_is_degenerate() {
        let qp = QuadraticProgram {
            hessian: vec![vec![0.0, 0.0], vec![0.0, 0.0]],
            linear: vec![-1.0, 0.0],
            equality_matrix: vec![vec![1.0, 1.0]],
            equality_rhs: vec![1.0],
            lower: vec![f64::NEG_INFINITY; 2],
            upper: vec![f64::INFINITY; 2],
        };
        let sol = qp.solve(&[0.5, 0.5], &SolverOptions::default()).unwrap();
        assert_eq!(sol.status, SolveStatus::Degenerate);
        assert_eq!(sol.iterations, 1);
    }

    // ------------------------------------------------------------------
    // 9. Validation
    // ------------------------------------------------------------------
    #[test]
    fn test_dimension_mismatch_rejected() {
        let qp = simplex_qp(vec![vec![1.0]], vec![0.1, 0.2], 0.15);
        assert!(qp.solve(&[0.5, 0.5], &SolverOptions::default()).is_err());
    }

    #[test]
    fn test_wrong_start_length_rejected() {
        let qp = simplex_qp(vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec![0.1, 0.2], 0.15);
        assert!(qp.solve(&[1.0], &SolverOptions::default()).is_err());
    }

    #[test]
    fn test_default_options_from_json() {
        let o: SolverOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(o.max_iterations, 500);
        assert_eq!(o.tolerance, 1e-10);
    }
}
