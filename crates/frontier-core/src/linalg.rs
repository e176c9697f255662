//! Dense linear-algebra helpers shared by the sampler and the optimizer.
//!
//! Matrices are row-major `Vec<Vec<f64>>`; dimensions are validated by the
//! callers before reaching these routines.

use crate::error::FrontierError;
use crate::FrontierResult;

/// Pivot magnitude below which a system is treated as singular.
pub const PIVOT_EPSILON: f64 = 1e-14;

/// Dot product.
pub fn vec_dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Matrix-vector multiplication.
pub fn mat_vec_multiply(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

/// Quadratic form x' * M * x.
pub fn quad_form(mat: &[Vec<f64>], x: &[f64]) -> f64 {
    vec_dot(x, &mat_vec_multiply(mat, x))
}

/// Multiply every entry of a matrix by `factor`.
pub fn scale_matrix(mat: &[Vec<f64>], factor: f64) -> Vec<Vec<f64>> {
    mat.iter()
        .map(|row| row.iter().map(|v| v * factor).collect())
        .collect()
}

/// Infinity norm of a vector.
pub fn norm_inf(v: &[f64]) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

/// Reduced row-echelon form of a square system that may be rank deficient.
#[derive(Debug, Clone)]
pub struct EchelonSolution {
    /// A solution with every non-pivot variable set to zero. Exact when the
    /// system is consistent.
    pub solution: Vec<f64>,
    /// One null-space vector per non-pivot column.
    pub null_basis: Vec<Vec<f64>>,
    /// Largest right-hand side left in a row without a pivot.
    pub inconsistency: f64,
}

/// Solve `A x = b` by Gauss-Jordan elimination with partial pivoting.
///
/// Pivots are compared against `PIVOT_EPSILON` scaled by the largest entry
/// of `A`, so well-scaled but tiny systems (daily covariances) still solve.
pub fn solve_linear_system(a: &[Vec<f64>], b: &[f64]) -> FrontierResult<Vec<f64>> {
    let echelon = solve_rank_deficient(a, b)?;
    if !echelon.null_basis.is_empty() {
        return Err(FrontierError::SingularSystem(format!(
            "Rank {} of {} below full",
            a.len() - echelon.null_basis.len(),
            a.len()
        )));
    }
    Ok(echelon.solution)
}

/// Gauss-Jordan elimination that skips columns without a usable pivot
/// instead of failing on them.
#[allow(clippy::needless_range_loop)]
pub fn solve_rank_deficient(a: &[Vec<f64>], b: &[f64]) -> FrontierResult<EchelonSolution> {
    let n = a.len();
    if b.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(FrontierError::InvalidInput {
            field: "linear_system".into(),
            reason: format!("Expected {}x{} system with {} right-hand sides", n, n, n),
        });
    }

    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let threshold = PIVOT_EPSILON * scale;

    let mut aug: Vec<Vec<f64>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut row = Vec::with_capacity(n + 1);
        row.extend_from_slice(&a[i]);
        row.push(b[i]);
        aug.push(row);
    }

    let mut pivot_columns: Vec<usize> = Vec::with_capacity(n);
    let mut free_columns: Vec<usize> = Vec::new();
    for col in 0..n {
        let rank = pivot_columns.len();
        // Partial pivoting over the rows not yet used
        let mut max_row = rank;
        let mut max_val = 0.0_f64;
        for row in rank..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val <= threshold {
            free_columns.push(col);
            continue;
        }

        if max_row != rank {
            aug.swap(rank, max_row);
        }

        let pivot = aug[rank][col];
        for cell in aug[rank].iter_mut() {
            *cell /= pivot;
        }

        let pivot_row = aug[rank].clone();
        for row in 0..n {
            if row == rank {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0.0 {
                continue;
            }
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()) {
                *cell -= factor * pv;
            }
        }
        pivot_columns.push(col);
    }

    let rank = pivot_columns.len();
    let mut solution = vec![0.0; n];
    for (k, &col) in pivot_columns.iter().enumerate() {
        solution[col] = aug[k][n];
    }

    let null_basis = free_columns
        .iter()
        .map(|&free| {
            let mut z = vec![0.0; n];
            z[free] = 1.0;
            for (k, &col) in pivot_columns.iter().enumerate() {
                z[col] = -aug[k][free];
            }
            z
        })
        .collect();

    let inconsistency = aug[rank..]
        .iter()
        .fold(0.0_f64, |acc, row| acc.max(row[n].abs()));

    Ok(EchelonSolution {
        solution,
        null_basis,
        inconsistency,
    })
}

/// Check that `cov` is an `n x n` symmetric matrix with finite entries and a
/// non-negative diagonal.
#[allow(clippy::needless_range_loop)]
pub fn validate_covariance_matrix(cov: &[Vec<f64>], n: usize) -> FrontierResult<()> {
    if cov.len() != n {
        return Err(FrontierError::InvalidInput {
            field: "covariance_matrix".into(),
            reason: format!("Expected {}x{} matrix but got {} rows", n, n, cov.len()),
        });
    }
    for (i, row) in cov.iter().enumerate() {
        if row.len() != n {
            return Err(FrontierError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Row {} has {} columns, expected {}", i, row.len(), n),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(FrontierError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Row {} contains a non-finite value", i),
            });
        }
        if row[i] < 0.0 {
            return Err(FrontierError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Negative variance {} on the diagonal at {}", row[i], i),
            });
        }
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let tolerance = 1e-9 * (cov[i][j].abs().max(cov[j][i].abs())).max(1e-12);
            if (cov[i][j] - cov[j][i]).abs() > tolerance {
                return Err(FrontierError::InvalidInput {
                    field: "covariance_matrix".into(),
                    reason: format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, cov[i][j], j, i, cov[j][i]
                    ),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_dot() {
        assert_eq!(vec_dot(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
    }

    #[test]
    fn test_quad_form() {
        let m = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        // [1, 2] M [1, 2]' = 2 + 2*2 + 3*4 = 18
        assert!((quad_form(&m, &[1.0, 2.0]) - 18.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_linear_system() {
        let a = vec![vec![2.0, 1.0], vec![5.0, 3.0]];
        let x = solve_linear_system(&a, &[3.0, 8.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_tiny_scale_system() {
        // Daily covariance magnitudes must not trip the singularity check.
        let a = vec![vec![1e-4, 3e-5], vec![3e-5, 1.5e-4]];
        let x = solve_linear_system(&a, &[1.3e-4, 1.8e-4]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-9);
        assert!((x[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_solve_singular_system() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(matches!(
            solve_linear_system(&a, &[1.0, 2.0]),
            Err(FrontierError::SingularSystem(_))
        ));
    }

    #[test]
    fn test_rank_deficient_consistent_system() {
        // Second row is twice the first; x + 2y = 1 has a line of solutions.
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        let e = solve_rank_deficient(&a, &[1.0, 2.0]).unwrap();
        assert_eq!(e.null_basis.len(), 1);
        assert!(e.inconsistency < 1e-12);
        let ax = mat_vec_multiply(&a, &e.solution);
        assert!((ax[0] - 1.0).abs() < 1e-12 && (ax[1] - 2.0).abs() < 1e-12);
        let az = mat_vec_multiply(&a, &e.null_basis[0]);
        assert!(norm_inf(&az) < 1e-12);
    }

    #[test]
    fn test_rank_deficient_inconsistent_system() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        let e = solve_rank_deficient(&a, &[1.0, 3.0]).unwrap();
        assert!((e.inconsistency - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rank_deficient_full_rank_matches_direct_solve() {
        let a = vec![vec![4.0, 1.0, 0.0], vec![1.0, 3.0, 1.0], vec![0.0, 1.0, 2.0]];
        let b = [1.0, 2.0, 3.0];
        let e = solve_rank_deficient(&a, &b).unwrap();
        assert!(e.null_basis.is_empty());
        assert_eq!(e.solution, solve_linear_system(&a, &b).unwrap());
    }

    #[test]
    fn test_validate_covariance_asymmetric() {
        let cov = vec![vec![0.04, 0.01], vec![0.006, 0.01]];
        assert!(validate_covariance_matrix(&cov, 2).is_err());
    }

    #[test]
    fn test_validate_covariance_ragged() {
        let cov = vec![vec![0.04, 0.006], vec![0.006]];
        assert!(validate_covariance_matrix(&cov, 2).is_err());
    }

    #[test]
    fn test_validate_covariance_ok() {
        let cov = vec![vec![0.04, 0.006], vec![0.006, 0.01]];
        assert!(validate_covariance_matrix(&cov, 2).is_ok());
    }
}
