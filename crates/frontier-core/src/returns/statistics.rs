use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::FrontierError;
use crate::linalg::{quad_form, scale_matrix, validate_covariance_matrix, vec_dot};
use crate::FrontierResult;

use super::matrix::ReturnMatrix;

/// First and second moments of the daily return series.
///
/// These are the only quantities the sampler and the optimizer need; the
/// frontier can therefore be driven either from a `ReturnMatrix` or from
/// externally estimated moments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AssetStatisticsData", into = "AssetStatisticsData")]
pub struct AssetStatistics {
    mean_daily_returns: Vec<f64>,
    daily_covariance: Vec<Vec<f64>>,
}

/// Wire form of `AssetStatistics`, validated on conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetStatisticsData {
    pub mean_daily_returns: Vec<f64>,
    pub daily_covariance: Vec<Vec<f64>>,
}

impl AssetStatistics {
    /// Wrap externally estimated moments.
    pub fn new(mean_daily_returns: Vec<f64>, daily_covariance: Vec<Vec<f64>>) -> FrontierResult<Self> {
        let n = mean_daily_returns.len();
        if n == 0 {
            return Err(FrontierError::InsufficientData(
                "At least one asset required".into(),
            ));
        }
        if let Some(i) = mean_daily_returns.iter().position(|m| !m.is_finite()) {
            return Err(FrontierError::InvalidInput {
                field: format!("mean_daily_returns[{}]", i),
                reason: "Mean return must be finite".into(),
            });
        }
        validate_covariance_matrix(&daily_covariance, n)?;
        Ok(AssetStatistics {
            mean_daily_returns,
            daily_covariance,
        })
    }

    /// Column means and sample (n - 1) covariance of a return matrix.
    pub fn from_returns(returns: &ReturnMatrix) -> FrontierResult<Self> {
        if returns.num_observations() < 2 {
            return Err(FrontierError::InsufficientData(
                "At least two observations are required for a sample covariance".into(),
            ));
        }
        let n = returns.num_assets();
        let columns: Vec<Vec<f64>> = (0..n).map(|j| returns.column(j)).collect();

        let means: Vec<f64> = columns.iter().map(|c| c.iter().mean()).collect();

        let mut cov = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in i..n {
                let c = columns[i].iter().covariance(columns[j].iter());
                cov[i][j] = c;
                cov[j][i] = c;
            }
        }

        AssetStatistics::new(means, cov)
    }

    pub fn num_assets(&self) -> usize {
        self.mean_daily_returns.len()
    }

    pub fn mean_daily_returns(&self) -> &[f64] {
        &self.mean_daily_returns
    }

    pub fn daily_covariance(&self) -> &[Vec<f64>] {
        &self.daily_covariance
    }

    /// Mean returns scaled by the annualization factor.
    pub fn annualized_returns(&self, annualization_factor: f64) -> Vec<f64> {
        self.mean_daily_returns
            .iter()
            .map(|m| m * annualization_factor)
            .collect()
    }

    /// Covariance scaled by the annualization factor.
    pub fn annualized_covariance(&self, annualization_factor: f64) -> Vec<Vec<f64>> {
        scale_matrix(&self.daily_covariance, annualization_factor)
    }
}

impl TryFrom<AssetStatisticsData> for AssetStatistics {
    type Error = FrontierError;

    fn try_from(data: AssetStatisticsData) -> Result<Self, Self::Error> {
        AssetStatistics::new(data.mean_daily_returns, data.daily_covariance)
    }
}

impl From<AssetStatistics> for AssetStatisticsData {
    fn from(s: AssetStatistics) -> Self {
        AssetStatisticsData {
            mean_daily_returns: s.mean_daily_returns,
            daily_covariance: s.daily_covariance,
        }
    }
}

/// Annualized moments, precomputed once per run.
#[derive(Debug, Clone)]
pub(crate) struct AnnualizedMoments {
    pub returns: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
}

impl AnnualizedMoments {
    pub fn new(stats: &AssetStatistics, annualization_factor: f64) -> Self {
        AnnualizedMoments {
            returns: stats.annualized_returns(annualization_factor),
            covariance: stats.annualized_covariance(annualization_factor),
        }
    }

    /// Annualized portfolio return: sum(mean_i * w_i) * factor.
    pub fn portfolio_return(&self, w: &[f64]) -> f64 {
        vec_dot(&self.returns, w)
    }

    /// Annualized portfolio volatility: sqrt(w' * (Sigma * factor) * w).
    pub fn portfolio_volatility(&self, w: &[f64]) -> f64 {
        quad_form(&self.covariance, w).max(0.0).sqrt()
    }
}

/// Annualized return of `weights` under the given daily moments.
pub fn portfolio_return(stats: &AssetStatistics, annualization_factor: f64, weights: &[f64]) -> f64 {
    vec_dot(stats.mean_daily_returns(), weights) * annualization_factor
}

/// Annualized volatility of `weights` under the given daily moments.
pub fn portfolio_volatility(
    stats: &AssetStatistics,
    annualization_factor: f64,
    weights: &[f64],
) -> f64 {
    (quad_form(stats.daily_covariance(), weights) * annualization_factor)
        .max(0.0)
        .sqrt()
}

/// Sharpe ratio, or NaN when volatility is exactly zero.
pub fn sharpe_ratio(portfolio_return: f64, risk_free_rate: f64, volatility: f64) -> f64 {
    if volatility == 0.0 {
        f64::NAN
    } else {
        (portfolio_return - risk_free_rate) / volatility
    }
}
