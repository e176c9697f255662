use serde::{Deserialize, Serialize};

use crate::error::FrontierError;
use crate::types::{nan_as_null, WeightVector};
use crate::FrontierResult;

use super::monte_carlo::PortfolioPoint;

/// A named member of the sampled population. `sample_index` is its position
/// in the population array and `draw_index` its position in draw order; the
/// two differ only after skipped samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSelection {
    #[serde(rename = "return")]
    pub expected_return: f64,
    pub volatility: f64,
    #[serde(with = "nan_as_null")]
    pub sharpe: f64,
    pub weights: WeightVector,
    pub sample_index: usize,
    #[serde(default)]
    pub draw_index: usize,
}

impl PortfolioSelection {
    fn from_point(index: usize, point: &PortfolioPoint) -> Self {
        PortfolioSelection {
            expected_return: point.expected_return,
            volatility: point.volatility,
            sharpe: point.sharpe,
            weights: point.weights.clone(),
            sample_index: index,
            draw_index: point.draw_index,
        }
    }
}

/// Highest Sharpe ratio. Samples with an undefined (NaN) Sharpe ratio are
/// never selected; returns `None` when no sample has one.
pub fn select_max_sharpe(portfolios: &[PortfolioPoint]) -> Option<PortfolioSelection> {
    arg_best(portfolios.iter().map(|p| p.sharpe), |candidate, best| candidate > best)
        .map(|i| PortfolioSelection::from_point(i, &portfolios[i]))
}

/// Lowest volatility.
pub fn select_min_volatility(portfolios: &[PortfolioPoint]) -> FrontierResult<PortfolioSelection> {
    arg_best(portfolios.iter().map(|p| p.volatility), |candidate, best| candidate < best)
        .map(|i| PortfolioSelection::from_point(i, &portfolios[i]))
        .ok_or_else(|| empty("min_volatility"))
}

/// Highest annualized return.
pub fn select_max_return(portfolios: &[PortfolioPoint]) -> FrontierResult<PortfolioSelection> {
    arg_best(portfolios.iter().map(|p| p.expected_return), |candidate, best| candidate > best)
        .map(|i| PortfolioSelection::from_point(i, &portfolios[i]))
        .ok_or_else(|| empty("max_return"))
}

/// Index of the best non-NaN value; the first index wins ties.
fn arg_best(values: impl Iterator<Item = f64>, better: impl Fn(f64, f64) -> bool) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if !better(v, b) => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

fn empty(selection: &str) -> FrontierError {
    FrontierError::InsufficientData(format!(
        "Cannot select {} from an empty sample",
        selection
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(ret: f64, vol: f64, sharpe: f64) -> PortfolioPoint {
        PortfolioPoint {
            expected_return: ret,
            volatility: vol,
            sharpe,
            weights: WeightVector::uniform(2),
            draw_index: 0,
        }
    }

    #[test]
    fn test_max_sharpe_skips_nan() {
        let pts = vec![point(0.1, 0.0, f64::NAN), point(0.1, 0.2, 0.5), point(0.2, 0.2, 1.0)];
        let s = select_max_sharpe(&pts).unwrap();
        assert_eq!(s.sample_index, 2);
    }

    #[test]
    fn test_max_sharpe_all_nan() {
        let pts = vec![point(0.1, 0.0, f64::NAN)];
        assert!(select_max_sharpe(&pts).is_none());
    }

    #[test]
    fn test_min_volatility_first_wins_ties() {
        let pts = vec![point(0.1, 0.3, 0.3), point(0.2, 0.1, 2.0), point(0.3, 0.1, 3.0)];
        assert_eq!(select_min_volatility(&pts).unwrap().sample_index, 1);
    }

    #[test]
    fn test_max_return() {
        let pts = vec![point(0.1, 0.3, 0.3), point(0.25, 0.4, 0.6), point(0.2, 0.1, 2.0)];
        let s = select_max_return(&pts).unwrap();
        assert_eq!(s.sample_index, 1);
        assert_eq!(s.expected_return, 0.25);
    }

    #[test]
    fn test_draw_index_survives_skipped_samples() {
        // Draw 1 was skipped: population positions lag draw order by one.
        let mut pts = vec![point(0.1, 0.3, 0.3), point(0.4, 0.2, 2.0)];
        pts[0].draw_index = 0;
        pts[1].draw_index = 2;
        let s = select_max_return(&pts).unwrap();
        assert_eq!(s.sample_index, 1);
        assert_eq!(s.draw_index, 2);
    }

    #[test]
    fn test_empty_population() {
        assert!(select_min_volatility(&[]).is_err());
        assert!(select_max_return(&[]).is_err());
    }

    #[test]
    fn test_nan_sharpe_serializes_as_null() {
        let pts = vec![point(0.1, 0.0, f64::NAN)];
        let s = select_min_volatility(&pts).unwrap();
        let json = serde_json::to_value(&s).unwrap();
        assert!(json["sharpe"].is_null());
        let back: PortfolioSelection = serde_json::from_value(json).unwrap();
        assert!(back.sharpe.is_nan());
    }
}
