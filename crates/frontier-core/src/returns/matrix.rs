use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FrontierError;
use crate::FrontierResult;

use super::statistics::AssetStatistics;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Daily log returns: one row per trading day in ascending time order, one
/// column per asset.
///
/// Construction validates the shape and values once; afterwards the matrix
/// is read-only and shared by reference across the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReturnMatrixData", into = "ReturnMatrixData")]
pub struct ReturnMatrix {
    asset_names: Vec<String>,
    rows: Vec<Vec<f64>>,
    dates: Option<Vec<NaiveDate>>,
}

/// Wire form of a return matrix, validated on conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnMatrixData {
    /// Asset identifiers, one per column.
    pub asset_names: Vec<String>,
    /// T x A daily log returns.
    pub returns: Vec<Vec<f64>>,
    /// Optional observation dates, strictly ascending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dates: Option<Vec<NaiveDate>>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl ReturnMatrix {
    /// Build a matrix from daily log returns.
    pub fn new(asset_names: Vec<String>, rows: Vec<Vec<f64>>) -> FrontierResult<Self> {
        validate_shape(&asset_names, &rows)?;
        Ok(ReturnMatrix {
            asset_names,
            rows,
            dates: None,
        })
    }

    /// Attach observation dates. They must match the row count and be
    /// strictly ascending.
    pub fn with_dates(mut self, dates: Vec<NaiveDate>) -> FrontierResult<Self> {
        validate_dates(&dates, self.rows.len())?;
        self.dates = Some(dates);
        Ok(self)
    }

    /// Convert a price table (rows ascending in time) into log returns
    /// ln(p_t / p_{t-1}). The first price row has no predecessor and is
    /// dropped, together with its date.
    pub fn from_prices(
        asset_names: Vec<String>,
        prices: &[Vec<f64>],
        dates: Option<Vec<NaiveDate>>,
    ) -> FrontierResult<Self> {
        if prices.len() < 2 {
            return Err(FrontierError::InsufficientData(
                "At least two price observations are required to form a return".into(),
            ));
        }
        let n = asset_names.len();
        for (t, row) in prices.iter().enumerate() {
            if row.len() != n {
                return Err(FrontierError::InvalidInput {
                    field: format!("prices[{}]", t),
                    reason: format!("Row has {} columns, expected {}", row.len(), n),
                });
            }
            if let Some((j, p)) = row.iter().enumerate().find(|(_, p)| !p.is_finite() || **p <= 0.0) {
                return Err(FrontierError::InvalidInput {
                    field: format!("prices[{}][{}]", t, j),
                    reason: format!("Price must be positive and finite, got {}", p),
                });
            }
        }

        let rows: Vec<Vec<f64>> = prices
            .windows(2)
            .map(|pair| {
                pair[1]
                    .iter()
                    .zip(pair[0].iter())
                    .map(|(curr, prev)| (curr / prev).ln())
                    .collect()
            })
            .collect();

        let matrix = ReturnMatrix::new(asset_names, rows)?;
        match dates {
            Some(d) => {
                if d.len() != prices.len() {
                    return Err(FrontierError::InvalidInput {
                        field: "dates".into(),
                        reason: format!(
                            "Expected {} dates (one per price row) but got {}",
                            prices.len(),
                            d.len()
                        ),
                    });
                }
                matrix.with_dates(d[1..].to_vec())
            }
            None => Ok(matrix),
        }
    }
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

impl ReturnMatrix {
    pub fn asset_names(&self) -> &[String] {
        &self.asset_names
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn dates(&self) -> Option<&[NaiveDate]> {
        self.dates.as_deref()
    }

    /// Number of assets (A).
    pub fn num_assets(&self) -> usize {
        self.asset_names.len()
    }

    /// Number of trading days (T).
    pub fn num_observations(&self) -> usize {
        self.rows.len()
    }

    /// Copy of column `j` in time order.
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[j]).collect()
    }

    /// Per-asset mean daily return and sample covariance.
    pub fn statistics(&self) -> FrontierResult<AssetStatistics> {
        AssetStatistics::from_returns(self)
    }
}

impl TryFrom<ReturnMatrixData> for ReturnMatrix {
    type Error = FrontierError;

    fn try_from(data: ReturnMatrixData) -> Result<Self, Self::Error> {
        let matrix = ReturnMatrix::new(data.asset_names, data.returns)?;
        match data.dates {
            Some(d) => matrix.with_dates(d),
            None => Ok(matrix),
        }
    }
}

impl From<ReturnMatrix> for ReturnMatrixData {
    fn from(m: ReturnMatrix) -> Self {
        ReturnMatrixData {
            asset_names: m.asset_names,
            returns: m.rows,
            dates: m.dates,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_shape(asset_names: &[String], rows: &[Vec<f64>]) -> FrontierResult<()> {
    let n = asset_names.len();
    if n == 0 {
        return Err(FrontierError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    if rows.is_empty() {
        return Err(FrontierError::InsufficientData(
            "Return matrix has no observations".into(),
        ));
    }
    for (i, name) in asset_names.iter().enumerate() {
        if asset_names[..i].contains(name) {
            return Err(FrontierError::InvalidInput {
                field: "asset_names".into(),
                reason: format!("Duplicate asset identifier '{}'", name),
            });
        }
    }
    for (t, row) in rows.iter().enumerate() {
        if row.len() != n {
            return Err(FrontierError::InvalidInput {
                field: format!("returns[{}]", t),
                reason: format!("Row has {} columns, expected {}", row.len(), n),
            });
        }
        if let Some(j) = row.iter().position(|v| !v.is_finite()) {
            return Err(FrontierError::InvalidInput {
                field: format!("returns[{}][{}]", t, j),
                reason: "Missing or non-finite return".into(),
            });
        }
    }
    Ok(())
}

fn validate_dates(dates: &[NaiveDate], num_rows: usize) -> FrontierResult<()> {
    if dates.len() != num_rows {
        return Err(FrontierError::InvalidInput {
            field: "dates".into(),
            reason: format!("Expected {} dates but got {}", num_rows, dates.len()),
        });
    }
    if let Some(i) = dates.windows(2).position(|w| w[1] <= w[0]) {
        return Err(FrontierError::InvalidInput {
            field: "dates".into(),
            reason: format!(
                "Dates must be strictly ascending: {} is not after {}",
                dates[i + 1],
                dates[i]
            ),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
