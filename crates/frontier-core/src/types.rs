use serde::{Deserialize, Serialize};

use crate::error::FrontierError;
use crate::FrontierResult;

/// Tolerance on the weight-sum invariant.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Long-only, fully invested allocation: every component in [0, 1] and the
/// components sum to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct WeightVector(Vec<f64>);

impl WeightVector {
    /// Validate raw weights against the allocation invariant.
    pub fn new(weights: Vec<f64>) -> FrontierResult<Self> {
        if weights.is_empty() {
            return Err(FrontierError::InsufficientData(
                "Weight vector must contain at least one asset".into(),
            ));
        }
        for (i, w) in weights.iter().enumerate() {
            if !w.is_finite() || *w < -WEIGHT_SUM_TOLERANCE || *w > 1.0 + WEIGHT_SUM_TOLERANCE {
                return Err(FrontierError::InvalidInput {
                    field: format!("weights[{}]", i),
                    reason: format!("Weight {} outside [0, 1]", w),
                });
            }
        }
        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(FrontierError::InvalidInput {
                field: "weights".into(),
                reason: format!("Weights sum to {} instead of 1", total),
            });
        }
        Ok(WeightVector(weights))
    }

    /// Equal allocation across `n` assets.
    pub fn uniform(n: usize) -> Self {
        WeightVector(vec![1.0 / n as f64; n])
    }

    /// Wrap weights produced by an optimizer whose iterates already satisfy
    /// the invariant up to rounding. Tiny excursions below zero are clipped.
    pub(crate) fn from_solver(mut weights: Vec<f64>) -> Self {
        for w in weights.iter_mut() {
            *w = w.clamp(0.0, 1.0);
        }
        WeightVector(weights)
    }

    /// Wrap weights that were normalized by their own sum.
    pub(crate) fn from_normalized(weights: Vec<f64>) -> Self {
        WeightVector(weights)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }
}

impl TryFrom<Vec<f64>> for WeightVector {
    type Error = FrontierError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        WeightVector::new(value)
    }
}

impl From<WeightVector> for Vec<f64> {
    fn from(value: WeightVector) -> Self {
        value.0
    }
}

impl AsRef<[f64]> for WeightVector {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

/// Serde adapter writing NaN ratios as `null` and reading `null` back as NaN.
pub mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_vector_accepts_valid() {
        let w = WeightVector::new(vec![0.25, 0.75]).unwrap();
        assert_eq!(w.len(), 2);
        assert!((w.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_weight_vector_rejects_bad_sum() {
        assert!(WeightVector::new(vec![0.3, 0.3]).is_err());
    }

    #[test]
    fn test_weight_vector_rejects_negative() {
        assert!(WeightVector::new(vec![-0.5, 1.5]).is_err());
    }

    #[test]
    fn test_weight_vector_rejects_empty() {
        assert!(WeightVector::new(vec![]).is_err());
    }

    #[test]
    fn test_weight_vector_serde_validates() {
        let ok: WeightVector = serde_json::from_str("[0.5, 0.5]").unwrap();
        assert_eq!(ok.as_slice(), &[0.5, 0.5]);
        let bad: Result<WeightVector, _> = serde_json::from_str("[0.9, 0.5]");
        assert!(bad.is_err());
    }

    #[test]
    fn test_uniform_sums_to_one() {
        let w = WeightVector::uniform(7);
        assert!((w.sum() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE);
        assert_eq!(w.len(), 7);
    }

    #[test]
    fn test_metadata_precision() {
        let out = with_metadata("m", &serde_json::json!({}), vec![], 0, 1.0);
        assert_eq!(out.metadata.precision, "ieee754_f64");
    }
}
