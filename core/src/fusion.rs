//! Fusion of the two per-observer weight vectors into one normalized weight per particle.
//!
//! Each observer's likelihood vector is first normalized by its own maximum, so the best particle
//! for each observer scores exactly 1. The two normalized vectors are then combined element-wise.
//! The default combination takes the larger of the two ("best evidence"), so a particle is not
//! penalized when one observer's geometry is momentarily uninformative, for example when the
//! target sits directly behind that observer.
use crate::error::FilterError;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WeightFusionStrategy {
    /// `w[i] = max(W1'[i], W2'[i])`
    #[default]
    BestEvidence,
    /// `w[i] = W1'[i] * W2'[i]`, re-normalized by its own maximum
    Product,
}

impl WeightFusionStrategy {
    /// Fuse two raw likelihood vectors of equal length into weights in `(0, 1]`.
    pub fn fuse(&self, first: &[f64], second: &[f64]) -> Result<Vec<f64>, FilterError> {
        if first.len() != second.len() {
            return Err(FilterError::LengthMismatch {
                expected: first.len(),
                actual: second.len(),
            });
        }
        let first = normalize_by_max(first)?;
        let second = normalize_by_max(second)?;
        match self {
            WeightFusionStrategy::BestEvidence => Ok(first
                .iter()
                .zip(second.iter())
                .map(|(a, b)| a.max(*b))
                .collect()),
            WeightFusionStrategy::Product => {
                let product: Vec<f64> = first
                    .iter()
                    .zip(second.iter())
                    .map(|(a, b)| a * b)
                    .collect();
                normalize_by_max(&product)
            }
        }
    }
}

/// Divide every weight by the largest one.
///
/// # Errors
/// * [`FilterError::EmptyPopulation`] for an empty slice.
/// * [`FilterError::InvalidWeight`] if any weight is negative or not finite, or if the maximum is
///   zero (no normalization is possible).
pub fn normalize_by_max(weights: &[f64]) -> Result<Vec<f64>, FilterError> {
    if weights.is_empty() {
        return Err(FilterError::EmptyPopulation);
    }
    let mut max_index = 0;
    for (index, &weight) in weights.iter().enumerate() {
        if !weight.is_finite() || weight < 0.0 {
            return Err(FilterError::InvalidWeight { index, weight });
        }
        if weight > weights[max_index] {
            max_index = index;
        }
    }
    let max = weights[max_index];
    if max <= 0.0 {
        return Err(FilterError::InvalidWeight {
            index: max_index,
            weight: max,
        });
    }
    Ok(weights.iter().map(|w| w / max).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_normalize_by_max() {
        let normalized = normalize_by_max(&[0.5, 2.0, 1.0]).unwrap();
        assert_eq!(normalized, vec![0.25, 1.0, 0.5]);
    }

    #[test]
    fn test_normalize_all_equal_weights() {
        let normalized = normalize_by_max(&[1e-6; 8]).unwrap();
        assert!(normalized.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        assert!(matches!(
            normalize_by_max(&[]),
            Err(FilterError::EmptyPopulation)
        ));
        assert!(matches!(
            normalize_by_max(&[0.0, 0.0]),
            Err(FilterError::InvalidWeight { .. })
        ));
        assert!(matches!(
            normalize_by_max(&[0.1, f64::NAN]),
            Err(FilterError::InvalidWeight { index: 1, .. })
        ));
        assert!(matches!(
            normalize_by_max(&[0.1, -0.2]),
            Err(FilterError::InvalidWeight { index: 1, .. })
        ));
    }

    #[test]
    fn test_best_evidence_fusion() {
        let first = [1.0, 4.0, 2.0];
        let second = [3.0, 1.5, 0.3];
        let fused = WeightFusionStrategy::BestEvidence
            .fuse(&first, &second)
            .unwrap();
        assert_approx_eq!(fused[0], 1.0, 1e-12);
        assert_approx_eq!(fused[1], 1.0, 1e-12);
        assert_approx_eq!(fused[2], 0.5, 1e-12);
    }

    #[test]
    fn test_fusion_rejects_mismatched_lengths() {
        let result = WeightFusionStrategy::BestEvidence.fuse(&[1.0, 2.0], &[1.0]);
        assert!(matches!(
            result,
            Err(FilterError::LengthMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_product_fusion() {
        let first = [1.0, 4.0, 2.0];
        let second = [3.0, 1.5, 0.3];
        let fused = WeightFusionStrategy::Product.fuse(&first, &second).unwrap();
        // 0.25*1, 1*0.5, 0.5*0.1 then divided by 0.5
        assert_approx_eq!(fused[0], 0.5, 1e-12);
        assert_approx_eq!(fused[1], 1.0, 1e-12);
        assert_approx_eq!(fused[2], 0.1, 1e-12);
    }

    #[test]
    fn test_fused_weights_in_unit_interval() {
        let first: Vec<f64> = (1..50).map(|i| 1e-6 + (i as f64).sin().abs()).collect();
        let second: Vec<f64> = (1..50).map(|i| 1e-6 + (i as f64).cos().abs()).collect();
        for strategy in [WeightFusionStrategy::BestEvidence, WeightFusionStrategy::Product] {
            let fused = strategy.fuse(&first, &second).unwrap();
            assert!(fused.iter().all(|&w| w > 0.0 && w <= 1.0));
            assert!(fused.iter().any(|&w| w == 1.0));
        }
    }
}
