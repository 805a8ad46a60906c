//! Min-max feature scaling.

use serde::{Deserialize, Serialize};

use crate::error::{AirQualityError, Result};
use crate::features::{FeatureVector, FEATURE_COUNT};

/// Per-feature linear map onto [0, 1], learned from training rows only.
///
/// Values outside the fitted range are not clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: FeatureVector,
    pub max: FeatureVector,
}

impl MinMaxScaler {
    pub fn fit(rows: &[FeatureVector]) -> Result<Self> {
        if rows.is_empty() {
            return Err(AirQualityError::DataUnavailable(
                "cannot fit scaler on an empty training partition".into(),
            ));
        }
        let mut min = [f64::INFINITY; FEATURE_COUNT];
        let mut max = [f64::NEG_INFINITY; FEATURE_COUNT];
        for row in rows {
            for i in 0..FEATURE_COUNT {
                min[i] = min[i].min(row[i]);
                max[i] = max[i].max(row[i]);
            }
        }
        Ok(Self { min, max })
    }

    /// A constant feature maps to 0.
    pub fn transform(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            let span = self.max[i] - self.min[i];
            out[i] = if span == 0.0 {
                0.0
            } else {
                (row[i] - self.min[i]) / span
            };
        }
        out
    }

    pub fn transform_all(&self, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<FeatureVector> {
        vec![
            [-10.0, -30.0, 1000.0, 0.5],
            [30.0, 20.0, 1040.0, 10.5],
            [10.0, 0.0, 1010.0, 2.0],
        ]
    }

    #[test]
    fn test_extremes_map_to_unit_interval() {
        let scaler = MinMaxScaler::fit(&rows()).unwrap();
        assert_eq!(scaler.transform(&[-10.0, -30.0, 1000.0, 0.5]), [0.0; 4]);
        assert_eq!(scaler.transform(&[30.0, 20.0, 1040.0, 10.5]), [1.0; 4]);
    }

    #[test]
    fn test_out_of_range_is_not_clamped() {
        let scaler = MinMaxScaler::fit(&rows()).unwrap();
        let out = scaler.transform(&[50.0, -30.0, 1000.0, 0.5]);
        assert_eq!(out[0], 1.5);
    }

    #[test]
    fn test_constant_feature() {
        let scaler = MinMaxScaler::fit(&[[1.0, 2.0, 3.0, 4.0], [1.0, 5.0, 3.0, 8.0]]).unwrap();
        assert_eq!(scaler.transform(&[1.0, 5.0, 3.0, 8.0]), [0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_json_is_bit_exact() {
        let scaler = MinMaxScaler::fit(&[
            [0.1 + 0.2, -17.3, 991.7, 0.0],
            [41.6, 28.8, 1042.8, 13.2],
        ])
        .unwrap();
        let restored: MinMaxScaler =
            serde_json::from_str(&serde_json::to_string(&scaler).unwrap()).unwrap();
        let probe = [12.345678901234, -3.3, 1017.77, 4.1];
        assert_eq!(
            restored.transform(&probe).map(f64::to_bits),
            scaler.transform(&probe).map(f64::to_bits)
        );
    }

    #[test]
    fn test_empty_fit_fails() {
        assert!(MinMaxScaler::fit(&[]).is_err());
    }
}
