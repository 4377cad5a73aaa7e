//! Penalized-linear (elastic net) regressors evaluated at a stored regularization strength.

use nalgebra::DVector;
use serde::Deserialize;

use super::Regressor;

/// One point on the regularization path.
#[derive(Debug, Clone, Deserialize)]
pub struct PathPoint {
    pub lambda: f64,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

/// Serialized form: the fitted path and the strength selected during training.
#[derive(Debug, Clone, Deserialize)]
pub struct PenalizedParams {
    pub lambda: f64,
    pub path: Vec<PathPoint>,
}

#[derive(Debug, Clone)]
pub struct PenalizedLinear {
    intercept: f64,
    coefficients: DVector<f64>,
}

impl PenalizedLinear {
    pub fn new(intercept: f64, coefficients: Vec<f64>) -> Self {
        Self {
            intercept,
            coefficients: DVector::from_vec(coefficients),
        }
    }

    /// Resolves the coefficients at `params.lambda`.
    ///
    /// An exact path entry is used as-is. Between two entries the coefficients are linearly
    /// interpolated in lambda; outside the path the nearest end is used.
    pub fn from_params(params: &PenalizedParams, n_features: usize) -> Result<Self, String> {
        if params.path.is_empty() {
            return Err("penalized-linear model has an empty regularization path".to_string());
        }
        if !params.lambda.is_finite() {
            return Err(format!("stored lambda {} is not finite", params.lambda));
        }
        if let Some(bad) = params
            .path
            .iter()
            .find(|p| p.coefficients.len() != n_features)
        {
            return Err(format!(
                "path point at lambda {} has {} coefficients for {} predictors",
                bad.lambda,
                bad.coefficients.len(),
                n_features
            ));
        }

        let mut path: Vec<&PathPoint> = params.path.iter().collect();
        path.sort_by(|a, b| a.lambda.total_cmp(&b.lambda));
        let target = params.lambda;

        let upper = path.iter().position(|p| p.lambda >= target);
        let (intercept, coefficients) = match upper {
            None => {
                let last = path[path.len() - 1];
                (last.intercept, last.coefficients.clone())
            }
            Some(0) => (path[0].intercept, path[0].coefficients.clone()),
            Some(i) if path[i].lambda == target => (path[i].intercept, path[i].coefficients.clone()),
            Some(i) => {
                let (lo, hi) = (path[i - 1], path[i]);
                let w = (target - lo.lambda) / (hi.lambda - lo.lambda);
                let blend = |a: f64, b: f64| a + w * (b - a);
                (
                    blend(lo.intercept, hi.intercept),
                    lo.coefficients
                        .iter()
                        .zip(&hi.coefficients)
                        .map(|(a, b)| blend(*a, *b))
                        .collect(),
                )
            }
        };
        Ok(Self::new(intercept, coefficients))
    }
}

impl Regressor for PenalizedLinear {
    fn predict_row(&self, features: &[f64]) -> f64 {
        self.intercept + self.coefficients.dot(&DVector::from_column_slice(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(lambda: f64) -> PenalizedParams {
        PenalizedParams {
            lambda,
            path: vec![
                PathPoint {
                    lambda: 1.0,
                    intercept: 0.0,
                    coefficients: vec![0.0, 0.0],
                },
                PathPoint {
                    lambda: 0.5,
                    intercept: 2.0,
                    coefficients: vec![1.0, 4.0],
                },
            ],
        }
    }

    #[test]
    fn test_exact_lambda_uses_path_point() {
        let model = PenalizedLinear::from_params(&params(0.5), 2).unwrap();
        assert_eq!(model.predict_row(&[1.0, 1.0]), 7.0);
    }

    #[test]
    fn test_lambda_between_points_is_interpolated() {
        let model = PenalizedLinear::from_params(&params(0.75), 2).unwrap();
        assert!((model.predict_row(&[1.0, 1.0]) - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_lambda_outside_path_uses_nearest_end() {
        let small = PenalizedLinear::from_params(&params(0.01), 2).unwrap();
        assert_eq!(small.predict_row(&[1.0, 1.0]), 7.0);
        let large = PenalizedLinear::from_params(&params(10.0), 2).unwrap();
        assert_eq!(large.predict_row(&[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_coefficient_count_mismatch_is_rejected() {
        assert!(PenalizedLinear::from_params(&params(0.5), 3).is_err());
    }
}
