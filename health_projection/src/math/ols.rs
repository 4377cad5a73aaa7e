use crate::ProjectionError;
use nalgebra::{DMatrix, DVector};

/// Represents the results of an OLS regression.
#[derive(Debug)]
pub struct OlsResult {
    pub coefficients: DVector<f64>,
    pub residuals: DVector<f64>,
}

/// Performs an Ordinary Least Squares (OLS) regression.
///
/// The function calculates the coefficient vector `β` using the formula:
/// `β = (X'X)⁻¹ * X'y`
///
/// # Arguments
///
/// * `y` - A `DVector` representing the outcome variable.
/// * `x` - A `DMatrix` representing the predictor variables. It must include a column of
///   ones if an intercept is desired in the model.
///
/// # Returns
///
/// A `Result` containing the `OlsResult` on success, or a `ProjectionError` if the
/// `X'X` matrix is singular and cannot be factorized.
pub fn ols(y: &DVector<f64>, x: &DMatrix<f64>) -> Result<OlsResult, ProjectionError> {
    let xtx = x.transpose() * x;
    let xty = x.transpose() * y;

    // Cholesky doubles as the positive-definiteness check: it fails under perfect collinearity.
    let cholesky = xtx.cholesky().ok_or_else(|| {
        ProjectionError::NalgebraError(
            "Failed to perform Cholesky decomposition. Matrix may be singular or not positive definite due to multicollinearity.".to_string(),
        )
    })?;

    let coefficients = cholesky.solve(&xty);
    let residuals = y - x * &coefficients;

    Ok(OlsResult {
        coefficients,
        residuals,
    })
}

/// A straight line `value = intercept + slope * (year - origin)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trend {
    pub origin: f64,
    pub intercept: f64,
    pub slope: f64,
}

impl Trend {
    pub fn at(&self, year: i32) -> f64 {
        self.intercept + self.slope * (year as f64 - self.origin)
    }
}

/// Fits `value ~ year` by OLS. Years are centred on their mean to keep `X'X` well conditioned.
pub fn linear_trend(points: &[(i32, f64)]) -> Result<Trend, ProjectionError> {
    if points.len() < 2 {
        return Err(ProjectionError::NalgebraError(format!(
            "A linear trend needs at least two points, got {}",
            points.len()
        )));
    }
    let n = points.len();
    let origin = points.iter().map(|(year, _)| *year as f64).sum::<f64>() / n as f64;

    let mut x = DMatrix::from_element(n, 2, 1.0);
    for (i, (year, _)) in points.iter().enumerate() {
        x[(i, 1)] = *year as f64 - origin;
    }
    let y = DVector::from_iterator(n, points.iter().map(|(_, v)| *v));

    let fit = ols(&y, &x)?;
    Ok(Trend {
        origin,
        intercept: fit.coefficients[0],
        slope: fit.coefficients[1],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, DVector};

    #[test]
    fn test_ols_simple_regression() {
        // Test a simple model: y = 1 + 2x
        // Note: DMatrix::from_vec is column-major.
        let x = DMatrix::from_vec(
            5,
            2,
            vec![
                // Column 1: Intercept
                1.0, 1.0, 1.0, 1.0, 1.0, // Column 2: x-values
                0.0, 1.0, 2.0, 3.0, 4.0,
            ],
        );
        let y = DVector::from_vec(vec![1.0, 3.0, 5.0, 7.0, 9.0]);

        let result = ols(&y, &x).expect("OLS calculation failed on valid data");
        let coeffs = result.coefficients;

        assert_eq!(coeffs.len(), 2);
        assert!((coeffs[0] - 1.0).abs() < 1e-9, "Intercept is incorrect");
        assert!((coeffs[1] - 2.0).abs() < 1e-9, "Slope is incorrect");
        assert!(result.residuals.norm() < 1e-9);
    }

    #[test]
    fn test_ols_handles_singular_matrix() {
        // Column 2 is 2 * Column 1.
        let x = DMatrix::from_vec(3, 2, vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0]);

        match ols(&y, &x) {
            Err(ProjectionError::NalgebraError(msg)) => {
                assert!(msg.contains("Failed to perform Cholesky decomposition"));
            }
            _ => panic!("Expected a NalgebraError for a singular matrix, but got something else."),
        }
    }

    #[test]
    fn test_linear_trend_on_calendar_years() {
        let trend = linear_trend(&[(2021, 90.0), (2022, 92.0)]).unwrap();
        assert!((trend.slope - 2.0).abs() < 1e-9);
        assert!((trend.at(2023) - 94.0).abs() < 1e-9);
        assert!((trend.at(2024) - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_trend_rejects_single_point() {
        assert!(linear_trend(&[(2021, 90.0)]).is_err());
    }
}
