//! Closed-form straight-line fits through the normal equations.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{ensure_len, TrendError};

/// Relative determinant below which the normal matrix is treated as singular.
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// `value ≈ slope * position + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn predict(&self, position: f64) -> f64 {
        self.slope * position + self.intercept
    }

    pub fn fitted(&self, positions: &[f64]) -> Vec<f64> {
        positions.iter().map(|&p| self.predict(p)).collect()
    }
}

/// Diagonal weight applied to each observation in [`fit_weighted`].
///
/// `InverseStdDev` is the convention the published analysis used and stays the
/// default. `InverseVariance` is the textbook choice and must be asked for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum WeightConvention {
    /// `W_ii = 1 / sigma_i`
    #[default]
    InverseStdDev,
    /// `W_ii = 1 / sigma_i^2`
    InverseVariance,
}

impl WeightConvention {
    pub fn weight(&self, uncertainty: f64) -> f64 {
        match self {
            Self::InverseStdDev => 1.0 / uncertainty,
            Self::InverseVariance => 1.0 / (uncertainty * uncertainty),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::InverseStdDev => "1/sigma",
            Self::InverseVariance => "1/sigma^2",
        }
    }
}

/// Unweighted least squares: `beta = (X^T X)^-1 X^T y` with `X = [1, P]`.
pub fn fit_ols(positions: &[f64], values: &[f64]) -> Result<LinearFit, TrendError> {
    ensure_len("ols values", positions.len(), values.len())?;
    let weights = vec![1.0; positions.len()];
    solve_normal_equations(positions, values, &weights)
}

/// Weighted least squares: `beta = (X^T W X)^-1 X^T W y`.
pub fn fit_weighted(
    positions: &[f64],
    values: &[f64],
    uncertainties: &[f64],
    convention: WeightConvention,
) -> Result<LinearFit, TrendError> {
    ensure_len("weighted values", positions.len(), values.len())?;
    ensure_len("weighted uncertainties", positions.len(), uncertainties.len())?;

    if let Some((index, &value)) = uncertainties
        .iter()
        .enumerate()
        .find(|(_, &u)| !(u.is_finite() && u > 0.0))
    {
        return Err(TrendError::InvalidUncertainty { index, value });
    }

    let weights: Vec<f64> = uncertainties.iter().map(|&u| convention.weight(u)).collect();
    solve_normal_equations(positions, values, &weights)
}

fn solve_normal_equations(
    positions: &[f64],
    values: &[f64],
    weights: &[f64],
) -> Result<LinearFit, TrendError> {
    let n = positions.len();
    if n < 2 {
        return Err(TrendError::TooFewObservations(n));
    }

    let design = DMatrix::from_fn(n, 2, |row, col| if col == 0 { 1.0 } else { positions[row] });
    let weighted = DMatrix::from_fn(n, 2, |row, col| weights[row] * design[(row, col)]);
    let y = DVector::from_column_slice(values);

    let normal = design.transpose() * &weighted;
    let rhs = weighted.transpose() * y;

    let scale = (normal[(0, 0)] * normal[(1, 1)]).abs();
    let det = normal.determinant();
    if !det.is_finite() || det.abs() <= scale * SINGULAR_TOLERANCE {
        return Err(TrendError::SingularDesign);
    }

    let inverse = normal.try_inverse().ok_or(TrendError::SingularDesign)?;
    let beta = inverse * rhs;

    Ok(LinearFit {
        slope: beta[1],
        intercept: beta[0],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const P: [f64; 4] = [0.0, 1.0, 2.0, 3.0];
    const V: [f64; 4] = [1.0, 2.0, 3.0, 4.1];

    #[test]
    fn ols_matches_normal_equations_on_reference_input() {
        let fit = fit_ols(&P, &V).unwrap();
        assert_relative_eq!(fit.slope, 1.03, epsilon = 1e-9);
        assert_relative_eq!(fit.intercept, 0.98, epsilon = 1e-9);
    }

    #[test]
    fn ols_is_deterministic() {
        let a = fit_ols(&P, &V).unwrap();
        let b = fit_ols(&P, &V).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn exact_line_is_recovered() {
        let positions = [12.0, 40.0, 75.0, 130.0, 190.0];
        let values: Vec<f64> = positions.iter().map(|x| -0.0021 * x + 0.61).collect();
        let fit = fit_ols(&positions, &values).unwrap();
        assert_relative_eq!(fit.slope, -0.0021, epsilon = 1e-9);
        assert_relative_eq!(fit.intercept, 0.61, epsilon = 1e-8);
    }

    #[test]
    fn uniform_uncertainty_matches_ols() {
        let ols = fit_ols(&P, &V).unwrap();
        for convention in [WeightConvention::InverseStdDev, WeightConvention::InverseVariance] {
            let weighted = fit_weighted(&P, &V, &[0.1; 4], convention).unwrap();
            assert_relative_eq!(weighted.slope, ols.slope, epsilon = 1e-9);
            assert_relative_eq!(weighted.intercept, ols.intercept, epsilon = 1e-9);
        }
    }

    #[test]
    fn non_uniform_uncertainty_changes_the_slope() {
        let ols = fit_ols(&P, &V).unwrap();
        let u = [0.1, 0.1, 0.1, 1.0];
        let inv_sd = fit_weighted(&P, &V, &u, WeightConvention::InverseStdDev).unwrap();
        let inv_var = fit_weighted(&P, &V, &u, WeightConvention::InverseVariance).unwrap();

        // weights 10, 10, 10, 1 by hand: slope = 746 / 740
        assert_relative_eq!(inv_sd.slope, 746.0 / 740.0, epsilon = 1e-9);
        assert!((inv_sd.slope - ols.slope).abs() > 1e-3);
        assert!((inv_var.slope - inv_sd.slope).abs() > 1e-4);
    }

    #[test]
    fn degenerate_inputs_fail() {
        assert!(matches!(
            fit_ols(&[1.0], &[2.0]),
            Err(TrendError::TooFewObservations(1))
        ));
        assert!(matches!(
            fit_ols(&[5.0, 5.0, 5.0], &[1.0, 2.0, 3.0]),
            Err(TrendError::SingularDesign)
        ));
        assert!(matches!(
            fit_ols(&P, &V[..3]),
            Err(TrendError::LengthMismatch { .. })
        ));
        assert!(matches!(
            fit_weighted(&P, &V, &[0.1, 0.0, 0.1, 0.1], WeightConvention::InverseStdDev),
            Err(TrendError::InvalidUncertainty { index: 1, .. })
        ));
    }

    #[test]
    fn fitted_values_follow_the_line() {
        let fit = LinearFit {
            slope: 2.0,
            intercept: -1.0,
        };
        assert_eq!(fit.fitted(&[0.0, 1.0, 2.5]), vec![-1.0, 1.0, 4.0]);
    }
}
